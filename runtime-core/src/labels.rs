//! Label queries: the conjunctive filter language used by `List` and
//! `Watch`.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::OnceLock,
};

use regex::Regex;

use crate::error::{Error, Result};

fn quantity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?i)(-?[0-9]+)\s*(ki|mi|gi|ti|pi|k|m|g|t|p)?$").expect("static regex is valid")
    })
}

/// Parse a numeric label value of the form `[-]?\d+\s*(|k|m|g|t|p|ki|mi|gi|ti|pi)`
/// into a signed integer, expanding SI (powers of 1000) and binary
/// (powers of 1024) unit suffixes. Rejects mixed or unparseable input.
pub fn parse_quantity(raw: &str) -> Result<i128> {
    let caps = quantity_re()
        .captures(raw.trim())
        .ok_or_else(|| Error::InvalidArgument(format!("not a quantity: {raw:?}")))?;

    let digits: i128 = caps[1]
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("quantity out of range: {raw:?}")))?;

    let multiplier: i128 = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 1,
        Some(ref u) if u == "k" => 1_000,
        Some(ref u) if u == "m" => 1_000_000,
        Some(ref u) if u == "g" => 1_000_000_000,
        Some(ref u) if u == "t" => 1_000_000_000_000,
        Some(ref u) if u == "p" => 1_000_000_000_000_000,
        Some(ref u) if u == "ki" => 1_024,
        Some(ref u) if u == "mi" => 1_024 * 1_024,
        Some(ref u) if u == "gi" => 1_024i128.pow(3),
        Some(ref u) if u == "ti" => 1_024i128.pow(4),
        Some(ref u) if u == "pi" => 1_024i128.pow(5),
        Some(other) => {
            return Err(Error::InvalidArgument(format!("unrecognized unit {other:?} in {raw:?}")))
        }
    };

    digits
        .checked_mul(multiplier)
        .ok_or_else(|| Error::InvalidArgument(format!("quantity overflows: {raw:?}")))
}

/// The operator half of a [`LabelTerm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// The key is present, regardless of value.
    Exists,
    /// The key's value equals one of the given strings.
    Equal(BTreeSet<String>),
    /// The key's value is one of the given strings. Kept distinct from
    /// `Equal` only at the wire layer; they match identically.
    In(BTreeSet<String>),
    /// The key's value is lexicographically less than the bound.
    LessThan(String),
    /// The key's value is lexicographically less than or equal to the bound.
    LessThanOrEqual(String),
    /// The key's value, parsed as a quantity, is numerically less than the
    /// bound (already parsed at construction time).
    LessThanNumeric(i128),
    /// The key's value, parsed as a quantity, is numerically less than or
    /// equal to the bound (already parsed at construction time).
    LessThanOrEqualNumeric(i128),
    /// Deprecated wire-compat alias for an inverted `Exists`: this predates
    /// the generic `Invert` flag. Accepted on the wire but rejected by
    /// [`LabelTerm::try_new`] — it is not a usable in-process query term.
    NotExistsDeprecated,
}

impl Op {
    /// Build a numeric less-than operator from a raw quantity string,
    /// eagerly validating the bound.
    pub fn less_than_numeric(raw: &str) -> Result<Self> {
        Ok(Op::LessThanNumeric(parse_quantity(raw)?))
    }

    /// Build a numeric less-than-or-equal operator from a raw quantity
    /// string, eagerly validating the bound.
    pub fn less_than_or_equal_numeric(raw: &str) -> Result<Self> {
        Ok(Op::LessThanOrEqualNumeric(parse_quantity(raw)?))
    }

    fn matches_value(&self, value: Option<&str>) -> bool {
        match self {
            Op::Exists => value.is_some(),
            Op::NotExistsDeprecated => value.is_none(),
            Op::Equal(set) | Op::In(set) => value.is_some_and(|v| set.contains(v)),
            Op::LessThan(bound) => value.is_some_and(|v| v < bound.as_str()),
            Op::LessThanOrEqual(bound) => value.is_some_and(|v| v <= bound.as_str()),
            Op::LessThanNumeric(bound) => value
                .and_then(|v| parse_quantity(v).ok())
                .is_some_and(|v| v < *bound),
            Op::LessThanOrEqualNumeric(bound) => value
                .and_then(|v| parse_quantity(v).ok())
                .is_some_and(|v| v <= *bound),
        }
    }
}

/// A single `key op value(s)` predicate, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTerm {
    /// The label key this term inspects.
    pub key: String,
    /// The operator applied to the resource's value for `key`.
    pub op: Op,
    /// Whether the term's result is negated before conjunction.
    pub invert: bool,
}

impl LabelTerm {
    /// Build a new term.
    #[must_use]
    pub fn new(key: impl Into<String>, op: Op, invert: bool) -> Self {
        Self {
            key: key.into(),
            op,
            invert,
        }
    }

    /// Build a term, rejecting the deprecated `NotExistsDeprecated` op
    /// outright: it's accepted on the wire for compatibility, but an
    /// in-process query must spell it as `Exists` with `invert: true`.
    pub fn try_new(key: impl Into<String>, op: Op, invert: bool) -> Result<Self> {
        if matches!(op, Op::NotExistsDeprecated) {
            return Err(Error::InvalidArgument(
                "NOT_EXISTS is wire-compatible only; use Exists with invert=true".to_string(),
            ));
        }
        Ok(Self::new(key, op, invert))
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key).map(String::as_str);
        let matched = self.op.matches_value(value);
        matched != self.invert
    }
}

/// A conjunction of [`LabelTerm`]s. An empty query matches every
/// resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelQuery(Vec<LabelTerm>);

impl LabelQuery {
    /// The query that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a query from its conjoined terms.
    #[must_use]
    pub fn new(terms: Vec<LabelTerm>) -> Self {
        Self(terms)
    }

    /// Add a term to the conjunction, builder-style.
    #[must_use]
    pub fn with_term(mut self, term: LabelTerm) -> Self {
        self.0.push(term);
        self
    }

    /// The conjoined terms.
    #[must_use]
    pub fn terms(&self) -> &[LabelTerm] {
        &self.0
    }

    /// Whether `labels` satisfies every term.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|term| term.matches(labels))
    }
}
