//! `IDQuery`: a regex matched against a resource's id.

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled regular expression matched against a resource's `id` field.
///
/// Wraps [`regex::Regex`] rather than a raw string so that a malformed
/// pattern is rejected once, at construction, rather than on every `List`
/// call.
#[derive(Debug, Clone)]
pub struct IdQuery(Regex);

impl IdQuery {
    /// Compile `pattern` into an `IdQuery`, or fail with
    /// [`Error::InvalidArgument`] if it isn't a valid regular expression.
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(IdQuery)
            .map_err(|e| Error::InvalidArgument(format!("invalid id query {pattern:?}: {e}")))
    }

    /// The query that matches every id.
    #[must_use]
    pub fn all() -> Self {
        IdQuery(Regex::new(".*").expect("static regex is valid"))
    }

    /// Whether `id` matches this query.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        self.0.is_match(id)
    }

    /// The source pattern this query was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for IdQuery {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

impl Eq for IdQuery {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_against_id() {
        let q = IdQuery::new("^worker-[0-9]+$").unwrap();
        assert!(q.matches("worker-12"));
        assert!(!q.matches("worker-abc"));
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(IdQuery::new("(unclosed").is_err());
    }

    #[test]
    fn all_matches_everything() {
        let q = IdQuery::all();
        assert!(q.matches(""));
        assert!(q.matches("anything"));
    }
}
