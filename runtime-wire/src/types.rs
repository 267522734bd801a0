//! Wire-shape mirrors of `runtime-core`/`runtime-store` types.
//!
//! These are deliberately separate structs rather than `#[derive(Serialize)]`
//! on the in-process types: the wire format freezes phase/version as
//! strings, timestamps as wall-clock values, and spec as `(proto_bytes,
//! yaml_text)` rather than an opaque `serde_json::Value`. Conversions are
//! explicit (`TryFrom`/`From`) so a wire-format change never silently
//! changes in-process semantics.

use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

use runtime_core::{Error, Finalizers, Metadata, Phase, Pointer, Resource, Version};
use runtime_store::{Bookmark, Event};
use serde::{Deserialize, Serialize};

/// The wire form of [`runtime_core::Resource`]'s spec: opaque to the
/// runtime, carried as either encoded bytes or YAML text. Either
/// may be empty; a transport implementation decides which it populates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSpec {
    /// Protobuf-encoded (or otherwise binary-encoded) spec payload.
    #[serde(default)]
    pub proto_bytes: Vec<u8>,
    /// YAML-encoded spec payload.
    #[serde(default)]
    pub yaml_text: String,
}

/// Lifecycle phase as the wire spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WirePhase {
    /// `"running"`.
    Running,
    /// `"tearing down"`.
    TearingDown,
}

impl From<Phase> for WirePhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Running => WirePhase::Running,
            Phase::TearingDown => WirePhase::TearingDown,
        }
    }
}

impl From<WirePhase> for Phase {
    fn from(phase: WirePhase) -> Self {
        match phase {
            WirePhase::Running => Phase::Running,
            WirePhase::TearingDown => Phase::TearingDown,
        }
    }
}

fn to_wire_timestamp(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn from_wire_timestamp(secs: u64) -> SystemTime {
    UNIX_EPOCH + std::time::Duration::from_secs(secs)
}

/// Wire form of [`runtime_core::Metadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMetadata {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// The resource type name.
    #[serde(rename = "type")]
    pub type_: String,
    /// The resource id, unique within `(namespace, type)`.
    pub id: String,
    /// Printable monotonic version; `"undefined"` before the first write.
    pub version: String,
    /// The controller that created this resource.
    pub owner: String,
    /// `"running"` or `"tearing down"`.
    pub phase: WirePhase,
    /// Unix timestamp (seconds) of creation.
    pub created_unix_secs: u64,
    /// Unix timestamp (seconds) of the last successful mutation.
    pub updated_unix_secs: u64,
    /// Ordered finalizer set.
    pub finalizers: Vec<String>,
    /// User-supplied labels.
    pub labels: BTreeMap<String, String>,
    /// User-supplied annotations.
    pub annotations: BTreeMap<String, String>,
}

impl From<&Metadata> for WireMetadata {
    fn from(m: &Metadata) -> Self {
        Self {
            namespace: m.namespace.clone(),
            type_: m.type_.clone(),
            id: m.id.clone(),
            version: m.version.as_display(),
            owner: m.owner.clone(),
            phase: m.phase.into(),
            created_unix_secs: to_wire_timestamp(m.created),
            updated_unix_secs: to_wire_timestamp(m.updated),
            finalizers: m.finalizers.as_slice().to_vec(),
            labels: m.labels.clone(),
            annotations: m.annotations.clone(),
        }
    }
}

impl TryFrom<WireMetadata> for Metadata {
    type Error = Error;

    fn try_from(w: WireMetadata) -> Result<Self, Self::Error> {
        let version = if w.version == "undefined" {
            Version::UNDEFINED
        } else {
            let raw: u64 = w
                .version
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("bad version string: {:?}", w.version)))?;
            Version::new(raw)
        };
        Ok(Metadata {
            namespace: w.namespace,
            type_: w.type_,
            id: w.id,
            version,
            owner: w.owner,
            phase: w.phase.into(),
            created: from_wire_timestamp(w.created_unix_secs),
            updated: from_wire_timestamp(w.updated_unix_secs),
            finalizers: w.finalizers.into_iter().collect::<Finalizers>(),
            labels: w.labels,
            annotations: w.annotations,
        })
    }
}

/// Wire form of [`runtime_core::Resource`]. Only the wire layer ever sees a resource with `spec` in this
/// shape — in-process code always works with `serde_json::Value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResource {
    /// Identity, lifecycle and bookkeeping fields.
    pub metadata: WireMetadata,
    /// The opaque controller-defined payload.
    pub spec: WireSpec,
}

impl From<&Resource> for WireResource {
    fn from(r: &Resource) -> Self {
        Self {
            metadata: WireMetadata::from(&r.metadata),
            spec: WireSpec {
                proto_bytes: Vec::new(),
                yaml_text: serde_json::to_string(&r.spec).unwrap_or_default(),
            },
        }
    }
}

impl TryFrom<WireResource> for Resource {
    type Error = Error;

    fn try_from(w: WireResource) -> Result<Self, Self::Error> {
        let spec = if !w.spec.yaml_text.is_empty() {
            serde_json::from_str(&w.spec.yaml_text)
                .map_err(|e| Error::InvalidArgument(format!("malformed spec yaml_text: {e}")))?
        } else {
            serde_json::Value::Null
        };
        Ok(Resource::new(w.metadata.try_into()?, spec))
    }
}

/// Wire discriminant for [`WireEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireEventType {
    /// See [`runtime_store::Event::Created`].
    Created,
    /// See [`runtime_store::Event::Updated`].
    Updated,
    /// See [`runtime_store::Event::Destroyed`].
    Destroyed,
    /// See [`runtime_store::Event::Bootstrapped`].
    Bootstrapped,
    /// See [`runtime_store::Event::Noop`].
    Noop,
    /// The watch terminated with an error; `error_text` is populated and no
    /// further events follow.
    Errored,
}

/// Wire form of a watch event. Unlike the in-process [`Event`], which
/// carries a terminal error as the stream's `Err` arm, the wire contract
/// flattens it back into an `Errored` variant of this same envelope — RPC
/// framing has no separate error channel for a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// What kind of change this is.
    pub event_type: WireEventType,
    /// The resource's new state, when the event carries one.
    pub new: Option<WireResource>,
    /// The resource's prior state, when known and applicable (`Destroyed`
    /// with a carried resource, or a future diff-carrying event type).
    pub old: Option<WireResource>,
    /// Populated only for `event_type: Errored`.
    pub error_text: String,
    /// Resumption marker, if the watch requested bookmarks.
    pub bookmark: Option<String>,
    /// The resource pointer a `Noop` event targeted, namespace/type/id
    /// joined with `/`. Empty for every other event type.
    pub noop_pointer: String,
}

impl WireEvent {
    /// Build the flattened `Errored` variant the wire contract uses in
    /// place of a stream-level error.
    #[must_use]
    pub fn errored(error: &Error) -> Self {
        Self {
            event_type: WireEventType::Errored,
            new: None,
            old: None,
            error_text: error.to_string(),
            bookmark: None,
            noop_pointer: String::new(),
        }
    }
}

fn wire_bookmark(bookmark: Option<Bookmark>) -> Option<String> {
    bookmark.map(|b| b.encode())
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        match event {
            Event::Created { resource, bookmark } => Self {
                event_type: WireEventType::Created,
                new: Some(WireResource::from(resource)),
                old: None,
                error_text: String::new(),
                bookmark: wire_bookmark(*bookmark),
                noop_pointer: String::new(),
            },
            Event::Updated { resource, bookmark, .. } => Self {
                event_type: WireEventType::Updated,
                new: Some(WireResource::from(resource)),
                old: None,
                error_text: String::new(),
                bookmark: wire_bookmark(*bookmark),
                noop_pointer: String::new(),
            },
            Event::Destroyed { resource, bookmark, .. } => Self {
                event_type: WireEventType::Destroyed,
                new: None,
                old: resource.as_ref().map(WireResource::from),
                error_text: String::new(),
                bookmark: wire_bookmark(*bookmark),
                noop_pointer: String::new(),
            },
            Event::Bootstrapped { bookmark } => Self {
                event_type: WireEventType::Bootstrapped,
                new: None,
                old: None,
                error_text: String::new(),
                bookmark: wire_bookmark(*bookmark),
                noop_pointer: String::new(),
            },
            Event::Noop { pointer, bookmark } => Self {
                event_type: WireEventType::Noop,
                new: None,
                old: None,
                error_text: String::new(),
                bookmark: wire_bookmark(*bookmark),
                noop_pointer: pointer.to_string(),
            },
        }
    }
}

/// Wire form of a [`runtime_core::LabelTerm`] operator.
/// Carries the deprecated `NotExists` op verbatim: it is accepted
/// on the wire but rejected by `runtime-core` when built into an in-process
/// [`runtime_core::LabelQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WireLabelOp {
    /// The key must be present.
    Exists,
    /// Deprecated: the key must be absent. Wire-compatible only.
    NotExists,
    /// The value must equal one of `values`.
    Equal {
        /// Accepted values.
        values: Vec<String>,
    },
    /// The value must be one of `values`.
    In {
        /// Accepted values.
        values: Vec<String>,
    },
    /// The value must be lexicographically less than `bound`.
    LessThan {
        /// The exclusive upper bound.
        bound: String,
    },
    /// The value must be lexicographically less than or equal to `bound`.
    LessThanOrEqual {
        /// The inclusive upper bound.
        bound: String,
    },
    /// The value, parsed as a quantity, must be numerically less than
    /// `bound`.
    LessThanNumeric {
        /// The raw (unparsed) quantity bound.
        bound: String,
    },
    /// The value, parsed as a quantity, must be numerically less than or
    /// equal to `bound`.
    LessThanOrEqualNumeric {
        /// The raw (unparsed) quantity bound.
        bound: String,
    },
}

/// Wire form of a [`runtime_core::LabelTerm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLabelTerm {
    /// The label key this term inspects.
    pub key: String,
    /// The operator applied to the resource's value for `key`.
    pub op: WireLabelOp,
    /// Whether the term's result is negated before conjunction.
    #[serde(default)]
    pub invert: bool,
}

/// Wire form of an `IdQuery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireIdQuery {
    /// The regular expression pattern matched against a resource's id.
    pub pattern: String,
}

impl TryFrom<&WireLabelTerm> for runtime_core::LabelTerm {
    type Error = Error;

    fn try_from(w: &WireLabelTerm) -> Result<Self, Self::Error> {
        use runtime_core::Op;
        let op = match &w.op {
            WireLabelOp::Exists => Op::Exists,
            WireLabelOp::NotExists => Op::NotExistsDeprecated,
            WireLabelOp::Equal { values } => Op::Equal(values.iter().cloned().collect()),
            WireLabelOp::In { values } => Op::In(values.iter().cloned().collect()),
            WireLabelOp::LessThan { bound } => Op::LessThan(bound.clone()),
            WireLabelOp::LessThanOrEqual { bound } => Op::LessThanOrEqual(bound.clone()),
            WireLabelOp::LessThanNumeric { bound } => Op::less_than_numeric(bound)?,
            WireLabelOp::LessThanOrEqualNumeric { bound } => Op::less_than_or_equal_numeric(bound)?,
        };
        runtime_core::LabelTerm::try_new(w.key.clone(), op, w.invert)
    }
}

impl TryFrom<&WireIdQuery> for runtime_core::IdQuery {
    type Error = Error;

    fn try_from(w: &WireIdQuery) -> Result<Self, Self::Error> {
        runtime_core::IdQuery::new(&w.pattern)
    }
}

/// A resource key as the wire spells it everywhere a bare `(namespace,
/// type, id)` is needed (`Get`/`Destroy`/scoped `Watch`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePointer {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// The resource type name.
    #[serde(rename = "type")]
    pub type_: String,
    /// The resource id.
    pub id: String,
}

impl From<&Pointer> for WirePointer {
    fn from(p: &Pointer) -> Self {
        Self {
            namespace: p.namespace.clone(),
            type_: p.type_.clone(),
            id: p.id.clone(),
        }
    }
}

impl From<&WirePointer> for Pointer {
    fn from(w: &WirePointer) -> Self {
        Pointer::new(w.namespace.clone(), w.type_.clone(), w.id.clone())
    }
}

/// Wire-safe classification of an [`runtime_core::Error`]. Carries the kind separately from the
/// message so a remote client can match on it without string-sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    /// See [`Error::NotFound`].
    NotFound,
    /// See [`Error::Conflict`].
    Conflict,
    /// See [`Error::OwnerConflict`].
    OwnerConflict,
    /// See [`Error::PhaseConflict`].
    PhaseConflict,
    /// See [`Error::InvalidBookmark`].
    InvalidBookmark,
    /// See [`Error::BufferOverrun`].
    BufferOverrun,
    /// See [`Error::AccessDenied`].
    AccessDenied,
    /// See [`Error::InvalidArgument`].
    InvalidArgument,
    /// See [`Error::Cancelled`].
    Cancelled,
}

/// Wire form of an error response: a matchable kind plus a human-readable
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct WireError {
    /// The error's taxonomy kind.
    pub kind: WireErrorKind,
    /// A human-readable description; not matched on by well-behaved
    /// callers.
    pub message: String,
}

impl From<&Error> for WireError {
    fn from(e: &Error) -> Self {
        let kind = match e {
            Error::NotFound(_) => WireErrorKind::NotFound,
            Error::Conflict(_) => WireErrorKind::Conflict,
            Error::OwnerConflict(_) => WireErrorKind::OwnerConflict,
            Error::PhaseConflict(_) => WireErrorKind::PhaseConflict,
            Error::InvalidBookmark(_) => WireErrorKind::InvalidBookmark,
            Error::BufferOverrun(_) => WireErrorKind::BufferOverrun,
            Error::AccessDenied(_) => WireErrorKind::AccessDenied,
            Error::InvalidArgument(_) => WireErrorKind::InvalidArgument,
            Error::Cancelled => WireErrorKind::Cancelled,
        };
        Self { kind, message: e.to_string() }
    }
}

impl From<Error> for WireError {
    fn from(e: Error) -> Self {
        WireError::from(&e)
    }
}

impl From<WireError> for Error {
    fn from(w: WireError) -> Self {
        match w.kind {
            WireErrorKind::NotFound => Error::NotFound(w.message),
            WireErrorKind::Conflict => Error::Conflict(w.message),
            WireErrorKind::OwnerConflict => Error::OwnerConflict(w.message),
            WireErrorKind::PhaseConflict => Error::PhaseConflict(w.message),
            WireErrorKind::InvalidBookmark => Error::InvalidBookmark(w.message),
            WireErrorKind::BufferOverrun => Error::BufferOverrun(w.message),
            WireErrorKind::AccessDenied => Error::AccessDenied(w.message),
            WireErrorKind::InvalidArgument => Error::InvalidArgument(w.message),
            WireErrorKind::Cancelled => Error::Cancelled,
        }
    }
}

/// Alias for the result type every [`crate::service::RuntimeService`] method
/// returns.
pub type WireResult<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use runtime_core::Metadata;
    use serde_json::json;

    use super::*;

    #[test]
    fn metadata_round_trips_through_the_wire_shape() {
        let mut m = Metadata::new("ns", "widget", "a");
        m.version = Version::new(3);
        m.owner = "doubler".to_string();
        m.phase = Phase::TearingDown;
        m.finalizers.add("f1");

        let wire = WireMetadata::from(&m);
        assert_eq!(wire.version, "3");
        assert_eq!(wire.phase, WirePhase::TearingDown);

        let back: Metadata = wire.try_into().unwrap();
        assert_eq!(back.namespace, m.namespace);
        assert_eq!(back.version, m.version);
        assert_eq!(back.owner, m.owner);
        assert_eq!(back.phase, m.phase);
        assert_eq!(back.finalizers.as_slice(), m.finalizers.as_slice());
    }

    #[test]
    fn undefined_version_round_trips() {
        let m = Metadata::new("ns", "widget", "a");
        let wire = WireMetadata::from(&m);
        assert_eq!(wire.version, "undefined");
        let back: Metadata = wire.try_into().unwrap();
        assert_eq!(back.version, Version::UNDEFINED);
    }

    #[test]
    fn resource_round_trips_through_yaml_text() {
        let r = Resource::new(Metadata::new("ns", "widget", "a"), json!({"n": 42}));
        let wire = WireResource::from(&r);
        assert!(!wire.spec.yaml_text.is_empty());
        let back: Resource = wire.try_into().unwrap();
        assert_eq!(back.spec, json!({"n": 42}));
    }

    #[test]
    fn errored_event_has_no_payload() {
        let e = WireEvent::errored(&Error::BufferOverrun("ns/widget fell behind".to_string()));
        assert_eq!(e.event_type, WireEventType::Errored);
        assert!(e.error_text.contains("buffer overrun"));
        assert!(e.new.is_none());
    }

    #[test]
    fn not_exists_deprecated_op_is_accepted_on_the_wire_but_rejected_in_process() {
        let wire = WireLabelTerm {
            key: "tier".to_string(),
            op: WireLabelOp::NotExists,
            invert: false,
        };
        // Deserializing/serializing the wire shape never fails...
        let round_tripped: WireLabelTerm =
            serde_json::from_str(&serde_json::to_string(&wire).unwrap()).unwrap();
        assert_eq!(round_tripped, wire);
        // ...but building an in-process `LabelTerm` from it does.
        let err: Result<runtime_core::LabelTerm, _> = (&wire).try_into();
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn error_kind_round_trips() {
        let original = Error::OwnerConflict("ns/widget/a owned by foo".to_string());
        let wire = WireError::from(&original);
        assert_eq!(wire.kind, WireErrorKind::OwnerConflict);
        let back: Error = wire.into();
        assert!(matches!(back, Error::OwnerConflict(_)));
    }
}
