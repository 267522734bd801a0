//! Keys into the store: a `Kind` names a watchable collection, a `Pointer`
//! names a single resource within one.

use std::fmt;

/// `(namespace, type)` — the unit that `WatchKind` subscribes to and that a
/// controller `Input`/`Output` declares against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Kind {
    /// Namespace the kind lives in.
    pub namespace: String,
    /// The resource type name.
    pub type_: String,
}

impl Kind {
    /// Build a new `Kind`.
    pub fn new(namespace: impl Into<String>, type_: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            type_: type_.into(),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.type_)
    }
}

/// `(namespace, type, id)` — the unique key of a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// The resource type name.
    pub type_: String,
    /// The resource id, unique within `(namespace, type)`.
    pub id: String,
}

impl Pointer {
    /// Build a new `Pointer`.
    pub fn new(namespace: impl Into<String>, type_: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            type_: type_.into(),
            id: id.into(),
        }
    }

    /// The `Kind` this pointer's resource belongs to.
    #[must_use]
    pub fn kind(&self) -> Kind {
        Kind::new(self.namespace.clone(), self.type_.clone())
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.type_, self.id)
    }
}
