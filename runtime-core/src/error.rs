//! The error taxonomy shared by every layer of the runtime.
//!
//! Each crate above `runtime-core` wraps this in its own `Error` where it
//! needs extra variants, but every failure that the store, state wrapper or
//! controller engine can report back to a caller is one of these kinds.

use thiserror::Error;

/// A pointer-independent classification of why an operation failed.
///
/// This is deliberately small and closed: propagation policy says
/// the store never retries and surfaces these exactly, so callers match on
/// `kind()` rather than downcasting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested (namespace, type, id) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A generic version or state conflict on mutation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A mutation was attempted by a non-owning principal.
    #[error("owner conflict: {0}")]
    OwnerConflict(String),

    /// `Update` was requested against a phase other than the one expected.
    #[error("phase conflict: {0}")]
    PhaseConflict(String),

    /// `Watch` could not resume from the given bookmark.
    #[error("invalid bookmark: {0}")]
    InvalidBookmark(String),

    /// A watcher fell too far behind the per-kind history ring.
    #[error("buffer overrun: {0}")]
    BufferOverrun(String),

    /// An access filter or controller declaration denied the operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A malformed query: unparseable regex, unsupported label operator, or
    /// a bad version string.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller's cancellation token fired before the operation completed.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Build a [`Error::NotFound`] for a given pointer-ish description.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Returns true if retrying the same call (after re-`Get`ting) could
    /// plausibly succeed. Used by the State wrapper's `UpdateWithConflicts`.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

/// Convenience alias used throughout the runtime crates.
pub type Result<T> = std::result::Result<T, Error>;
