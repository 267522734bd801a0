//! The change events delivered by `Watch`/`WatchKind`.

use runtime_core::{Pointer, Resource, Version};

use crate::bookmark::Bookmark;

/// A single change delivered to a watcher.
///
/// `Errored` is deliberately not a variant here: this crate's
/// streams yield `Result<Event, runtime_core::Error>`, so a terminal error
/// is carried as the `Err` arm of the stream rather than as a value that
/// could be mistaken for a normal event. The wire contract in
/// `runtime-wire` restores a flat `Errored` variant for the RPC boundary,
/// where a uniform enum-with-error-text is what the protocol needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A resource newly exists (first observation, or re-entered a label
    /// filter).
    Created {
        /// The resource as of this event.
        resource: Resource,
        /// Resumption marker for this event, if the watch was opened with
        /// bookmarking enabled.
        bookmark: Option<Bookmark>,
    },
    /// A resource already known to the watcher changed.
    Updated {
        /// The resource's new state.
        resource: Resource,
        /// The version prior to this update.
        old_version: Version,
        /// Resumption marker for this event.
        bookmark: Option<Bookmark>,
    },
    /// A resource was destroyed, or left a label filter.
    Destroyed {
        /// The last known state, when available.
        resource: Option<Resource>,
        /// The version prior to destruction, when available.
        old_version: Option<Version>,
        /// Resumption marker for this event.
        bookmark: Option<Bookmark>,
    },
    /// Boundary marker: every currently-matching resource has been sent as
    /// a `Created` event; subsequent events are live.
    Bootstrapped {
        /// Resumption marker taken at the bootstrap boundary, if
        /// `BootstrapBookmark` was requested.
        bookmark: Option<Bookmark>,
    },
    /// A write occurred on `pointer` but neither the old nor new state
    /// matched the watcher's label filter.
    Noop {
        /// The resource the write targeted.
        pointer: Pointer,
        /// Resumption marker for this event.
        bookmark: Option<Bookmark>,
    },
}

impl Event {
    /// The resumption marker carried by this event, if any.
    #[must_use]
    pub fn bookmark(&self) -> Option<Bookmark> {
        match self {
            Event::Created { bookmark, .. }
            | Event::Updated { bookmark, .. }
            | Event::Destroyed { bookmark, .. }
            | Event::Bootstrapped { bookmark }
            | Event::Noop { bookmark, .. } => *bookmark,
        }
    }

    /// Return a copy of this event with its bookmark field replaced.
    #[must_use]
    pub(crate) fn with_bookmark(self, bookmark: Option<Bookmark>) -> Event {
        match self {
            Event::Created { resource, .. } => Event::Created { resource, bookmark },
            Event::Updated { resource, old_version, .. } => Event::Updated {
                resource,
                old_version,
                bookmark,
            },
            Event::Destroyed { resource, old_version, .. } => Event::Destroyed {
                resource,
                old_version,
                bookmark,
            },
            Event::Bootstrapped { .. } => Event::Bootstrapped { bookmark },
            Event::Noop { pointer, .. } => Event::Noop { pointer, bookmark },
        }
    }

    /// The resource attached to this event, if any (present for `Created`
    /// and `Updated`, optionally for `Destroyed`).
    pub(crate) fn resource_ref(&self) -> Option<&Resource> {
        match self {
            Event::Created { resource, .. } | Event::Updated { resource, .. } => Some(resource),
            Event::Destroyed { resource, .. } => resource.as_ref(),
            _ => None,
        }
    }

    /// The version prior to this event, for variants that carry one.
    pub(crate) fn old_version(&self) -> Option<Version> {
        match self {
            Event::Updated { old_version, .. } => Some(*old_version),
            Event::Destroyed { old_version, .. } => *old_version,
            _ => None,
        }
    }
}
