//! The in-memory Core Store: a keyed, versioned resource store with
//! bootstrap-aware, bookmark-resumable watch streams.
//!
//! Built strictly on top of `runtime-core`'s resource model — this crate
//! adds concurrency, ordering and change notification, nothing else. The
//! State Wrapper and Access Filter are convenience layers
//! built on top of this, implemented in `runtime-engine`.

pub mod bookmark;
pub mod core;
pub mod event;
pub mod history;
pub mod options;
pub mod stream;

pub use bookmark::Bookmark;
pub use core::{CoreStore, CoreStoreConfig};
pub use event::Event;
pub use options::{
    CreateOptions, DestroyOptions, ExpectedPhase, GetOptions, ListOptions, UpdateOptions, WatchKindAggregatedOptions,
    WatchKindOptions, WatchOptions, WatchStart,
};
pub use stream::WatchStream;
