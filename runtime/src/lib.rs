//! In-memory declarative resource store and controller runtime: an
//! in-process analogue of a Kubernetes API server plus controller-runtime,
//! without durable storage, replication or leader election (see each
//! module's own docs for exact scope).
//!
//! This crate re-exports `runtime-core`, `runtime-store`, `runtime-engine`
//! and `runtime-wire` under one name; [`prelude`] gathers the types most
//! programs need into a single glob import.
//!
//! # Example
//!
//! ```
//! use runtime::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), runtime_core::Error> {
//! let store = CoreStore::new(CoreStoreConfig::default());
//! let resource = Resource::new(Metadata::new("default", "widget", "a"), serde_json::json!({}));
//! let created = store.create(resource, CreateOptions::default()).await?;
//! assert_eq!(created.metadata.version, Version::new(1));
//! # Ok(())
//! # }
//! ```

#[doc(inline)]
pub use runtime_core as core;
#[doc(inline)]
pub use runtime_engine as engine;
#[doc(inline)]
pub use runtime_store as store;
#[doc(inline)]
pub use runtime_wire as wire;

/// The types most programs need, gathered into one glob import — mirroring
/// how `kube`'s own top level re-exports `Client`/`Api`/`Error` directly
/// rather than requiring `kube::client::Client` everywhere.
pub mod prelude {
    pub use runtime_core::{
        Error, IdQuery, Kind, LabelQuery, LabelTerm, Metadata, Op, Phase, Pointer, Resource, Result, Version,
    };
    pub use runtime_engine::{
        Access, AccessFilter, Controller, ControllerEngine, DependencyDatabase, FinalizerRemoval, InputDecl, InputKind,
        MapMetadata, OutputDecl, OutputKind, RuntimeAdapter, State, Transform, TransformController, TransformControllerConfig,
    };
    pub use runtime_store::{
        Bookmark, CoreStore, CoreStoreConfig, CreateOptions, DestroyOptions, Event, GetOptions, ListOptions, UpdateOptions,
        WatchKindOptions, WatchOptions, WatchStream,
    };
}
