//! The Controller Engine: dependency graph, watch deduplication, reconcile
//! scheduler and generic Transform Controller.
//!
//! Built on top of `runtime-store`'s `CoreStore`: this crate owns nothing
//! about storage itself, only the scheduling and access-control discipline
//! layered over it — the State Wrapper and Access Filter, the dependency
//! database and watch dedup pipeline that drive reconciles, and the
//! Transform Controller built on top of all of it.

pub mod access;
pub mod backoff;
pub mod controller;
pub mod dedup;
pub mod depgraph;
pub mod metrics;
pub mod ratelimit;
pub mod state;
pub mod transform;
pub mod wait;

pub use access::{Access, AccessFilter, AccessPredicate, Verb};
pub use backoff::RestartBackoff;
pub use controller::{Controller, ControllerEngine, RuntimeAdapter};
pub use dedup::{DedupPipeline, ReducedMetadata};
pub use depgraph::{DependencyDatabase, InputDecl, InputKind, OutputDecl, OutputKind, WatchDiff};
pub use metrics::{ControllerCounters, EngineMetrics};
pub use ratelimit::RateLimiter;
pub use state::State;
pub use transform::{
    FinalizerOutcome, FinalizerRemoval, MapMetadata, MapOutcome, NoFinalizerRemoval, Transform, TransformController,
    TransformControllerConfig, TransformError,
};
pub use wait::{finalizers_empty, is_event_kind, phase_in, satisfies, Condition, EventKind};
