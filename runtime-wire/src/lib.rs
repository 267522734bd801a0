//! Wire contract types and the RPC trait boundary a remote controller-
//! runtime bridge would implement against.
//!
//! This crate implements no transport: no gRPC, no HTTP, no framing over a
//! socket. It exists purely as the typed contract between an in-process
//! `runtime-store`/`runtime-engine` and whatever eventually stands in front
//! of them remotely — analogous to `kube-client`'s request/response types
//! without `kube-client`'s actual HTTP stack.

pub mod service;
pub mod types;

pub use service::{
    ControllerService, ControllerToken, CreateRequestOptions, DestroyRequestOptions, ListRequestOptions, RuntimeService,
    UpdateRequestOptions, WatchRequestOptions, WireInputDecl, WireOutputDecl,
};
pub use types::{
    WireError, WireErrorKind, WireEvent, WireEventType, WireIdQuery, WireLabelOp, WireLabelTerm, WireMetadata, WirePhase,
    WirePointer, WireResource, WireResult, WireSpec,
};
