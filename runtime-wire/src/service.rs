//! The RPC trait boundary a remote transport would implement against. No
//! gRPC/HTTP server or client lives here — that's explicitly out of scope;
//! the trait exists so a future binding has a concrete, typed contract
//! rather than an ad-hoc wire format.
//!
//! Grounded on `kube-runtime`'s `Controller`/`applier` split for the
//! separation between plain resource RPCs (`RuntimeService`, mirroring
//! `Api<K>`) and the controller-lifecycle RPCs (`ControllerService`,
//! mirroring `Controller::new(...).run(...)`), and on this workspace's own
//! `runtime_engine::controller::RuntimeAdapter` for which operations a
//! controller token is allowed to perform.

use std::future::Future;

use futures::Stream;

use crate::types::{WireError, WireEvent, WireResource, WirePointer};

/// Filter/behavior options for a `List` RPC.
#[derive(Debug, Clone, Default)]
pub struct ListRequestOptions {
    /// Conjoined label terms, wire-encoded.
    pub label_query: Vec<crate::types::WireLabelTerm>,
    /// An id-matching regex, if filtering by id.
    pub id_query: Option<crate::types::WireIdQuery>,
}

/// Behavior options for a `Watch`/`WatchKind` RPC.
#[derive(Debug, Clone, Default)]
pub struct WatchRequestOptions {
    /// Send a `Created` event per currently-matching resource before live
    /// events (single-key `Watch` has no notion of this; `WatchKind` does).
    pub bootstrap_contents: bool,
    /// Pre-deliver up to this many of the most recent matching history
    /// events before live events begin.
    pub tail_events: usize,
    /// Resume after this bookmark instead of starting live.
    pub start_from_bookmark: Option<String>,
    /// Whether delivered events should carry a resumption bookmark.
    pub with_bookmarks: bool,
    /// Emit a bookmark alongside the `Bootstrapped` sentinel.
    pub bootstrap_bookmark: bool,
    /// Conjoined label terms restricting which resources this watch covers
    /// (`WatchKind` only).
    pub label_query: Vec<crate::types::WireLabelTerm>,
    /// An id-matching regex restricting this watch (`WatchKind` only).
    pub id_query: Option<crate::types::WireIdQuery>,
    /// Batch events into groups of at most this many before delivery
    /// (`WatchKindAggregated`; `0` means unaggregated).
    pub aggregated_max_batch: usize,
}

/// Options carried by a `Create` RPC.
#[derive(Debug, Clone, Default)]
pub struct CreateRequestOptions {
    /// The controller name to stamp as owner.
    pub owner: Option<String>,
}

/// Options carried by an `Update` RPC.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequestOptions {
    /// If set, the update fails with owner-conflict unless the stored
    /// owner matches.
    pub owner: Option<String>,
    /// The phase the caller expects the resource to currently be in;
    /// `None` means "any phase".
    pub expected_phase: Option<crate::types::WirePhase>,
}

/// Options carried by a `Destroy` RPC.
#[derive(Debug, Clone, Default)]
pub struct DestroyRequestOptions {
    /// If set, the destroy fails with owner-conflict unless the stored
    /// owner matches.
    pub owner: Option<String>,
}

/// The plain resource CRUD + watch surface. A
/// transport implementation (gRPC, a local socket framing) adapts incoming
/// requests to these calls and wire-encodes the results; this trait carries
/// no assumption about how a call reached it.
pub trait RuntimeService: Send + Sync {
    /// Fetch a single resource by pointer.
    fn get(&self, target: WirePointer) -> impl Future<Output = Result<WireResource, WireError>> + Send;

    /// List resources matching a query. Returns the full result set rather
    /// than a stream: `List` is not itself an ongoing subscription, unlike
    /// `Watch`.
    fn list(
        &self,
        namespace: String,
        type_: String,
        options: ListRequestOptions,
    ) -> impl Future<Output = Result<Vec<WireResource>, WireError>> + Send;

    /// Create a new resource.
    fn create(
        &self,
        resource: WireResource,
        options: CreateRequestOptions,
    ) -> impl Future<Output = Result<WireResource, WireError>> + Send;

    /// Update an existing resource.
    fn update(
        &self,
        resource: WireResource,
        options: UpdateRequestOptions,
    ) -> impl Future<Output = Result<WireResource, WireError>> + Send;

    /// Destroy a resource.
    fn destroy(&self, target: WirePointer, options: DestroyRequestOptions) -> impl Future<Output = Result<(), WireError>> + Send;

    /// A watch stream scoped to a single resource, or an entire kind when
    /// `target.id` is empty.
    ///
    /// The returned stream's final item may be `Err`: watch streams
    /// terminate on any error; the stream never yields a `WireEvent` with
    /// `event_type: Errored` itself, since `Result::Err` already carries
    /// that — `WireEvent::errored` exists for transports that must flatten
    /// the two into one wire envelope (e.g. a single streaming RPC response
    /// type), not for this trait's own return type.
    fn watch(
        &self,
        target: WirePointer,
        options: WatchRequestOptions,
    ) -> impl Future<Output = Result<impl Stream<Item = Result<WireEvent, WireError>> + Send + 'static, WireError>> + Send;
}

/// An opaque handle identifying a controller registered through
/// [`ControllerService::register_controller`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerToken {
    /// The opaque token value; transports are free to choose its
    /// encoding, a UUID or an incrementing id are both fine.
    pub value: String,
}

impl ControllerToken {
    /// Wrap a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// One declared input, as carried over the wire for `RegisterController`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireInputDecl {
    /// Namespace of the watched kind.
    pub namespace: String,
    /// Type of the watched kind.
    pub type_: String,
    /// Restrict to one id, or `None` for the whole kind.
    pub id: Option<String>,
    /// `"weak"`, `"strong"`, or `"destroy_ready"`.
    pub kind: String,
}

/// One declared output, as carried over the wire for `RegisterController`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireOutputDecl {
    /// Type of the owned kind.
    pub type_: String,
    /// `"exclusive"` or `"shared"`.
    pub kind: String,
}

/// The controller-lifecycle RPC surface:
/// registration, start/stop, the reconcile-trigger stream, and
/// token-scoped write-through resource operations that the server
/// authorizes against the token's declared inputs/outputs — mirroring
/// `runtime_engine::controller::RuntimeAdapter`'s own access checks, just
/// reached over the wire instead of in-process.
pub trait ControllerService: Send + Sync {
    /// Register a remote controller's declared inputs/outputs, returning a
    /// token scoping every subsequent call.
    fn register_controller(
        &self,
        name: String,
        inputs: Vec<WireInputDecl>,
        outputs: Vec<WireOutputDecl>,
    ) -> impl Future<Output = Result<ControllerToken, WireError>> + Send;

    /// Begin scheduling reconciles for a registered controller.
    fn start(&self, token: &ControllerToken) -> impl Future<Output = Result<(), WireError>> + Send;

    /// Stop scheduling reconciles for a registered controller.
    fn stop(&self, token: &ControllerToken) -> impl Future<Output = Result<(), WireError>> + Send;

    /// The stream of reconcile wake-ups for `token`, mirroring
    /// `RuntimeAdapter::event_ch`.
    /// Each item carries no payload; a wake-up means "reconcile now", not
    /// "this specific resource changed".
    fn reconcile_events(&self, token: &ControllerToken) -> impl Future<Output = Result<impl Stream<Item = ()> + Send + 'static, WireError>> + Send;

    /// Best-effort, non-blocking request for another reconcile.
    fn queue_reconcile(&self, token: &ControllerToken) -> impl Future<Output = Result<(), WireError>> + Send;

    /// Replace the controller's declared inputs.
    fn update_inputs(
        &self,
        token: &ControllerToken,
        inputs: Vec<WireInputDecl>,
    ) -> impl Future<Output = Result<(), WireError>> + Send;

    /// `Get`, authorized against `token`'s declared inputs/outputs.
    fn get(&self, token: &ControllerToken, target: WirePointer) -> impl Future<Output = Result<WireResource, WireError>> + Send;

    /// `Create`, authorized against `token`'s declared outputs; owner is
    /// stamped server-side from the controller's name, not taken from the
    /// request.
    fn create(&self, token: &ControllerToken, resource: WireResource) -> impl Future<Output = Result<WireResource, WireError>> + Send;

    /// `Update`, authorized against `token`'s declared outputs.
    fn update(&self, token: &ControllerToken, resource: WireResource) -> impl Future<Output = Result<WireResource, WireError>> + Send;

    /// `Destroy`, authorized against `token`'s declared outputs.
    fn destroy(&self, token: &ControllerToken, target: WirePointer) -> impl Future<Output = Result<(), WireError>> + Send;

    /// `AddFinalizer`, authorized the same way
    /// `RuntimeAdapter::add_finalizer` is: always on an owned output, or on
    /// a declared `Strong` input.
    fn add_finalizer(
        &self,
        token: &ControllerToken,
        target: WirePointer,
        finalizer: String,
    ) -> impl Future<Output = Result<bool, WireError>> + Send;

    /// `RemoveFinalizer`, subject to the same authorization as
    /// [`ControllerService::add_finalizer`].
    fn remove_finalizer(
        &self,
        token: &ControllerToken,
        target: WirePointer,
        finalizer: String,
    ) -> impl Future<Output = Result<bool, WireError>> + Send;
}

/// Convert a declared [`runtime_engine::InputDecl`] into its wire form.
impl From<&runtime_engine::InputDecl> for WireInputDecl {
    fn from(d: &runtime_engine::InputDecl) -> Self {
        let kind = match d.kind {
            runtime_engine::InputKind::Weak => "weak",
            runtime_engine::InputKind::Strong => "strong",
            runtime_engine::InputKind::DestroyReady => "destroy_ready",
        };
        Self {
            namespace: d.namespace.clone(),
            type_: d.type_.clone(),
            id: d.id.clone(),
            kind: kind.to_string(),
        }
    }
}

/// Convert a declared [`runtime_engine::OutputDecl`] into its wire form.
impl From<&runtime_engine::OutputDecl> for WireOutputDecl {
    fn from(d: &runtime_engine::OutputDecl) -> Self {
        let kind = match d.kind {
            runtime_engine::OutputKind::Exclusive => "exclusive",
            runtime_engine::OutputKind::Shared => "shared",
        };
        Self {
            type_: d.type_.clone(),
            kind: kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use runtime_engine::{InputDecl, InputKind, OutputDecl, OutputKind};

    use super::*;

    #[test]
    fn input_decl_maps_kind_to_its_wire_string() {
        let decl = InputDecl {
            namespace: "ns".to_string(),
            type_: "widget".to_string(),
            id: None,
            kind: InputKind::Strong,
        };
        let wire = WireInputDecl::from(&decl);
        assert_eq!(wire.kind, "strong");
        assert_eq!(wire.namespace, "ns");
    }

    #[test]
    fn output_decl_maps_kind_to_its_wire_string() {
        let decl = OutputDecl {
            type_: "widget".to_string(),
            kind: OutputKind::Shared,
        };
        let wire = WireOutputDecl::from(&decl);
        assert_eq!(wire.kind, "shared");
    }
}
