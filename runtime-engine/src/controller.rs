//! The Controller Engine: holds a dependency database, a
//! deduplicating watch multiplexer per kind, and per-controller adapters
//! that enforce input/output access discipline, restart backoff and
//! optional rate limiting.
//!
//! Grounded on `kube-runtime`'s `Controller`/`applier` split
//! (`controller/mod.rs`): a generic scheduling core drives an arbitrary
//! number of independently-failing, independently-restarting units of
//! work, each fed by deduplicated watch triggers.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use runtime_core::{Error, Kind, Pointer, Resource, Result};
use runtime_store::{CoreStore, CreateOptions, DestroyOptions, GetOptions, ListOptions, UpdateOptions, WatchKindOptions};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::RestartBackoff,
    dedup::DedupPipeline,
    depgraph::{DependencyDatabase, InputDecl, OutputDecl},
    metrics::EngineMetrics,
    ratelimit::RateLimiter,
    state::State,
};

/// A unit of reconciliation work registered with a [`ControllerEngine`].
///
/// `run` loops on `runtime.event_ch()`, performing reconciliation steps,
/// and returns either normally (clean shutdown) or with an error
/// (triggering restart with backoff). A panic inside `run` is caught by
/// the engine and treated identically to a returned error.
pub trait Controller: Send + Sync + 'static {
    /// A name unique among all controllers registered with one engine.
    fn name(&self) -> &str;

    /// Declared read dependencies.
    fn inputs(&self) -> Vec<InputDecl>;

    /// Declared write targets.
    fn outputs(&self) -> Vec<OutputDecl>;

    /// The controller's reconcile loop.
    fn run(&self, ctx: CancellationToken, runtime: RuntimeAdapter) -> impl Future<Output = Result<()>> + Send;
}

/// The per-controller handle passed into [`Controller::run`]: delegates
/// to the engine's store, but only for the controller's declared
/// inputs/outputs, and stamps writes with the controller's name as owner.
#[derive(Clone)]
pub struct RuntimeAdapter {
    name: String,
    state: State,
    depgraph: Arc<DependencyDatabase>,
    rate_limiter: Arc<RateLimiter>,
    metrics: EngineMetrics,
    watch_manager: Arc<WatchManager>,
    reconcile_tx: mpsc::Sender<()>,
    reconcile_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<()>>>,
    cancel: CancellationToken,
    backoff: Arc<Mutex<RestartBackoff>>,
}

impl RuntimeAdapter {
    /// Await the next pending reconcile signal. Returns once per distinct
    /// wake-up; the channel underneath never accumulates a backlog, so at
    /// most one pending work notification exists at any time.
    pub async fn event_ch(&self) {
        self.reconcile_rx.lock().await.recv().await;
        self.metrics.record_wake_up(&self.name);
    }

    /// Best-effort, non-blocking request for another reconcile.
    pub fn queue_reconcile(&self) {
        let _ = self.reconcile_tx.try_send(());
    }

    /// Replace this controller's declared inputs, diffing against the
    /// current set and applying the minimal add/remove of `WatchKind`
    /// subscriptions.
    pub async fn update_inputs(&self, new_inputs: Vec<InputDecl>) -> Result<()> {
        let diff = self.depgraph.update_inputs(&self.name, new_inputs)?;
        for kind in diff.to_open {
            self.watch_manager.open(kind).await;
        }
        for kind in diff.to_close {
            self.watch_manager.close(&kind).await;
        }
        Ok(())
    }

    fn is_readable(&self, kind: &Kind) -> bool {
        self.depgraph.declares_input(&self.name, kind) || self.depgraph.owns_output(&self.name, &kind.type_)
    }

    /// See [`CoreStore::get`], restricted to declared inputs/outputs.
    pub async fn get(&self, pointer: &Pointer) -> Result<Resource> {
        if !self.is_readable(&pointer.kind()) {
            return Err(Error::AccessDenied(format!("{} has no declared access to {pointer}", self.name)));
        }
        self.state.store().get(pointer, GetOptions::default()).await
    }

    /// See [`CoreStore::list`], restricted to declared inputs/outputs.
    pub async fn list(&self, kind: &Kind, opts: ListOptions) -> Result<Vec<Resource>> {
        if !self.is_readable(kind) {
            return Err(Error::AccessDenied(format!("{} has no declared access to {kind}", self.name)));
        }
        self.state.store().list(kind, opts).await
    }

    fn owned_or_denied(&self, type_: &str) -> Result<()> {
        if self.depgraph.owns_output(&self.name, type_) {
            Ok(())
        } else {
            Err(Error::AccessDenied(format!("{} has no declared output of type {type_:?}", self.name)))
        }
    }

    /// Create a resource on a declared output, stamping owner = this
    /// controller's name.
    pub async fn create(&self, resource: Resource) -> Result<Resource> {
        self.owned_or_denied(&resource.metadata.type_)?;
        self.rate_limiter.acquire(&self.cancel).await?;
        self.state
            .store()
            .create(
                resource,
                CreateOptions {
                    owner: Some(self.name.clone()),
                },
            )
            .await
    }

    /// Update a resource on a declared output, enforcing owner = this
    /// controller's name.
    pub async fn update(&self, resource: Resource) -> Result<Resource> {
        self.owned_or_denied(&resource.metadata.type_)?;
        self.rate_limiter.acquire(&self.cancel).await?;
        self.state
            .store()
            .update(
                resource,
                UpdateOptions {
                    owner: Some(self.name.clone()),
                    ..Default::default()
                },
            )
            .await
    }

    /// `Get` → apply `f` → `Update`, retried on conflict, on a declared
    /// output.
    pub async fn modify<F>(&self, pointer: &Pointer, f: F) -> Result<Resource>
    where
        F: FnMut(&mut Resource),
    {
        self.owned_or_denied(&pointer.type_)?;
        self.state
            .modify(
                pointer,
                UpdateOptions {
                    owner: Some(self.name.clone()),
                    ..Default::default()
                },
                f,
            )
            .await
    }

    /// Teardown a resource on a declared output.
    pub async fn teardown(&self, pointer: &Pointer) -> Result<bool> {
        self.owned_or_denied(&pointer.type_)?;
        self.state.teardown(pointer).await
    }

    /// Destroy a resource on a declared output, enforcing owner.
    pub async fn destroy(&self, pointer: &Pointer) -> Result<()> {
        self.owned_or_denied(&pointer.type_)?;
        self.rate_limiter.acquire(&self.cancel).await?;
        self.state
            .store()
            .destroy(
                pointer,
                DestroyOptions {
                    owner: Some(self.name.clone()),
                },
            )
            .await
    }

    fn finalizer_write_allowed(&self, pointer: &Pointer) -> bool {
        let kind = pointer.kind();
        self.depgraph.owns_output(&self.name, &kind.type_) || self.depgraph.has_strong_input(&self.name, &kind)
    }

    /// Add a finalizer. On an owned output this is always permitted; on a
    /// declared input it requires a `Strong` input of that kind.
    pub async fn add_finalizer(&self, pointer: &Pointer, finalizer: &str) -> Result<bool> {
        if !self.finalizer_write_allowed(pointer) {
            return Err(Error::AccessDenied(format!(
                "{} may not mutate finalizers on {pointer}",
                self.name
            )));
        }
        self.state.add_finalizer(pointer, finalizer).await
    }

    /// Remove a finalizer, subject to the same access rule as
    /// [`RuntimeAdapter::add_finalizer`].
    pub async fn remove_finalizer(&self, pointer: &Pointer, finalizer: &str) -> Result<bool> {
        if !self.finalizer_write_allowed(pointer) {
            return Err(Error::AccessDenied(format!(
                "{} may not mutate finalizers on {pointer}",
                self.name
            )));
        }
        self.state.remove_finalizer(pointer, finalizer).await
    }

    /// This controller's name, mostly useful for logging from within
    /// `Controller::run`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one completed reconcile cycle.
    pub fn record_cycle(&self, items_reconciled: u64, busy_seconds: f64) {
        self.metrics.record_cycle(&self.name, items_reconciled, busy_seconds);
    }

    /// Reset the restart backoff to its minimum delay, signaling that the
    /// controller made progress. Has no effect on the delay already in flight if a
    /// restart is currently sleeping.
    pub fn reset_backoff(&self) {
        self.backoff.lock().reset();
    }
}

/// Tracks which `(namespace, type)` kinds currently have an open
/// `WatchKind` subscription feeding the dedup pipeline, and their ingest
/// task handles, so reference-counted opens/closes from
/// [`DependencyDatabase`] diffs can be applied.
struct WatchManager {
    store: CoreStore,
    pipeline: DedupPipeline,
    open: Mutex<HashMap<Kind, tokio::task::JoinHandle<()>>>,
}

impl WatchManager {
    async fn open(&self, kind: Kind) {
        if self.open.lock().contains_key(&kind) {
            return;
        }
        match self.store.watch_kind(kind.clone(), WatchKindOptions::default()).await {
            Ok(stream) => {
                let handle = self.pipeline.spawn_ingest(stream);
                self.open.lock().insert(kind, handle);
            }
            Err(e) => tracing::error!(%kind, error = %e, "failed to open WatchKind subscription"),
        }
    }

    async fn close(&self, kind: &Kind) {
        if let Some(handle) = self.open.lock().remove(kind) {
            handle.abort();
        }
    }
}

/// The controller scheduler.
pub struct ControllerEngine {
    state: State,
    depgraph: Arc<DependencyDatabase>,
    metrics: EngineMetrics,
    rate_limiter: Arc<RateLimiter>,
    watch_manager: Arc<WatchManager>,
    cancel: CancellationToken,
    reconcile_senders: Arc<RwLock<HashMap<String, mpsc::Sender<()>>>>,
    supervisors: RwLock<HashMap<String, tokio::task::JoinHandle<()>>>,
    restart_min_delay: Duration,
}

impl ControllerEngine {
    /// Build an engine over `store`, with no rate limit and a 200ms
    /// minimum restart delay.
    #[must_use]
    pub fn new(store: CoreStore) -> Self {
        Self::with_rate_limiter(store, RateLimiter::unlimited())
    }

    /// Build an engine over `store` with an explicit rate limiter for
    /// controller-initiated writes (`ChangeRateLimit`/`ChangeBurst`).
    #[must_use]
    pub fn with_rate_limiter(store: CoreStore, rate_limiter: RateLimiter) -> Self {
        let cancel = CancellationToken::new();
        let pipeline = DedupPipeline::new(cancel.clone());
        let depgraph = Arc::new(DependencyDatabase::default());
        let reconcile_senders: Arc<RwLock<HashMap<String, mpsc::Sender<()>>>> = Arc::new(RwLock::new(HashMap::new()));

        // The drain worker: every deduplicated (namespace, type, id) that
        // changed wakes every controller with a matching declared input,
        // including DestroyReady subscriptions on outputs. This
        // wakes on any event for a DestroyReady-watched kind rather than
        // only once the (TearingDown, finalizers=∅) condition is reached;
        // reconciling a controller that has nothing to do is harmless.
        {
            let depgraph = depgraph.clone();
            let reconcile_senders = reconcile_senders.clone();
            pipeline.spawn_drain(move |reduced: crate::dedup::ReducedMetadata| {
                let pointer: Pointer = reduced.into();
                for (name, _kind) in depgraph.dependents_of(&pointer) {
                    if let Some(tx) = reconcile_senders.read().get(&name) {
                        let _ = tx.try_send(());
                    }
                }
            });
        }

        Self {
            state: State::new(store.clone()),
            depgraph,
            metrics: EngineMetrics::default(),
            rate_limiter: Arc::new(rate_limiter),
            watch_manager: Arc::new(WatchManager {
                store,
                pipeline,
                open: Mutex::new(HashMap::new()),
            }),
            cancel,
            reconcile_senders,
            supervisors: RwLock::new(HashMap::new()),
            restart_min_delay: Duration::from_millis(200),
        }
    }

    /// Metrics shared across every registered controller.
    #[must_use]
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Register `controller`, opening any newly-referenced `WatchKind`
    /// subscriptions and scheduling its first reconcile.
    pub async fn register<C: Controller>(&self, controller: C) -> Result<()> {
        let name = controller.name().to_string();
        let diff = self.depgraph.register(&name, controller.inputs(), controller.outputs())?;
        for kind in diff.to_open {
            self.watch_manager.open(kind).await;
        }

        let (reconcile_tx, reconcile_rx) = mpsc::channel(1);
        // Every controller receives one event after start.
        let _ = reconcile_tx.try_send(());

        let backoff = Arc::new(Mutex::new(RestartBackoff::new(self.restart_min_delay)));

        let adapter = RuntimeAdapter {
            name: name.clone(),
            state: self.state.clone(),
            depgraph: self.depgraph.clone(),
            rate_limiter: self.rate_limiter.clone(),
            metrics: self.metrics.clone(),
            watch_manager: self.watch_manager.clone(),
            reconcile_tx: reconcile_tx.clone(),
            reconcile_rx: Arc::new(tokio::sync::Mutex::new(reconcile_rx)),
            cancel: self.cancel.clone(),
            backoff: backoff.clone(),
        };

        let supervisor = tokio::spawn(supervise(controller, adapter, self.cancel.clone(), backoff));

        self.reconcile_senders.write().insert(name.clone(), reconcile_tx);
        self.supervisors.write().insert(name, supervisor);
        Ok(())
    }

    /// Best-effort, non-blocking reconcile request for a registered
    /// controller by name.
    pub fn queue_reconcile(&self, controller_name: &str) {
        if let Some(tx) = self.reconcile_senders.read().get(controller_name) {
            let _ = tx.try_send(());
        }
    }

    /// Run until `self.shutdown()` is called: waits for every supervised
    /// controller task to finish, then returns the first error recorded by
    /// the watch dedup pipeline (a permanently-failed `WatchKind`
    /// subscription, if any) or `Ok(())` on clean shutdown.
    pub async fn run(&self) -> Result<()> {
        self.cancel.cancelled().await;
        let handles: Vec<_> = {
            let mut supervisors = self.supervisors.write();
            supervisors.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        match self.watch_manager.pipeline.take_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Cancel `ctx`, triggering orderly shutdown: stop accepting new
    /// signals, cancel per-controller contexts, and let `run` return once
    /// every controller has terminated.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn supervise<C: Controller>(
    controller: C,
    adapter: RuntimeAdapter,
    engine_cancel: CancellationToken,
    backoff: Arc<Mutex<RestartBackoff>>,
) {
    let controller = Arc::new(controller);
    loop {
        let ctx = engine_cancel.child_token();
        let run_controller = controller.clone();
        let run_adapter = adapter.clone();
        let result = tokio::spawn(async move { run_controller.run(ctx, run_adapter).await }).await;

        match result {
            Ok(Ok(())) => {
                tracing::info!(controller = controller.name(), "controller shut down cleanly");
                return;
            }
            Ok(Err(e)) => {
                tracing::warn!(controller = controller.name(), error = %e, "controller returned an error; restarting");
            }
            Err(join_error) => {
                tracing::error!(controller = controller.name(), error = %join_error, "controller panicked; restarting");
            }
        }

        if engine_cancel.is_cancelled() {
            return;
        }

        let delay = backoff.lock().next_delay();
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = engine_cancel.cancelled() => return,
        }
    }
}
