//! The Transform Controller: a generic one-to-one `I → O`
//! mapping controller built on top of [`Controller`]/[`RuntimeAdapter`].
//!
//! Grounded on `kube-runtime`'s `Controller::new(...).owns(...).run(...)`
//! builder chain (`controller/mod.rs`) for the configuration surface, and
//! on `kube-runtime/src/finalizer.rs`'s apply/cleanup split for the
//! finalizer-aware half of the reconcile cycle.

use std::{collections::HashMap, future::Future, time::Instant};

use runtime_core::{Error, Phase, Pointer, Resource, Result};
use runtime_store::ListOptions;
use serde_json::Value;

use crate::{
    controller::{Controller, RuntimeAdapter},
    depgraph::{InputDecl, InputKind, OutputDecl, OutputKind},
};

/// What [`MapMetadata::map`] decided for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOutcome {
    /// Map to the output with this id.
    Produce(String),
    /// This input has no corresponding output; ignore it entirely.
    Skip,
}

/// Computes the output **key** (id only — namespace and type come from
/// configuration) for a given input. Covers both the always-produces and
/// may-skip forms of this mapping; an implementation that never returns
/// `MapOutcome::Skip` is the former.
pub trait MapMetadata: Send + Sync {
    /// Decide the output id for `input`, or that it has none.
    fn map(&self, input: &Resource) -> MapOutcome;
}

impl<F: Fn(&Resource) -> MapOutcome + Send + Sync> MapMetadata for F {
    fn map(&self, input: &Resource) -> MapOutcome {
        (self)(input)
    }
}

/// A recoverable reason [`Transform::apply`] declined to produce output
/// this cycle, distinct from a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Try again next cycle; the output is still marked touched so it
    /// isn't torn down in the meantime.
    Skip,
    /// A genuine failure, aggregated into the cycle's error list.
    Other(Error),
}

impl From<Error> for TransformError {
    fn from(e: Error) -> Self {
        if matches!(e, Error::PhaseConflict(_)) {
            // Treated as "retry later" by the reconcile loop, not an
            // aggregated error.
            TransformError::Skip
        } else {
            TransformError::Other(e)
        }
    }
}

/// Maps one input and its current output (if any) to a new output spec.
/// The `runtime` handle already restricts reads/writes to this
/// controller's declared inputs/outputs, so no separate reader-only and
/// reader-writer variants are needed.
pub trait Transform: Send + Sync {
    /// Compute the output's new spec, or `None` to leave it unchanged.
    fn apply(
        &self,
        runtime: &RuntimeAdapter,
        input: &Resource,
        current_output: Option<&Resource>,
    ) -> impl Future<Output = std::result::Result<Option<Value>, TransformError>> + Send;
}

/// What [`FinalizerRemoval::apply`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerOutcome {
    /// Cleanup is complete; the finalizer may be removed once the output
    /// is confirmed gone.
    Done,
    /// Not ready yet; leave the output touched and retry next cycle.
    Skip,
}

/// Runs once an input with input-finalizers enabled starts tearing down
/// and still carries this controller's finalizer. Follows the same
/// reader/writer unification as [`Transform`].
pub trait FinalizerRemoval: Send + Sync {
    /// Perform any cleanup required before the controller's finalizer can
    /// be dropped from `input`.
    fn apply(&self, runtime: &RuntimeAdapter, input: &Resource) -> impl Future<Output = Result<FinalizerOutcome>> + Send;
}

/// Configuration for a [`TransformController`].
pub struct TransformControllerConfig {
    name: String,
    input_namespace: String,
    input_type: String,
    output_namespace: String,
    output_type: String,
    output_kind: OutputKind,
    input_list_options: ListOptions,
    extra_inputs: Vec<InputDecl>,
    extra_outputs: Vec<OutputDecl>,
    input_finalizers: bool,
    ignore_tearing_down_inputs: bool,
}

impl TransformControllerConfig {
    /// Start building a transform from `input_namespace/input_type` to
    /// `output_namespace/output_type`, with an Exclusive primary output.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        input_namespace: impl Into<String>,
        input_type: impl Into<String>,
        output_namespace: impl Into<String>,
        output_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            input_namespace: input_namespace.into(),
            input_type: input_type.into(),
            output_namespace: output_namespace.into(),
            output_type: output_type.into(),
            output_kind: OutputKind::Exclusive,
            input_list_options: ListOptions::default(),
            extra_inputs: Vec::new(),
            extra_outputs: Vec::new(),
            input_finalizers: false,
            ignore_tearing_down_inputs: false,
        }
    }

    /// Declare the primary output Shared rather than Exclusive.
    #[must_use]
    pub fn with_shared_output(mut self) -> Self {
        self.output_kind = OutputKind::Shared;
        self
    }

    /// Filter the input set listed each cycle.
    #[must_use]
    pub fn with_input_list_options(mut self, opts: ListOptions) -> Self {
        self.input_list_options = opts;
        self
    }

    /// Declare additional read dependencies beyond the primary input.
    #[must_use]
    pub fn with_extra_inputs(mut self, inputs: Vec<InputDecl>) -> Self {
        self.extra_inputs = inputs;
        self
    }

    /// Declare additional write targets beyond the primary output.
    #[must_use]
    pub fn with_extra_outputs(mut self, outputs: Vec<OutputDecl>) -> Self {
        self.extra_outputs = outputs;
        self
    }

    /// Own teardown of inputs: pin each input with a `Strong` dependency
    /// and this controller's finalizer until its output is gone. Mutually
    /// exclusive with [`Self::with_ignore_tearing_down_inputs`].
    #[must_use]
    pub fn with_input_finalizers(mut self) -> Self {
        self.input_finalizers = true;
        self
    }

    /// Treat inputs that are `TearingDown` as if they were `Running`.
    /// Mutually exclusive with [`Self::with_input_finalizers`].
    #[must_use]
    pub fn with_ignore_tearing_down_inputs(mut self) -> Self {
        self.ignore_tearing_down_inputs = true;
        self
    }

    /// The finalizer name this controller stamps on its inputs, when
    /// input-finalizers are enabled.
    fn finalizer_name(&self) -> String {
        format!("transform.runtime/{}", self.name)
    }
}

/// A generic one-to-one `I → O` reconciler. Implements
/// [`Controller`]; register it with a [`crate::controller::ControllerEngine`]
/// like any other controller.
pub struct TransformController<M, T, F = NoFinalizerRemoval> {
    config: TransformControllerConfig,
    map_metadata: M,
    transform: T,
    finalizer_removal: Option<F>,
}

/// Placeholder used when input-finalizers are disabled and no
/// [`FinalizerRemoval`] is configured; never invoked.
pub struct NoFinalizerRemoval;

impl FinalizerRemoval for NoFinalizerRemoval {
    async fn apply(&self, _runtime: &RuntimeAdapter, _input: &Resource) -> Result<FinalizerOutcome> {
        unreachable!("NoFinalizerRemoval is never invoked: input-finalizers were not enabled")
    }
}

impl<M: MapMetadata, T: Transform> TransformController<M, T, NoFinalizerRemoval> {
    /// Build a transform controller with no finalizer-removal hook. Valid
    /// only when `config` does not enable input-finalizers; the
    /// controller's [`Controller::run`] checks this at startup.
    #[must_use]
    pub fn new(config: TransformControllerConfig, map_metadata: M, transform: T) -> Self {
        Self {
            config,
            map_metadata,
            transform,
            finalizer_removal: None,
        }
    }
}

impl<M: MapMetadata, T: Transform, F: FinalizerRemoval> TransformController<M, T, F> {
    /// Build a transform controller with a finalizer-removal hook,
    /// required when `config.with_input_finalizers()` was set.
    #[must_use]
    pub fn with_finalizer_removal(config: TransformControllerConfig, map_metadata: M, transform: T, finalizer_removal: F) -> Self {
        Self {
            config,
            map_metadata,
            transform,
            finalizer_removal: Some(finalizer_removal),
        }
    }

    fn output_pointer(&self, output_id: &str) -> Pointer {
        Pointer::new(self.config.output_namespace.clone(), self.config.output_type.clone(), output_id.to_string())
    }

    fn input_pointer(&self, input: &Resource) -> Pointer {
        input.metadata.pointer()
    }

    async fn reconcile_once(&self, runtime: &RuntimeAdapter) -> Result<()> {
        let mut errors = Vec::new();
        let mut touched: std::collections::HashSet<String> = std::collections::HashSet::new();
        // input id -> the output id whose disappearance should trigger
        // finalizer removal. Rebuilt fresh every cycle from each
        // tearing-down input's finalizer state rather than carried
        // between cycles: on the cycle where the output is torn down it's
        // still present in `outputs` below (listed before the
        // teardown/destroy call), so removal is deferred to the next
        // cycle, which re-derives the same mapping and finds the output
        // gone. Relies on the DestroyReady watch on the output kind
        // waking this controller again once that happens, and on
        // FinalizerRemoval::apply being safe to call again for the same
        // input.
        let mut pending_finalizer_removal: HashMap<String, String> = HashMap::new();
        let mut items_reconciled: u64 = 0;

        let inputs = runtime
            .list(
                &runtime_core::Kind::new(self.config.input_namespace.clone(), self.config.input_type.clone()),
                self.config.input_list_options.clone(),
            )
            .await?;

        for input in &inputs {
            let output_id = match self.map_metadata.map(input) {
                MapOutcome::Skip => continue,
                MapOutcome::Produce(id) => id,
            };
            items_reconciled += 1;

            let tearing_down = input.metadata.phase == Phase::TearingDown && !self.config.ignore_tearing_down_inputs;
            if tearing_down {
                if !self.config.input_finalizers {
                    // The DestroyReady subscription on the output drives
                    // cleanup once the input is gone; nothing to do here.
                    continue;
                }
                let finalizer = self.config.finalizer_name();
                if !input.metadata.finalizers.contains(&finalizer) {
                    continue;
                }
                let Some(finalizer_removal) = &self.finalizer_removal else {
                    errors.push(Error::InvalidArgument(format!(
                        "{}: input finalizers enabled with no FinalizerRemoval configured",
                        self.config.name
                    )));
                    continue;
                };
                match finalizer_removal.apply(runtime, input).await {
                    Ok(FinalizerOutcome::Skip) => {
                        touched.insert(output_id);
                    }
                    Ok(FinalizerOutcome::Done) => {
                        pending_finalizer_removal.insert(input.metadata.id.clone(), output_id);
                    }
                    Err(e) => errors.push(e),
                }
                continue;
            }

            touched.insert(output_id.clone());
            if self.config.input_finalizers {
                runtime.add_finalizer(&self.input_pointer(input), &self.config.finalizer_name()).await?;
            }

            let output_pointer = self.output_pointer(&output_id);
            let current_output = match runtime.get(&output_pointer).await {
                Ok(r) => Some(r),
                Err(Error::NotFound(_)) => None,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            // A tearing-down output is already being cleaned up by the
            // outputs pass below (held there by an external finalizer, not
            // this controller's own). A regenerated input must not race
            // that cleanup by writing a fresh spec onto it — it stays touched so the outputs pass
            // leaves it alone, and a fresh output is produced for this id
            // only once the stale one is actually gone.
            if current_output.as_ref().is_some_and(|o| o.metadata.phase == Phase::TearingDown) {
                continue;
            }

            match self.transform.apply(runtime, input, current_output.as_ref()).await {
                Ok(None) => {}
                Ok(Some(spec)) => {
                    if let Err(e) = runtime.modify(&output_pointer, |r| r.spec = spec.clone()).await {
                        errors.push(e);
                    }
                }
                Err(TransformError::Skip) => {}
                Err(TransformError::Other(e)) => errors.push(e),
            }
        }

        let outputs = runtime
            .list(
                &runtime_core::Kind::new(self.config.output_namespace.clone(), self.config.output_type.clone()),
                ListOptions::default(),
            )
            .await?;

        for output in &outputs {
            if output.metadata.owner != self.config.name {
                pending_finalizer_removal.retain(|_, id| id != &output.metadata.id);
                continue;
            }
            let needs_cleanup = output.metadata.phase == Phase::TearingDown || !touched.contains(&output.metadata.id);
            if !needs_cleanup {
                continue;
            }
            let pointer = output.metadata.pointer();
            match runtime.teardown(&pointer).await {
                Ok(true) => {
                    if let Err(e) = runtime.destroy(&pointer).await {
                        errors.push(e);
                    }
                }
                Ok(false) => {} // finalizers still present; retry on the next event
                Err(e) => errors.push(e),
            }
        }

        for (input_id, output_id) in pending_finalizer_removal {
            let still_present = outputs.iter().any(|o| o.metadata.id == output_id);
            if still_present {
                continue;
            }
            let input_pointer = Pointer::new(self.config.input_namespace.clone(), self.config.input_type.clone(), input_id);
            if let Err(e) = runtime.remove_finalizer(&input_pointer, &self.config.finalizer_name()).await {
                errors.push(e);
            }
        }

        runtime.record_cycle(items_reconciled, 0.0);

        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
        runtime.reset_backoff();
        Ok(())
    }

    /// The Inputs/Outputs declaration derived from configuration.
    fn declared_inputs(&self) -> Vec<InputDecl> {
        let mut inputs = vec![InputDecl {
            namespace: self.config.input_namespace.clone(),
            type_: self.config.input_type.clone(),
            id: None,
            kind: if self.config.input_finalizers { InputKind::Strong } else { InputKind::Weak },
        }];
        inputs.extend(self.config.extra_inputs.iter().cloned());
        inputs.push(InputDecl {
            namespace: self.config.output_namespace.clone(),
            type_: self.config.output_type.clone(),
            id: None,
            kind: InputKind::DestroyReady,
        });
        inputs
    }

    fn declared_outputs(&self) -> Vec<OutputDecl> {
        let mut outputs = vec![OutputDecl {
            type_: self.config.output_type.clone(),
            kind: self.config.output_kind,
        }];
        outputs.extend(self.config.extra_outputs.iter().cloned());
        outputs
    }
}

impl<M: MapMetadata + 'static, T: Transform + 'static, F: FinalizerRemoval + 'static> Controller for TransformController<M, T, F> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn inputs(&self) -> Vec<InputDecl> {
        self.declared_inputs()
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        self.declared_outputs()
    }

    async fn run(&self, ctx: tokio_util::sync::CancellationToken, runtime: RuntimeAdapter) -> Result<()> {
        if self.config.input_finalizers && self.finalizer_removal.is_none() {
            return Err(Error::InvalidArgument(format!(
                "{}: input finalizers enabled with no FinalizerRemoval configured",
                self.config.name
            )));
        }
        loop {
            tokio::select! {
                () = ctx.cancelled() => return Ok(()),
                () = runtime.event_ch() => {
                    let started = Instant::now();
                    self.reconcile_once(&runtime).await?;
                    tracing::debug!(controller = self.config.name, elapsed = ?started.elapsed(), "reconcile cycle complete");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use runtime_core::{Kind, Metadata};
    use runtime_store::{CoreStore, CoreStoreConfig, CreateOptions, GetOptions};
    use serde_json::json;

    use super::*;
    use crate::controller::ControllerEngine;

    struct Double;
    impl Transform for Double {
        async fn apply(
            &self,
            _runtime: &RuntimeAdapter,
            input: &Resource,
            _current_output: Option<&Resource>,
        ) -> std::result::Result<Option<Value>, TransformError> {
            let n = input.spec.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(Some(json!({"n": n * 2})))
        }
    }

    fn same_id(input: &Resource) -> MapOutcome {
        MapOutcome::Produce(input.metadata.id.clone())
    }

    #[tokio::test]
    async fn maps_one_input_to_one_output() {
        let store = CoreStore::new(CoreStoreConfig::default());
        store
            .create(Resource::new(Metadata::new("ns", "src", "a"), json!({"n": 21})), CreateOptions::default())
            .await
            .unwrap();

        let engine = ControllerEngine::new(store.clone());
        let config = TransformControllerConfig::new("doubler", "ns", "src", "ns", "dst");
        let controller = TransformController::new(config, same_id as fn(&Resource) -> MapOutcome, Double);
        engine.register(controller).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let out = store.get(&Pointer::new("ns", "dst", "a"), GetOptions::default()).await.unwrap();
        assert_eq!(out.spec, json!({"n": 42}));
        assert_eq!(out.metadata.owner, "doubler");

        engine.shutdown();
        engine.run().await.unwrap();
    }

    #[tokio::test]
    async fn destroying_input_tears_down_and_destroys_output() {
        let store = CoreStore::new(CoreStoreConfig::default());
        store
            .create(Resource::new(Metadata::new("ns", "src", "a"), json!({"n": 1})), CreateOptions::default())
            .await
            .unwrap();

        let engine = ControllerEngine::new(store.clone());
        let config = TransformControllerConfig::new("doubler", "ns", "src", "ns", "dst");
        let controller = TransformController::new(config, same_id as fn(&Resource) -> MapOutcome, Double);
        engine.register(controller).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        store.get(&Pointer::new("ns", "dst", "a"), GetOptions::default()).await.unwrap();

        let state = crate::state::State::new(store.clone());
        state.teardown_and_destroy(&Pointer::new("ns", "src", "a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let err = store.get(&Pointer::new("ns", "dst", "a"), GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "output must be torn down once its input disappears, got {err:?}");

        engine.shutdown();
        engine.run().await.unwrap();
    }

    #[tokio::test]
    async fn output_finalizer_holds_teardown_until_removed() {
        let store = CoreStore::new(CoreStoreConfig::default());
        store
            .create(Resource::new(Metadata::new("ns", "src", "3"), json!({"n": 1})), CreateOptions::default())
            .await
            .unwrap();

        let engine = ControllerEngine::new(store.clone());
        let config = TransformControllerConfig::new("doubler", "ns", "src", "ns", "dst");
        let controller = TransformController::new(config, same_id as fn(&Resource) -> MapOutcome, Double);
        engine.register(controller).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let state = crate::state::State::new(store.clone());
        let dst = Pointer::new("ns", "dst", "3");
        state.add_finalizer(&dst, "foo.cosi").await.unwrap();

        let src = Pointer::new("ns", "src", "3");
        state.teardown(&src).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let out = store.get(&dst, GetOptions::default()).await.unwrap();
        assert_eq!(out.metadata.phase, Phase::TearingDown, "output must tear down once its input starts tearing down");

        store.destroy(&src, runtime_store::DestroyOptions::default()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        store.get(&dst, GetOptions::default()).await.unwrap();

        state.remove_finalizer(&dst, "foo.cosi").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let err = store.get(&dst, GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "output must be destroyed once its finalizer clears, got {err:?}");

        engine.shutdown();
        engine.run().await.unwrap();
    }

    #[tokio::test]
    async fn input_finalizer_waits_for_external_signal_before_clearing() {
        let store = CoreStore::new(CoreStoreConfig::default());
        store
            .create(
                Resource::new(Metadata::new("ns", "src", "1"), json!({"n": 1})),
                CreateOptions::default(),
            )
            .await
            .unwrap();

        let (signal_tx, signal_rx) = tokio::sync::watch::channel(false);
        struct WaitForSignal(tokio::sync::watch::Receiver<bool>);
        impl FinalizerRemoval for WaitForSignal {
            async fn apply(&self, _runtime: &RuntimeAdapter, _input: &Resource) -> Result<FinalizerOutcome> {
                if *self.0.borrow() {
                    Ok(FinalizerOutcome::Done)
                } else {
                    Ok(FinalizerOutcome::Skip)
                }
            }
        }

        let engine = ControllerEngine::new(store.clone());
        let config = TransformControllerConfig::new("doubler", "ns", "src", "ns", "dst").with_input_finalizers();
        let controller =
            TransformController::with_finalizer_removal(config, same_id as fn(&Resource) -> MapOutcome, Double, WaitForSignal(signal_rx));
        engine.register(controller).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let src = Pointer::new("ns", "src", "1");
        let input = store.get(&src, GetOptions::default()).await.unwrap();
        assert!(
            input.metadata.finalizers.contains("transform.runtime/doubler"),
            "controller must stamp its finalizer on a strong input before tearing down"
        );

        let state = crate::state::State::new(store.clone());
        state.teardown(&src).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let still_there = store.get(&src, GetOptions::default()).await.unwrap();
        assert!(
            still_there.metadata.finalizers.contains("transform.runtime/doubler"),
            "finalizer must stay until FinalizerRemoval signals Done"
        );

        signal_tx.send(true).unwrap();
        engine.queue_reconcile("doubler");
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let dst = Pointer::new("ns", "dst", "1");
        let err = store.get(&dst, GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "output must be destroyed once FinalizerRemoval signals Done");

        engine.queue_reconcile("doubler");
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let cleared = store.get(&src, GetOptions::default()).await.unwrap();
        assert!(
            !cleared.metadata.finalizers.contains("transform.runtime/doubler"),
            "controller's finalizer must clear once the output is confirmed gone"
        );

        engine.shutdown();
        engine.run().await.unwrap();
    }

    #[tokio::test]
    async fn regeneration_keeps_old_output_until_stale_finalizer_clears() {
        let store = CoreStore::new(CoreStoreConfig::default());
        store
            .create(Resource::new(Metadata::new("ns", "src", "3"), json!({"n": 1})), CreateOptions::default())
            .await
            .unwrap();

        let engine = ControllerEngine::new(store.clone());
        let config = TransformControllerConfig::new("doubler", "ns", "src", "ns", "dst");
        let controller = TransformController::new(config, same_id as fn(&Resource) -> MapOutcome, Double);
        engine.register(controller).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let dst = Pointer::new("ns", "dst", "3");
        let state = crate::state::State::new(store.clone());
        state.add_finalizer(&dst, "foo.cosi").await.unwrap();

        let src = Pointer::new("ns", "src", "3");
        state.teardown(&src).await.unwrap();
        store.destroy(&src, runtime_store::DestroyOptions::default()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let stale = store.get(&dst, GetOptions::default()).await.unwrap();
        assert_eq!(stale.spec, json!({"n": 2}), "output must keep reflecting the destroyed input until its finalizer clears");
        assert_eq!(stale.metadata.phase, Phase::TearingDown);

        store
            .create(Resource::new(Metadata::new("ns", "src", "3"), json!({"n": 5})), CreateOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let still_stale = store.get(&dst, GetOptions::default()).await.unwrap();
        assert_eq!(
            still_stale.spec,
            json!({"n": 2}),
            "a regenerated input must not overwrite a tearing-down output that still has a finalizer"
        );
        assert_eq!(still_stale.metadata.phase, Phase::TearingDown);

        // Clearing the finalizer takes two reconcile cycles to settle: one
        // destroys the now-unblocked stale output (woken by the finalizer
        // removal itself), the other creates the fresh one (woken by the
        // DestroyReady signal once that destroy completes).
        state.remove_finalizer(&dst, "foo.cosi").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let fresh = store.get(&dst, GetOptions::default()).await.unwrap();
        assert_eq!(fresh.spec, json!({"n": 10}), "a fresh output for the regenerated input must appear once the stale one clears");
        assert_eq!(fresh.metadata.phase, Phase::Running);

        engine.shutdown();
        engine.run().await.unwrap();
    }

    #[test]
    fn declared_inputs_include_destroy_ready_output_subscription() {
        let config = TransformControllerConfig::new("doubler", "ns", "src", "ns", "dst");
        let controller = TransformController::new(config, same_id as fn(&Resource) -> MapOutcome, Double);
        let inputs = controller.declared_inputs();
        assert!(inputs.iter().any(|i| i.type_ == "dst" && i.kind == InputKind::DestroyReady));
        assert!(inputs.iter().any(|i| i.type_ == "src" && i.kind == InputKind::Weak));
    }

    #[test]
    fn input_finalizers_make_the_primary_input_strong() {
        let config = TransformControllerConfig::new("doubler", "ns", "src", "ns", "dst").with_input_finalizers();
        let _ = Kind::new("ns", "src");
        struct AlwaysDone;
        impl FinalizerRemoval for AlwaysDone {
            async fn apply(&self, _runtime: &RuntimeAdapter, _input: &Resource) -> Result<FinalizerOutcome> {
                Ok(FinalizerOutcome::Done)
            }
        }
        let controller = TransformController::with_finalizer_removal(config, same_id as fn(&Resource) -> MapOutcome, Double, AlwaysDone);
        let inputs = controller.declared_inputs();
        assert!(inputs.iter().any(|i| i.type_ == "src" && i.kind == InputKind::Strong));
    }
}
