//! The two-worker watch deduplication pipeline: raw per-kind
//! events are reduced to `(namespace, type, id)` keys with set semantics,
//! coalescing N updates of the same key into a single reconcile trigger.
//!
//! Grounded on `kube-runtime/src/controller/runner.rs`'s `Runner`, which
//! holds in-flight reconciles in a `FutureHashMap` keyed by object so a
//! busy key is never processed twice concurrently; this pipeline applies
//! the same "set semantics per key" idea one stage earlier, to the raw
//! watch ingest rather than to reconcile execution itself.

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use futures::StreamExt;
use parking_lot::Mutex;
use runtime_core::{Error, Pointer};
use runtime_store::{Event, WatchStream};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A raw watch event reduced to the key a reconcile trigger needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReducedMetadata {
    /// Namespace of the changed resource.
    pub namespace: String,
    /// Type of the changed resource.
    pub type_: String,
    /// Id of the changed resource.
    pub id: String,
}

impl From<&Pointer> for ReducedMetadata {
    fn from(pointer: &Pointer) -> Self {
        Self {
            namespace: pointer.namespace.clone(),
            type_: pointer.type_.clone(),
            id: pointer.id.clone(),
        }
    }
}

impl From<ReducedMetadata> for Pointer {
    fn from(reduced: ReducedMetadata) -> Self {
        Pointer::new(reduced.namespace, reduced.type_, reduced.id)
    }
}

fn reduce(event: &Event) -> Option<ReducedMetadata> {
    match event {
        Event::Created { resource, .. } | Event::Updated { resource, .. } => {
            Some(ReducedMetadata::from(&resource.metadata.pointer()))
        }
        Event::Destroyed { resource: Some(r), .. } => Some(ReducedMetadata::from(&r.metadata.pointer())),
        Event::Destroyed { resource: None, .. } => {
            tracing::warn!("destroyed event with no carried resource; cannot derive a reconcile key");
            None
        }
        Event::Noop { pointer, .. } => Some(ReducedMetadata::from(pointer)),
        Event::Bootstrapped { .. } => None,
    }
}

struct PendingState {
    order: VecDeque<ReducedMetadata>,
    members: HashSet<ReducedMetadata>,
}

struct DedupQueue {
    pending: Mutex<PendingState>,
    notify: Notify,
}

impl DedupQueue {
    fn new() -> Self {
        Self {
            pending: Mutex::new(PendingState {
                order: VecDeque::new(),
                members: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }

    fn push(&self, item: ReducedMetadata) {
        let mut state = self.pending.lock();
        if state.members.insert(item.clone()) {
            state.order.push_back(item);
            drop(state);
            self.notify.notify_one();
        }
    }

    async fn pop(&self) -> ReducedMetadata {
        loop {
            {
                let mut state = self.pending.lock();
                if let Some(item) = state.order.pop_front() {
                    state.members.remove(&item);
                    return item;
                }
            }
            self.notify.notified().await;
        }
    }
}

/// Owns the shared dedup queue and the cancellation/error state its two
/// worker tasks report through.
#[derive(Clone)]
pub struct DedupPipeline {
    queue: Arc<DedupQueue>,
    error: Arc<Mutex<Option<Error>>>,
    cancel: CancellationToken,
}

impl DedupPipeline {
    /// Build a pipeline that stops both workers when `cancel` fires.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            queue: Arc::new(DedupQueue::new()),
            error: Arc::new(Mutex::new(None)),
            cancel,
        }
    }

    /// The ingest worker for one `WatchKind` stream: reduces every event to
    /// its key and inserts it into the shared set. If the stream yields an
    /// error (e.g. buffer overrun) the pipeline records it and cancels
    /// itself: either worker observing an Errored event is enough to stop
    /// both and surface the error.
    pub fn spawn_ingest(&self, mut stream: WatchStream) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let error = self.error.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = stream.next() => {
                        match item {
                            Some(Ok(event)) => {
                                if let Some(reduced) = reduce(&event) {
                                    queue.push(reduced);
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "watch stream failed; stopping dedup pipeline");
                                *error.lock() = Some(e);
                                cancel.cancel();
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
        })
    }

    /// The drain worker: pops one reduced key at a time and invokes
    /// `on_trigger`, which is expected to look the key up in the
    /// dependency database and queue a reconcile on every dependent
    /// controller.
    pub fn spawn_drain<F>(&self, mut on_trigger: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(ReducedMetadata) + Send + 'static,
    {
        let queue = self.queue.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = queue.pop() => on_trigger(item),
                }
            }
        })
    }

    /// Take the first error recorded by an ingest worker, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.error.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use runtime_core::Metadata;
    use runtime_store::{CoreStore, CoreStoreConfig, CreateOptions, Kind, WatchKindOptions};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn bursts_on_one_key_coalesce_into_a_single_trigger() {
        let store = CoreStore::new(CoreStoreConfig::default());
        let kind = Kind::new("ns", "widget");
        let watch = store.watch_kind(kind, WatchKindOptions::default()).await.unwrap();

        let pipeline = DedupPipeline::new(CancellationToken::new());
        pipeline.spawn_ingest(watch);

        let triggers = Arc::new(Mutex::new(Vec::new()));
        let triggers2 = triggers.clone();
        let drain = pipeline.spawn_drain(move |reduced| triggers2.lock().push(reduced));

        for n in 0..5 {
            let mut r = make_resource("a");
            r.spec = json!({"n": n});
            if n == 0 {
                store.create(r, CreateOptions::default()).await.unwrap();
            } else {
                let mut stored = store.get(&Pointer::new("ns", "widget", "a"), runtime_store::GetOptions::default()).await.unwrap();
                stored.spec = json!({"n": n});
                store.update(stored, runtime_store::UpdateOptions::default()).await.unwrap();
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        drain.abort();

        let seen = triggers.lock();
        assert!(seen.len() >= 1, "expected at least one coalesced trigger, got {seen:?}");
        assert!(seen.iter().all(|r| r.id == "a"));
    }

    fn make_resource(id: &str) -> runtime_core::Resource {
        runtime_core::Resource::new(Metadata::new("ns", "widget", id), json!({}))
    }
}
