//! The Core Store: a keyed, versioned resource store with ordered watch
//! streams.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::SystemTime,
};

use futures::{stream::ReadyChunks, StreamExt};
use runtime_core::{Error, Kind, Pointer, Resource, Result};
use tokio::sync::{mpsc, Mutex};

use crate::{
    bookmark::Bookmark,
    event::Event,
    history::{HistoryEntry, HistoryRing},
    options::{
        CreateOptions, DestroyOptions, GetOptions, ListOptions, UpdateOptions, WatchKindAggregatedOptions,
        WatchKindOptions, WatchOptions, WatchStart,
    },
    stream::WatchStream,
};

/// Tuning knobs for a [`CoreStore`].
#[derive(Debug, Clone, Copy)]
pub struct CoreStoreConfig {
    /// Maximum number of events retained per kind, for `TailEvents` and
    /// bookmark resumption.
    pub history_capacity: usize,
    /// Maximum number of events a live watcher may lag behind before the
    /// store declares *buffer-overrun* and closes its stream.
    pub gap: usize,
}

impl Default for CoreStoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1024,
            gap: 256,
        }
    }
}

struct SubscriberFilterKind {
    label_query: runtime_core::LabelQuery,
    id_query: Option<runtime_core::IdQuery>,
    match_state: HashMap<String, bool>,
}

enum SubscriberFilter {
    Single(String),
    Kind(SubscriberFilterKind),
}

struct Subscriber {
    #[allow(dead_code)] // kept for future introspection/debugging
    id: u64,
    tx: mpsc::Sender<Event>,
    overrun: Arc<AtomicBool>,
    with_bookmarks: bool,
    filter: SubscriberFilter,
}

struct KindState {
    resources: HashMap<String, Resource>,
    history: HistoryRing,
    subscribers: Vec<Subscriber>,
}

impl KindState {
    fn new(history_capacity: usize) -> Self {
        Self {
            resources: HashMap::new(),
            history: HistoryRing::new(history_capacity),
            subscribers: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    kinds: HashMap<Kind, KindState>,
}

/// An in-memory, single-process authoritative store for resources, with
/// linearizable per-kind writes and ordered change streams.
///
/// Internally this serializes all operations behind one lock rather than
/// sharding per kind; a cooperative single-threaded model inside the store
/// is sufficient so long as per-kind ordering holds, and a single lock is
/// the simplest implementation that satisfies it (see `DESIGN.md`).
#[derive(Clone)]
pub struct CoreStore {
    inner: Arc<Mutex<Inner>>,
    config: CoreStoreConfig,
    next_subscriber_id: Arc<AtomicU64>,
}

impl CoreStore {
    /// Build a new, empty store.
    #[must_use]
    pub fn new(config: CoreStoreConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            config,
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn subscriber_id(&self) -> u64 {
        self.next_subscriber_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Fetch an independent copy of the resource at `pointer`.
    pub async fn get(&self, pointer: &Pointer, _opts: GetOptions) -> Result<Resource> {
        let inner = self.inner.lock().await;
        inner
            .kinds
            .get(&pointer.kind())
            .and_then(|k| k.resources.get(&pointer.id))
            .cloned()
            .ok_or_else(|| Error::not_found(pointer.to_string()))
    }

    /// List resources of `kind` matching `opts`, sorted by id ascending.
    pub async fn list(&self, kind: &Kind, opts: ListOptions) -> Result<Vec<Resource>> {
        let inner = self.inner.lock().await;
        let Some(state) = inner.kinds.get(kind) else {
            return Ok(Vec::new());
        };
        let mut matching: Vec<Resource> = state
            .resources
            .values()
            .filter(|r| {
                opts.label_query.matches(&r.metadata.labels)
                    && opts.id_query.as_ref().is_none_or(|q| q.matches(&r.metadata.id))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        Ok(matching)
    }

    /// Create a brand-new resource. Fails `Conflict` if the key exists.
    pub async fn create(&self, mut resource: Resource, opts: CreateOptions) -> Result<Resource> {
        let mut inner = self.inner.lock().await;
        let kind = resource.metadata.pointer().kind();
        let state = inner
            .kinds
            .entry(kind.clone())
            .or_insert_with(|| KindState::new(self.config.history_capacity));

        if state.resources.contains_key(&resource.metadata.id) {
            return Err(Error::Conflict(format!(
                "{} already exists",
                resource.metadata.pointer()
            )));
        }

        let now = SystemTime::now();
        resource.metadata.version = runtime_core::Version::new(1);
        resource.metadata.phase = runtime_core::Phase::Running;
        resource.metadata.created = now;
        resource.metadata.updated = now;
        if let Some(owner) = opts.owner {
            resource.metadata.owner = owner;
        }

        state.resources.insert(resource.metadata.id.clone(), resource.clone());
        let event = Event::Created {
            resource: resource.clone(),
            bookmark: None,
        };
        let entry = state.history.push(resource.metadata.id.clone(), event);
        dispatch(state, &kind, &entry);

        Ok(resource)
    }

    /// Update an existing resource, subject to owner/phase/version checks.
    pub async fn update(&self, resource: Resource, opts: UpdateOptions) -> Result<Resource> {
        let mut inner = self.inner.lock().await;
        let pointer = resource.metadata.pointer();
        let state = inner
            .kinds
            .get_mut(&pointer.kind())
            .ok_or_else(|| Error::not_found(pointer.to_string()))?;
        let stored = state
            .resources
            .get(&pointer.id)
            .ok_or_else(|| Error::not_found(pointer.to_string()))?
            .clone();

        if let Some(owner) = &opts.owner {
            if owner != &stored.metadata.owner {
                return Err(Error::OwnerConflict(format!(
                    "{pointer} is owned by {:?}, not {owner:?}",
                    stored.metadata.owner
                )));
            }
        }
        if !opts.expected_phase.allows(stored.metadata.phase) {
            return Err(Error::PhaseConflict(format!(
                "{pointer} is in phase {:?}",
                stored.metadata.phase
            )));
        }
        if !stored.metadata.phase.can_transition_to(resource.metadata.phase) {
            return Err(Error::PhaseConflict(format!(
                "{pointer} cannot transition {:?} -> {:?}",
                stored.metadata.phase, resource.metadata.phase
            )));
        }
        if resource.metadata.version != stored.metadata.version {
            return Err(Error::Conflict(format!(
                "{pointer} version mismatch: have {}, input has {}",
                stored.metadata.version.as_display(),
                resource.metadata.version.as_display()
            )));
        }

        let old_version = stored.metadata.version;
        let mut updated = resource;
        updated.metadata.version = old_version.next();
        updated.metadata.owner = stored.metadata.owner.clone();
        updated.metadata.created = stored.metadata.created;
        updated.metadata.updated = SystemTime::now();

        state.resources.insert(pointer.id.clone(), updated.clone());
        let event = Event::Updated {
            resource: updated.clone(),
            old_version,
            bookmark: None,
        };
        let entry = state.history.push(pointer.id.clone(), event);
        dispatch(state, &pointer.kind(), &entry);

        Ok(updated)
    }

    /// Destroy a resource. Requires phase = `TearingDown` and no
    /// finalizers.
    pub async fn destroy(&self, pointer: &Pointer, opts: DestroyOptions) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .kinds
            .get_mut(&pointer.kind())
            .ok_or_else(|| Error::not_found(pointer.to_string()))?;
        let stored = state
            .resources
            .get(&pointer.id)
            .ok_or_else(|| Error::not_found(pointer.to_string()))?
            .clone();

        if let Some(owner) = &opts.owner {
            if owner != &stored.metadata.owner {
                return Err(Error::OwnerConflict(format!(
                    "{pointer} is owned by {:?}, not {owner:?}",
                    stored.metadata.owner
                )));
            }
        }
        if stored.metadata.phase != runtime_core::Phase::TearingDown {
            return Err(Error::Conflict(format!("{pointer} is not tearing down")));
        }
        if !stored.metadata.finalizers.is_empty() {
            return Err(Error::Conflict(format!("{pointer} still has finalizers")));
        }

        state.resources.remove(&pointer.id);
        let event = Event::Destroyed {
            resource: Some(stored.clone()),
            old_version: Some(stored.metadata.version),
            bookmark: None,
        };
        let entry = state.history.push(pointer.id.clone(), event);
        dispatch(state, &pointer.kind(), &entry);

        Ok(())
    }

    /// Watch a single key.
    pub async fn watch(&self, pointer: Pointer, opts: WatchOptions) -> Result<WatchStream> {
        let mut inner = self.inner.lock().await;
        let kind = pointer.kind();
        let state = inner
            .kinds
            .entry(kind.clone())
            .or_insert_with(|| KindState::new(self.config.history_capacity));

        let mut replay = Vec::new();
        match &opts.start {
            WatchStart::Bookmark(b) => {
                let after_seq = state.history.resolve_bookmark(*b)?;
                for entry in state.history.after(after_seq)? {
                    if entry.id == pointer.id {
                        replay.push(entry.event);
                    }
                }
            }
            WatchStart::Live if opts.tail_events > 0 => {
                for entry in state.history.tail(opts.tail_events) {
                    if entry.id == pointer.id {
                        replay.push(entry.event);
                    }
                }
            }
            WatchStart::Live => {
                let synthesized = match state.resources.get(&pointer.id) {
                    Some(r) => Event::Created {
                        resource: r.clone(),
                        bookmark: None,
                    },
                    None => Event::Destroyed {
                        resource: None,
                        old_version: None,
                        bookmark: None,
                    },
                };
                replay.push(synthesized);
            }
        }

        let latest_seq = state.history.latest_seq();
        let capacity = self.config.gap.max(replay.len()).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        for event in replay {
            let event = if opts.with_bookmarks {
                event.with_bookmark(Some(Bookmark::from_seq(latest_seq)))
            } else {
                event
            };
            let _ = tx.try_send(event);
        }

        let overrun = Arc::new(AtomicBool::new(false));
        state.subscribers.push(Subscriber {
            id: self.subscriber_id(),
            tx,
            overrun: overrun.clone(),
            with_bookmarks: opts.with_bookmarks,
            filter: SubscriberFilter::Single(pointer.id.clone()),
        });

        Ok(WatchStream::new(rx, overrun, subject(&kind)))
    }

    /// Watch every resource of `kind` matching `opts`'s filters.
    pub async fn watch_kind(&self, kind: Kind, opts: WatchKindOptions) -> Result<WatchStream> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .kinds
            .entry(kind.clone())
            .or_insert_with(|| KindState::new(self.config.history_capacity));

        let matches = |r: &Resource| {
            opts.label_query.matches(&r.metadata.labels)
                && opts.id_query.as_ref().is_none_or(|q| q.matches(&r.metadata.id))
        };

        let mut replay = Vec::new();
        let mut match_state = HashMap::new();

        if opts.bootstrap_contents {
            let mut current: Vec<&Resource> = state.resources.values().filter(|r| matches(r)).collect();
            current.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
            for r in current {
                match_state.insert(r.metadata.id.clone(), true);
                replay.push(Event::Created {
                    resource: r.clone(),
                    bookmark: None,
                });
            }
            replay.push(Event::Bootstrapped { bookmark: None });
        } else if opts.common.tail_events > 0 {
            for entry in state.history.tail(opts.common.tail_events) {
                if entry
                    .event
                    .resource_ref()
                    .is_some_and(|r| matches(r))
                {
                    replay.push(entry.event);
                }
            }
            for r in state.resources.values().filter(|r| matches(r)) {
                match_state.insert(r.metadata.id.clone(), true);
            }
        } else if let WatchStart::Bookmark(b) = &opts.common.start {
            let after_seq = state.history.resolve_bookmark(*b)?;
            for entry in state.history.after(after_seq)? {
                if entry.event.resource_ref().is_some_and(|r| matches(r)) {
                    replay.push(entry.event);
                }
            }
            for r in state.resources.values().filter(|r| matches(r)) {
                match_state.insert(r.metadata.id.clone(), true);
            }
        } else {
            for r in state.resources.values().filter(|r| matches(r)) {
                match_state.insert(r.metadata.id.clone(), true);
            }
        }

        let latest_seq = state.history.latest_seq();
        let capacity = self.config.gap.max(replay.len()).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        for event in replay {
            let bookmark = if opts.common.with_bookmarks || opts.bootstrap_bookmark {
                Some(Bookmark::from_seq(latest_seq))
            } else {
                None
            };
            let _ = tx.try_send(event.with_bookmark(bookmark));
        }

        let overrun = Arc::new(AtomicBool::new(false));
        state.subscribers.push(Subscriber {
            id: self.subscriber_id(),
            tx,
            overrun: overrun.clone(),
            with_bookmarks: opts.common.with_bookmarks,
            filter: SubscriberFilter::Kind(SubscriberFilterKind {
                label_query: opts.label_query,
                id_query: opts.id_query,
                match_state,
            }),
        });

        Ok(WatchStream::new(rx, overrun, subject(&kind)))
    }

    /// Like [`CoreStore::watch_kind`], but batches events so a consumer can
    /// amortize processing of bursts.
    pub async fn watch_kind_aggregated(
        &self,
        kind: Kind,
        opts: WatchKindAggregatedOptions,
    ) -> Result<ReadyChunks<WatchStream>> {
        let stream = self.watch_kind(kind, opts.common).await?;
        Ok(stream.ready_chunks(opts.max_batch_size.max(1)))
    }
}

fn subject(kind: &Kind) -> String {
    format!("namespace {:?}/type {:?}", kind.namespace, kind.type_)
}

fn synthesize_for_filter(origin: &Event, pointer: Pointer, old_match: bool, new_match: bool) -> Event {
    match (old_match, new_match) {
        (false, false) => Event::Noop { pointer, bookmark: None },
        (false, true) => Event::Created {
            resource: origin.resource_ref().cloned().unwrap_or_else(|| unreachable!(
                "a resource newly matching a filter must carry a resource"
            )),
            bookmark: None,
        },
        (true, false) => Event::Destroyed {
            resource: origin.resource_ref().cloned(),
            old_version: origin.old_version(),
            bookmark: None,
        },
        (true, true) => Event::Updated {
            resource: origin.resource_ref().cloned().unwrap_or_else(|| unreachable!(
                "a resource still matching a filter must carry a resource"
            )),
            old_version: origin.old_version().unwrap_or(runtime_core::Version::UNDEFINED),
            bookmark: None,
        },
    }
}

fn dispatch(state: &mut KindState, kind: &Kind, entry: &HistoryEntry) {
    let mut to_remove = Vec::new();
    let bookmark = Bookmark::from_seq(entry.seq);

    for (idx, sub) in state.subscribers.iter_mut().enumerate() {
        let event = match &mut sub.filter {
            SubscriberFilter::Single(target_id) => {
                if target_id.as_str() != entry.id {
                    continue;
                }
                entry.event.clone()
            }
            SubscriberFilter::Kind(filter) => {
                // A Destroyed entry never "matches": the resource is gone
                // from the store regardless of what its last-known labels
                // were.
                let new_match = if matches!(entry.event, Event::Destroyed { .. }) {
                    false
                } else {
                    entry
                        .event
                        .resource_ref()
                        .map(|r| {
                            filter.label_query.matches(&r.metadata.labels)
                                && filter.id_query.as_ref().is_none_or(|q| q.matches(&r.metadata.id))
                        })
                        .unwrap_or(false)
                };
                let old_match = filter.match_state.get(&entry.id).copied().unwrap_or(false);
                filter.match_state.insert(entry.id.clone(), new_match);
                let pointer = Pointer::new(kind.namespace.clone(), kind.type_.clone(), entry.id.clone());
                synthesize_for_filter(&entry.event, pointer, old_match, new_match)
            }
        };

        let event = event.with_bookmark(sub.with_bookmarks.then_some(bookmark));
        match sub.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                sub.overrun.store(true, Ordering::SeqCst);
                to_remove.push(idx);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                to_remove.push(idx);
            }
        }
    }

    for idx in to_remove.into_iter().rev() {
        state.subscribers.swap_remove(idx);
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use runtime_core::{Kind, LabelQuery, LabelTerm, Metadata, Op, Phase};
    use serde_json::json;

    use super::*;

    fn store() -> CoreStore {
        CoreStore::new(CoreStoreConfig {
            history_capacity: 32,
            gap: 8,
        })
    }

    fn widget(id: &str) -> Resource {
        Resource::new(Metadata::new("ns", "widget", id), json!({"n": id}))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let s = store();
        let created = s.create(widget("a"), CreateOptions::default()).await.unwrap();
        assert_eq!(created.metadata.version.raw(), 1);

        let fetched = s
            .get(&Pointer::new("ns", "widget", "a"), GetOptions::default())
            .await
            .unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_key() {
        let s = store();
        s.create(widget("a"), CreateOptions::default()).await.unwrap();
        let err = s.create(widget("a"), CreateOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let s = store();
        let err = s
            .get(&Pointer::new("ns", "widget", "missing"), GetOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn update_rejects_stale_version() {
        let s = store();
        let created = s.create(widget("a"), CreateOptions::default()).await.unwrap();
        s.update(created.clone(), UpdateOptions::default()).await.unwrap();

        let err = s.update(created, UpdateOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn update_enforces_owner() {
        let s = store();
        let created = s
            .create(
                widget("a"),
                CreateOptions {
                    owner: Some("ctrl-a".to_string()),
                },
            )
            .await
            .unwrap();

        let err = s
            .update(
                created,
                UpdateOptions {
                    owner: Some("ctrl-b".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OwnerConflict(_)));
    }

    #[tokio::test]
    async fn destroy_requires_tearing_down_with_no_finalizers() {
        let s = store();
        let created = s.create(widget("a"), CreateOptions::default()).await.unwrap();
        let pointer = created.metadata.pointer();

        let err = s.destroy(&pointer, DestroyOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let mut tearing_down = created;
        tearing_down.metadata.phase = Phase::TearingDown;
        s.update(tearing_down, UpdateOptions::default()).await.unwrap();

        s.destroy(&pointer, DestroyOptions::default()).await.unwrap();
        assert!(matches!(
            s.get(&pointer, GetOptions::default()).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn watch_single_key_synthesizes_first_event_then_live() {
        let s = store();
        let pointer = Pointer::new("ns", "widget", "a");
        let mut stream = s.watch(pointer.clone(), WatchOptions::default()).await.unwrap();

        match stream.next().await.unwrap().unwrap() {
            Event::Destroyed { resource, .. } => assert!(resource.is_none()),
            other => panic!("expected synthesized Destroyed, got {other:?}"),
        }

        s.create(widget("a"), CreateOptions::default()).await.unwrap();
        match stream.next().await.unwrap().unwrap() {
            Event::Created { resource, .. } => assert_eq!(resource.metadata.id, "a"),
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn watch_kind_bootstrap_then_live() {
        let s = store();
        s.create(widget("a"), CreateOptions::default()).await.unwrap();
        s.create(widget("b"), CreateOptions::default()).await.unwrap();

        let kind = Kind::new("ns", "widget");
        let mut stream = s
            .watch_kind(
                kind.clone(),
                WatchKindOptions {
                    bootstrap_contents: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, Event::Created { ref resource, .. } if resource.metadata.id == "a"));
        let second = stream.next().await.unwrap().unwrap();
        assert!(matches!(second, Event::Created { ref resource, .. } if resource.metadata.id == "b"));
        let third = stream.next().await.unwrap().unwrap();
        assert!(matches!(third, Event::Bootstrapped { .. }));

        s.create(widget("c"), CreateOptions::default()).await.unwrap();
        let fourth = stream.next().await.unwrap().unwrap();
        assert!(matches!(fourth, Event::Created { ref resource, .. } if resource.metadata.id == "c"));
    }

    #[tokio::test]
    async fn label_filter_transitions_synthesize_noop_created_destroyed() {
        let s = store();
        let kind = Kind::new("ns", "widget");
        let mut stream = s
            .watch_kind(
                kind.clone(),
                WatchKindOptions {
                    label_query: LabelQuery::all().with_term(LabelTerm::new(
                        "tier",
                        Op::Equal(["gold".to_string()].into()),
                        false,
                    )),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut non_matching = widget("a");
        non_matching.metadata.labels.insert("tier".to_string(), "silver".to_string());
        let non_matching = s.create(non_matching, CreateOptions::default()).await.unwrap();
        match stream.next().await.unwrap().unwrap() {
            Event::Noop { pointer, .. } => assert_eq!(pointer.id, "a"),
            other => panic!("expected Noop, got {other:?}"),
        }

        let mut now_matching = non_matching.clone();
        now_matching.metadata.labels.insert("tier".to_string(), "gold".to_string());
        let now_matching = s.update(now_matching, UpdateOptions::default()).await.unwrap();
        match stream.next().await.unwrap().unwrap() {
            Event::Created { resource, .. } => assert_eq!(resource.metadata.id, "a"),
            other => panic!("expected Created, got {other:?}"),
        }

        let mut leaving = now_matching;
        leaving.metadata.labels.insert("tier".to_string(), "silver".to_string());
        s.update(leaving, UpdateOptions::default()).await.unwrap();
        match stream.next().await.unwrap().unwrap() {
            Event::Destroyed { resource, .. } => assert_eq!(resource.unwrap().metadata.id, "a"),
            other => panic!("expected Destroyed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_watcher_overruns_and_stream_ends_with_error() {
        let s = CoreStore::new(CoreStoreConfig {
            history_capacity: 10,
            gap: 2,
        });
        let kind = Kind::new("ns", "widget");
        let mut stream = s.watch_kind(kind, WatchKindOptions::default()).await.unwrap();

        for i in 0..20 {
            s.create(widget(&i.to_string()), CreateOptions::default()).await.unwrap();
        }

        let mut saw_overrun = false;
        while let Some(item) = stream.next().await {
            if let Err(Error::BufferOverrun(msg)) = item {
                assert!(msg.contains("widget"));
                saw_overrun = true;
                break;
            }
        }
        assert!(saw_overrun, "expected the slow watcher to observe a buffer overrun");
    }
}
