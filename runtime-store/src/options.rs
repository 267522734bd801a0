//! Per-call option structs for every `CoreStore` operation.

use runtime_core::{IdQuery, LabelQuery, Phase};

use crate::bookmark::Bookmark;

/// Options for `Get`.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Reserved for a future skip-decode / opaque-wire-form fast path;
    /// currently always returns a decoded `Resource`.
    pub skip_decode: bool,
}

/// Options for `List`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only resources matching every term are returned.
    pub label_query: LabelQuery,
    /// Only resources whose id matches are returned.
    pub id_query: Option<IdQuery>,
}

/// Options for `Create`.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// The controller name to stamp as owner. Empty means no owner
    /// enforcement will apply to this resource.
    pub owner: Option<String>,
}

/// Options for `Update`.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// If set, the update fails with `owner-conflict` unless the stored
    /// owner matches.
    pub owner: Option<String>,
    /// The phase the caller expects the resource to currently be in.
    /// Defaults to `Running`. Set to allow any phase.
    pub expected_phase: ExpectedPhase,
}

/// The phase an `Update` caller expects the target to currently be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedPhase {
    /// Only succeed if the resource is `Running` (the default).
    #[default]
    Running,
    /// Only succeed if the resource is in the given phase.
    Only(Phase),
    /// Succeed regardless of current phase.
    Any,
}

impl ExpectedPhase {
    pub(crate) fn allows(self, phase: Phase) -> bool {
        match self {
            ExpectedPhase::Running => phase == Phase::Running,
            ExpectedPhase::Only(expected) => phase == expected,
            ExpectedPhase::Any => true,
        }
    }
}

/// Options for `Destroy`.
#[derive(Debug, Clone, Default)]
pub struct DestroyOptions {
    /// If set, the destroy fails with `owner-conflict` unless the stored
    /// owner matches.
    pub owner: Option<String>,
}

/// Where a watch stream should start from.
#[derive(Debug, Clone, Default)]
pub enum WatchStart {
    /// Start from the live edge (plus any `tail_events`/bootstrap
    /// behavior requested alongside this option).
    #[default]
    Live,
    /// Resume after the event identified by this bookmark.
    Bookmark(Bookmark),
}

/// Options shared by `Watch` and `WatchKind`.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Pre-deliver up to this many of the most recent matching events from
    /// history before live events begin.
    pub tail_events: usize,
    /// Resume from a bookmark instead of starting live.
    pub start: WatchStart,
    /// Whether each event should carry a resumption bookmark.
    pub with_bookmarks: bool,
}

/// Options specific to `WatchKind`.
#[derive(Debug, Clone, Default)]
pub struct WatchKindOptions {
    /// Options shared with single-key `Watch`.
    pub common: WatchOptions,
    /// Only resources matching every term participate in this watch.
    pub label_query: LabelQuery,
    /// Only resources whose id matches participate in this watch.
    pub id_query: Option<IdQuery>,
    /// Send a `Created` event per currently-matching resource (in
    /// id-ascending order), then a `Bootstrapped` sentinel, before live
    /// events.
    pub bootstrap_contents: bool,
    /// Emit a bookmark alongside the `Bootstrapped` sentinel.
    pub bootstrap_bookmark: bool,
}

/// Options for `WatchKindAggregated`: batches events so a consumer can
/// amortize processing of bursts.
#[derive(Debug, Clone)]
pub struct WatchKindAggregatedOptions {
    /// Options shared with `WatchKind`.
    pub common: WatchKindOptions,
    /// Maximum number of events folded into a single batch.
    pub max_batch_size: usize,
}

impl Default for WatchKindAggregatedOptions {
    fn default() -> Self {
        Self {
            common: WatchKindOptions::default(),
            max_batch_size: 64,
        }
    }
}
