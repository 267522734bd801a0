//! Per-kind bounded history ring: supplies `TailEvents`, bookmark
//! resumption, and overrun detection.

use std::collections::VecDeque;

use runtime_core::{Error, Result};

use crate::{bookmark::Bookmark, event::Event};

/// One committed event, tagged with its position in the kind's history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub(crate) seq: u64,
    pub(crate) id: String,
    pub(crate) event: Event,
}

/// A bounded FIFO of the most recent events for one `(namespace, type)`.
///
/// Capacity bounds memory; once full, pushing evicts the oldest entry.
/// `gap` is the separate, usually-smaller threshold a *live* subscriber may
/// lag behind before it is considered to have overrun (see
/// [`crate::core::CoreStore`]).
#[derive(Debug)]
pub struct HistoryRing {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    next_seq: u64,
}

impl HistoryRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_seq: 1,
        }
    }

    /// Append a new event, returning the entry it was stored as.
    pub(crate) fn push(&mut self, id: String, event: Event) -> HistoryEntry {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = HistoryEntry { seq, id, event };
        self.entries.push_back(entry.clone());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        entry
    }

    /// The seq of the oldest entry still retained, if any.
    pub(crate) fn oldest_seq(&self) -> Option<u64> {
        self.entries.front().map(|e| e.seq)
    }

    /// The seq that would be assigned to the next pushed event, minus one —
    /// i.e. the seq of the most recently pushed event.
    pub(crate) fn latest_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// The most recent `n` entries, oldest first.
    pub(crate) fn tail(&self, n: usize) -> Vec<HistoryEntry> {
        let len = self.entries.len();
        let skip = len.saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Entries strictly after `after_seq`, oldest first. Returns
    /// `Error::InvalidBookmark` if `after_seq` predates everything still
    /// retained (it would otherwise silently skip history).
    pub(crate) fn after(&self, after_seq: u64) -> Result<Vec<HistoryEntry>> {
        match self.oldest_seq() {
            Some(oldest) if after_seq + 1 < oldest => Err(Error::InvalidBookmark(format!(
                "bookmark at seq {after_seq} has fallen out of history (oldest retained is {oldest})"
            ))),
            _ => Ok(self
                .entries
                .iter()
                .filter(|e| e.seq > after_seq)
                .cloned()
                .collect()),
        }
    }

    /// Resolve a bookmark to its seq, failing if it no longer exists.
    pub(crate) fn resolve_bookmark(&self, bookmark: Bookmark) -> Result<u64> {
        let seq = bookmark.seq();
        match self.oldest_seq() {
            Some(oldest) if seq < oldest => Err(Error::InvalidBookmark(format!(
                "bookmark at seq {seq} has fallen out of history (oldest retained is {oldest})"
            ))),
            None if seq != 0 => Err(Error::InvalidBookmark(format!(
                "bookmark at seq {seq} refers to a kind with no history"
            ))),
            _ => Ok(seq),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_core::{Metadata, Resource};
    use serde_json::json;

    fn created_event(id: &str) -> Event {
        Event::Created {
            resource: Resource::new(Metadata::new("ns", "widget", id), json!({})),
            bookmark: None,
        }
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut ring = HistoryRing::new(2);
        ring.push("a".into(), created_event("a"));
        ring.push("b".into(), created_event("b"));
        ring.push("c".into(), created_event("c"));
        assert_eq!(ring.tail(10).len(), 2);
        assert_eq!(ring.oldest_seq(), Some(2));
    }

    #[test]
    fn after_rejects_evicted_bookmarks() {
        let mut ring = HistoryRing::new(2);
        ring.push("a".into(), created_event("a"));
        ring.push("b".into(), created_event("b"));
        ring.push("c".into(), created_event("c"));
        assert!(ring.after(0).is_err());
        assert!(ring.after(2).is_ok());
    }
}
