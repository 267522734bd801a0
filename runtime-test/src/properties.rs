//! Assertions over sequences of versions/events, factored out of the
//! per-crate test modules so every suite that exercises these universal
//! invariants checks them the same way.

use futures::{Stream, StreamExt};
use runtime_core::{Result, Version};
use runtime_store::Event;

/// Pull up to `n` events off `stream`, stopping early if it ends or errors
/// first. The error (if any) is the last element of the returned vector's
/// companion `Result`, matching how `WatchStream` itself terminates: an
/// `Err` is the final item, never followed by further events.
pub async fn collect_events<S>(mut stream: S, n: usize) -> Result<Vec<Event>>
where
    S: Stream<Item = Result<Event>> + Unpin,
{
    let mut events = Vec::with_capacity(n);
    while events.len() < n {
        match stream.next().await {
            Some(Ok(event)) => events.push(event),
            Some(Err(err)) => return Err(err),
            None => break,
        }
    }
    Ok(events)
}

/// **Version monotonicity**: for any key, observed versions
/// across successful writes form a strictly increasing sequence.
pub fn assert_version_monotonic(versions: &[Version]) {
    for pair in versions.windows(2) {
        assert!(
            pair[1] > pair[0],
            "versions must strictly increase, got {:?} then {:?}",
            pair[0],
            pair[1]
        );
    }
}

/// **Owner immutability**: every event in `events` that carries a
/// resource reports the same owner.
pub fn assert_owner_immutable(events: &[Event], owner: &str) {
    for event in events {
        if let Some(resource) = event_resource(event) {
            assert_eq!(
                resource.metadata.owner, owner,
                "owner must stay {owner:?}, saw {:?} on {}",
                resource.metadata.owner,
                resource.metadata.pointer()
            );
        }
    }
}

/// **Bootstrap sequence**: `events` consists of one `Created` per
/// `expected_ids` in order, followed by exactly one `Bootstrapped`, and
/// nothing else.
pub fn assert_bootstrap_sequence(events: &[Event], expected_ids: &[&str]) {
    assert_eq!(
        events.len(),
        expected_ids.len() + 1,
        "expected {} Created events plus one Bootstrapped, got {} events",
        expected_ids.len(),
        events.len()
    );
    for (event, expected_id) in events.iter().zip(expected_ids) {
        match event {
            Event::Created { resource, .. } => {
                assert_eq!(&resource.metadata.id, expected_id);
            }
            other => panic!("expected Created({expected_id}), got {other:?}"),
        }
    }
    match events.last() {
        Some(Event::Bootstrapped { .. }) => {}
        other => panic!("expected a trailing Bootstrapped, got {other:?}"),
    }
}

fn event_resource(event: &Event) -> Option<&runtime_core::Resource> {
    match event {
        Event::Created { resource, .. } | Event::Updated { resource, .. } => Some(resource),
        Event::Destroyed { resource, .. } => resource.as_ref(),
        Event::Bootstrapped { .. } | Event::Noop { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use runtime_core::{Metadata, Resource};
    use serde_json::json;

    use super::*;

    #[test]
    fn monotonic_versions_pass() {
        assert_version_monotonic(&[Version::new(1), Version::new(2), Version::new(5)]);
    }

    #[test]
    #[should_panic(expected = "strictly increase")]
    fn non_monotonic_versions_panic() {
        assert_version_monotonic(&[Version::new(2), Version::new(1)]);
    }

    fn owned(id: &str, owner: &str) -> Resource {
        let mut m = Metadata::new("ns", "widget", id);
        m.owner = owner.to_string();
        Resource::new(m, json!({}))
    }

    #[test]
    fn bootstrap_sequence_checks_order_and_trailer() {
        let events = vec![
            Event::Created {
                resource: owned("a", "ctrl"),
                bookmark: None,
            },
            Event::Created {
                resource: owned("b", "ctrl"),
                bookmark: None,
            },
            Event::Bootstrapped { bookmark: None },
        ];
        assert_bootstrap_sequence(&events, &["a", "b"]);
    }
}
