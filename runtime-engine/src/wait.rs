//! Conditions used by the State Wrapper's `WatchFor`.
//!
//! Grounded on `kube-runtime/src/wait.rs`'s `Condition<K>` trait: a
//! condition is a predicate over an optional object plus `not`/`and`/`or`
//! combinators, generalized here to also match on which kind of
//! [`Event`](runtime_store::Event) arrived, alongside the resource-shape
//! conditions.

use runtime_core::Phase;
use runtime_store::Event;

/// The discriminant of an [`Event`], for condition-matching purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`Event::Created`].
    Created,
    /// See [`Event::Updated`].
    Updated,
    /// See [`Event::Destroyed`].
    Destroyed,
    /// See [`Event::Bootstrapped`].
    Bootstrapped,
    /// See [`Event::Noop`].
    Noop,
}

impl EventKind {
    fn of(event: &Event) -> Self {
        match event {
            Event::Created { .. } => EventKind::Created,
            Event::Updated { .. } => EventKind::Updated,
            Event::Destroyed { .. } => EventKind::Destroyed,
            Event::Bootstrapped { .. } => EventKind::Bootstrapped,
            Event::Noop { .. } => EventKind::Noop,
        }
    }
}

/// A predicate for [`crate::state::State::watch_for`] to wait on.
///
/// Note that this is auto-implemented for functions of type
/// `fn(&Event) -> bool`.
pub trait Condition {
    /// Whether `event` satisfies this condition.
    fn matches(&self, event: &Event) -> bool;

    /// A condition that holds if `self` does not.
    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }

    /// A condition that holds if `self` and `other` both do.
    fn and<Other: Condition>(self, other: Other) -> And<Self, Other>
    where
        Self: Sized,
    {
        And(self, other)
    }

    /// A condition that holds if either `self` or `other` does.
    fn or<Other: Condition>(self, other: Other) -> Or<Self, Other>
    where
        Self: Sized,
    {
        Or(self, other)
    }
}

impl<F: Fn(&Event) -> bool> Condition for F {
    fn matches(&self, event: &Event) -> bool {
        (self)(event)
    }
}

/// See [`Condition::not`].
pub struct Not<A>(A);
impl<A: Condition> Condition for Not<A> {
    fn matches(&self, event: &Event) -> bool {
        !self.0.matches(event)
    }
}

/// See [`Condition::and`].
pub struct And<A, B>(A, B);
impl<A: Condition, B: Condition> Condition for And<A, B> {
    fn matches(&self, event: &Event) -> bool {
        self.0.matches(event) && self.1.matches(event)
    }
}

/// See [`Condition::or`].
pub struct Or<A, B>(A, B);
impl<A: Condition, B: Condition> Condition for Or<A, B> {
    fn matches(&self, event: &Event) -> bool {
        self.0.matches(event) || self.1.matches(event)
    }
}

/// True if the event is one of `kinds`.
#[must_use]
pub fn is_event_kind(kinds: &'static [EventKind]) -> impl Condition {
    move |event: &Event| kinds.contains(&EventKind::of(event))
}

/// True if the event carries a resource whose finalizer set is empty.
/// `Destroyed` events without a carried resource do not match — use
/// `is_event_kind(&[EventKind::Destroyed])` for "the resource is gone".
#[must_use]
pub fn finalizers_empty() -> impl Condition {
    |event: &Event| {
        event_resource(event)
            .is_some_and(|r| r.metadata.finalizers.is_empty())
    }
}

/// True if the event carries a resource whose phase is one of `phases`.
#[must_use]
pub fn phase_in(phases: &'static [Phase]) -> impl Condition {
    move |event: &Event| event_resource(event).is_some_and(|r| phases.contains(&r.metadata.phase))
}

/// True if the event carries a resource satisfying an arbitrary predicate.
#[must_use]
pub fn satisfies<F: Fn(&runtime_core::Resource) -> bool>(predicate: F) -> impl Condition {
    move |event: &Event| event_resource(event).is_some_and(&predicate)
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

    fn created(id: &str, phase: Phase) -> Event {
        let mut metadata = Metadata::new("ns", "widget", id);
        metadata.phase = phase;
        Event::Created {
            resource: Resource::new(metadata, json!({})),
            bookmark: None,
        }
    }

    #[test]
    fn event_kind_matches() {
        let cond = is_event_kind(&[EventKind::Created, EventKind::Updated]);
        assert!(cond.matches(&created("a", Phase::Running)));
        assert!(!cond.matches(&Event::Bootstrapped { bookmark: None }));
    }

    #[test]
    fn phase_in_and_combinator() {
        let cond = phase_in(&[Phase::TearingDown]).and(is_event_kind(&[EventKind::Created]));
        assert!(!cond.matches(&created("a", Phase::Running)));
        assert!(cond.matches(&created("a", Phase::TearingDown)));
    }

    #[test]
    fn not_combinator_inverts() {
        let cond = is_event_kind(&[EventKind::Bootstrapped]).not();
        assert!(cond.matches(&created("a", Phase::Running)));
        assert!(!cond.matches(&Event::Bootstrapped { bookmark: None }));
    }
}
