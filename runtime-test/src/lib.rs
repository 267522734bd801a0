//! Property-assertion helpers and resource fixtures for the test suites in
//! `runtime-store`/`runtime-engine`: version monotonicity, owner
//! immutability, bootstrap-sequence and watch-order checks, plus quick
//! builders for the `{id, str, int}`-shaped resources the transform
//! controller scenarios use throughout.
//!
//! This crate is a dev/test-time dependency, not part of the public
//! runtime — it is not re-exported from the `runtime` umbrella crate.

pub mod fixtures;
pub mod properties;

pub use fixtures::{bare, labeled, resource, widget};
pub use properties::{assert_bootstrap_sequence, assert_owner_immutable, assert_version_monotonic, collect_events};
