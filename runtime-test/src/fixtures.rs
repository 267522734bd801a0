//! Quick resource builders for test suites.

use runtime_core::{Metadata, Resource};
use serde_json::{json, Value};

/// Build an unsaved resource `(namespace, type, id)` with spec `spec`.
/// Callers still pass the result through `CoreStore::create` to get a
/// store-stamped version/phase/timestamps.
#[must_use]
pub fn resource(namespace: &str, type_: &str, id: &str, spec: Value) -> Resource {
    Resource::new(Metadata::new(namespace, type_, id), spec)
}

/// A resource in the `"ns"` namespace with an empty object spec, the shape
/// most invariant tests reach for when the spec content is irrelevant.
#[must_use]
pub fn bare(type_: &str, id: &str) -> Resource {
    resource("ns", type_, id, json!({}))
}

/// A `widget`, the type name this workspace's test suites use throughout
/// for "some resource with a string and an int field".
#[must_use]
pub fn widget(id: &str, str_field: &str, int_field: i64) -> Resource {
    resource("ns", "widget", id, json!({"str": str_field, "int": int_field}))
}

/// Build a resource pre-populated with the given labels.
#[must_use]
pub fn labeled(type_: &str, id: &str, labels: &[(&str, &str)]) -> Resource {
    let mut r = bare(type_, id);
    for (k, v) in labels {
        r.metadata.labels.insert((*k).to_string(), (*v).to_string());
    }
    r
}
