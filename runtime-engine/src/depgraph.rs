//! The dependency database: a bipartite relation between
//! registered controllers and the resource kinds they declare as Inputs or
//! Outputs. Drives which `WatchKind` subscriptions the engine keeps open
//! and which controllers wake for a given change.
//!
//! Grounded on `kube-runtime/src/controller/mod.rs`'s trigger-selector
//! bookkeeping (mapping watched objects back to reconcile targets),
//! generalized from "owner references" to explicit Input/Output
//! declarations.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use runtime_core::{Error, Kind, Pointer, Result};

/// The strength of a declared read dependency (Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InputKind {
    /// A read dependency with no teardown implications.
    Weak,
    /// Pins the source through the dependent controller's own finalizer;
    /// blocks teardown of the source until cleared.
    Strong,
    /// Only fires once the target reaches (`TearingDown`, finalizers = ∅).
    DestroyReady,
}

/// The exclusivity of a declared write target (Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// At most one controller may hold an exclusive output of a given type.
    Exclusive,
    /// Any number of controllers may hold a shared output of a given type.
    Shared,
}

/// One controller's declared input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputDecl {
    /// Namespace of the watched kind.
    pub namespace: String,
    /// Type of the watched kind.
    pub type_: String,
    /// Restricts the input to a single id, when set.
    pub id: Option<String>,
    /// The strength of this dependency.
    pub kind: InputKind,
}

impl InputDecl {
    /// The `(namespace, type)` this input subscribes to.
    #[must_use]
    pub fn watch_kind(&self) -> Kind {
        Kind::new(self.namespace.clone(), self.type_.clone())
    }

    fn matches(&self, pointer: &Pointer) -> bool {
        self.namespace == pointer.namespace
            && self.type_ == pointer.type_
            && self.id.as_deref().is_none_or(|id| id == pointer.id)
    }
}

/// One controller's declared output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputDecl {
    /// The output resource type.
    pub type_: String,
    /// Exclusivity of this output.
    pub kind: OutputKind,
}

struct ControllerEntry {
    inputs: Vec<InputDecl>,
    outputs: Vec<OutputDecl>,
}

#[derive(Default)]
struct Tables {
    controllers: HashMap<String, ControllerEntry>,
    /// type -> controller currently holding an Exclusive output of it.
    exclusive_owners: HashMap<String, String>,
    /// kind -> number of controllers with an input referencing it (for
    /// reference-counted `WatchKind` subscription bookkeeping).
    watch_refcounts: HashMap<Kind, usize>,
}

/// The dependency database shared by the `ControllerEngine` and its watch
/// dedup pipeline.
#[derive(Default)]
pub struct DependencyDatabase {
    tables: RwLock<Tables>,
}

/// What changed in the set of open `WatchKind` subscriptions as a result
/// of a registration, input update, or unregistration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchDiff {
    /// Kinds that need a brand-new `WatchKind` subscription opened.
    pub to_open: Vec<Kind>,
    /// Kinds with no remaining referents, whose subscription should close.
    pub to_close: Vec<Kind>,
}

impl DependencyDatabase {
    /// Register a new controller's declared inputs/outputs.
    ///
    /// Rejects a duplicate name, and an Exclusive output that collides
    /// with another controller's existing Exclusive output of the same
    /// type.
    pub fn register(
        &self,
        name: &str,
        inputs: Vec<InputDecl>,
        outputs: Vec<OutputDecl>,
    ) -> Result<WatchDiff> {
        let mut tables = self.tables.write();
        if tables.controllers.contains_key(name) {
            return Err(Error::Conflict(format!("controller {name:?} already registered")));
        }
        for output in &outputs {
            if output.kind == OutputKind::Exclusive {
                if let Some(holder) = tables.exclusive_owners.get(&output.type_) {
                    return Err(Error::Conflict(format!(
                        "exclusive output {:?} already held by {holder:?}",
                        output.type_
                    )));
                }
            }
        }
        for output in &outputs {
            if output.kind == OutputKind::Exclusive {
                tables.exclusive_owners.insert(output.type_.clone(), name.to_string());
            }
        }

        let mut to_open = Vec::new();
        for input in &inputs {
            let kind = input.watch_kind();
            let refcount = tables.watch_refcounts.entry(kind.clone()).or_insert(0);
            if *refcount == 0 {
                to_open.push(kind);
            }
            *refcount += 1;
        }
        to_open.sort();
        to_open.dedup();

        tables.controllers.insert(
            name.to_string(),
            ControllerEntry {
                inputs,
                outputs,
            },
        );

        Ok(WatchDiff {
            to_open,
            to_close: Vec::new(),
        })
    }

    /// Compute and apply the minimal add/remove sequence between a
    /// controller's current inputs and `new_inputs`. Both sides are compared as sorted sets.
    pub fn update_inputs(&self, name: &str, mut new_inputs: Vec<InputDecl>) -> Result<WatchDiff> {
        new_inputs.sort();
        new_inputs.dedup();

        let mut tables = self.tables.write();
        let current = tables
            .controllers
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("controller {name:?} not registered")))?
            .inputs
            .clone();

        let mut current_sorted = current.clone();
        current_sorted.sort();

        let added: Vec<InputDecl> = new_inputs
            .iter()
            .filter(|i| !current_sorted.contains(i))
            .cloned()
            .collect();
        let removed: Vec<InputDecl> = current_sorted
            .iter()
            .filter(|i| !new_inputs.contains(i))
            .cloned()
            .collect();

        let mut to_open = Vec::new();
        for input in &added {
            let kind = input.watch_kind();
            let refcount = tables.watch_refcounts.entry(kind.clone()).or_insert(0);
            if *refcount == 0 {
                to_open.push(kind);
            }
            *refcount += 1;
        }
        let mut to_close = Vec::new();
        for input in &removed {
            let kind = input.watch_kind();
            if let Some(refcount) = tables.watch_refcounts.get_mut(&kind) {
                *refcount -= 1;
                if *refcount == 0 {
                    tables.watch_refcounts.remove(&kind);
                    to_close.push(kind);
                }
            }
        }
        to_open.sort();
        to_open.dedup();
        to_close.sort();
        to_close.dedup();

        tables.controllers.get_mut(name).expect("checked above").inputs = new_inputs;

        Ok(WatchDiff { to_open, to_close })
    }

    /// Remove a controller entirely, releasing its exclusive outputs and
    /// watch references.
    pub fn unregister(&self, name: &str) -> WatchDiff {
        let mut tables = self.tables.write();
        let Some(entry) = tables.controllers.remove(name) else {
            return WatchDiff::default();
        };
        tables.exclusive_owners.retain(|_, holder| holder != name);

        let mut to_close = Vec::new();
        for input in &entry.inputs {
            let kind = input.watch_kind();
            if let Some(refcount) = tables.watch_refcounts.get_mut(&kind) {
                *refcount -= 1;
                if *refcount == 0 {
                    tables.watch_refcounts.remove(&kind);
                    to_close.push(kind);
                }
            }
        }
        to_close.sort();
        to_close.dedup();
        WatchDiff {
            to_open: Vec::new(),
            to_close,
        }
    }

    /// Controllers with a declared input matching `pointer`, along with
    /// the strength of that input.
    #[must_use]
    pub fn dependents_of(&self, pointer: &Pointer) -> Vec<(String, InputKind)> {
        let tables = self.tables.read();
        let mut out = Vec::new();
        for (name, entry) in &tables.controllers {
            for input in &entry.inputs {
                if input.matches(pointer) {
                    out.push((name.clone(), input.kind));
                }
            }
        }
        out
    }

    /// Whether `name` declared `kind` as an input, at any id restriction.
    /// Used to authorize `Get`/`List`/`WatchKind` calls, which are coarser
    /// than the per-pointer check in [`DependencyDatabase::dependents_of`].
    #[must_use]
    pub fn declares_input(&self, name: &str, kind: &Kind) -> bool {
        self.tables
            .read()
            .controllers
            .get(name)
            .is_some_and(|entry| entry.inputs.iter().any(|i| i.watch_kind() == *kind))
    }

    /// Whether `name` declared `type_` as one of its outputs (any
    /// exclusivity). Writes from a controller must target a declared
    /// output.
    #[must_use]
    pub fn owns_output(&self, name: &str, type_: &str) -> bool {
        self.tables
            .read()
            .controllers
            .get(name)
            .is_some_and(|entry| entry.outputs.iter().any(|o| o.type_ == type_))
    }

    /// Whether `name` declared `kind` as a `Strong` input. Finalizer
    /// mutations on an input require this.
    #[must_use]
    pub fn has_strong_input(&self, name: &str, kind: &Kind) -> bool {
        self.tables.read().controllers.get(name).is_some_and(|entry| {
            entry
                .inputs
                .iter()
                .any(|i| i.watch_kind() == *kind && i.kind == InputKind::Strong)
        })
    }

    /// Every kind currently referenced by at least one input, for engine
    /// bootstrap bookkeeping.
    #[must_use]
    pub fn watched_kinds(&self) -> HashSet<Kind> {
        self.tables.read().watch_refcounts.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(ns: &str, ty: &str, kind: InputKind) -> InputDecl {
        InputDecl {
            namespace: ns.to_string(),
            type_: ty.to_string(),
            id: None,
            kind,
        }
    }

    fn output(ty: &str, kind: OutputKind) -> OutputDecl {
        OutputDecl {
            type_: ty.to_string(),
            kind,
        }
    }

    #[test]
    fn registration_rejects_duplicate_name() {
        let db = DependencyDatabase::default();
        db.register("a", vec![], vec![]).unwrap();
        let err = db.register("a", vec![], vec![]).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn registration_rejects_colliding_exclusive_outputs() {
        let db = DependencyDatabase::default();
        db.register("a", vec![], vec![output("widget", OutputKind::Exclusive)])
            .unwrap();
        let err = db
            .register("b", vec![], vec![output("widget", OutputKind::Exclusive)])
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn shared_outputs_may_overlap() {
        let db = DependencyDatabase::default();
        db.register("a", vec![], vec![output("widget", OutputKind::Shared)])
            .unwrap();
        db.register("b", vec![], vec![output("widget", OutputKind::Shared)])
            .unwrap();
    }

    #[test]
    fn first_input_on_a_kind_opens_a_watch_and_last_removal_closes_it() {
        let db = DependencyDatabase::default();
        let diff = db
            .register("a", vec![input("ns", "widget", InputKind::Weak)], vec![])
            .unwrap();
        assert_eq!(diff.to_open, vec![Kind::new("ns", "widget")]);

        let diff = db
            .register("b", vec![input("ns", "widget", InputKind::Weak)], vec![])
            .unwrap();
        assert!(diff.to_open.is_empty(), "second referent must not reopen the watch");

        let diff = db.unregister("a");
        assert!(diff.to_close.is_empty(), "b still references the kind");

        let diff = db.unregister("b");
        assert_eq!(diff.to_close, vec![Kind::new("ns", "widget")]);
    }

    #[test]
    fn update_inputs_computes_minimal_diff() {
        let db = DependencyDatabase::default();
        db.register("a", vec![input("ns", "widget", InputKind::Weak)], vec![])
            .unwrap();

        let diff = db
            .update_inputs(
                "a",
                vec![input("ns", "widget", InputKind::Weak), input("ns", "gadget", InputKind::Strong)],
            )
            .unwrap();
        assert_eq!(diff.to_open, vec![Kind::new("ns", "gadget")]);
        assert!(diff.to_close.is_empty());

        let diff = db.update_inputs("a", vec![input("ns", "gadget", InputKind::Strong)]).unwrap();
        assert_eq!(diff.to_close, vec![Kind::new("ns", "widget")]);
        assert!(diff.to_open.is_empty());
    }

    #[test]
    fn dependents_of_honors_id_restriction() {
        let db = DependencyDatabase::default();
        db.register(
            "a",
            vec![InputDecl {
                namespace: "ns".to_string(),
                type_: "widget".to_string(),
                id: Some("only-this-one".to_string()),
                kind: InputKind::Weak,
            }],
            vec![],
        )
        .unwrap();

        let deps = db.dependents_of(&Pointer::new("ns", "widget", "only-this-one"));
        assert_eq!(deps, vec![("a".to_string(), InputKind::Weak)]);
        assert!(db.dependents_of(&Pointer::new("ns", "widget", "other")).is_empty());
    }
}
