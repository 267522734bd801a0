//! The Access Filter: wraps the Core Store with a predicate
//! evaluated before every call.

use runtime_core::{Kind, Pointer, Resource, Result};
use runtime_store::{
    CoreStore, CreateOptions, DestroyOptions, GetOptions, ListOptions, UpdateOptions, WatchKindOptions, WatchOptions,
    WatchStream,
};

/// The verb an [`Access`] check is being asked to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// See [`CoreStore::get`].
    Get,
    /// See [`CoreStore::list`].
    List,
    /// See [`CoreStore::watch`] / [`CoreStore::watch_kind`].
    Watch,
    /// See [`CoreStore::create`].
    Create,
    /// See [`CoreStore::update`].
    Update,
    /// See [`CoreStore::destroy`].
    Destroy,
}

/// What a single call is trying to do, for the predicate to authorize.
/// `id` is empty for `List`/`WatchKind`.
#[derive(Debug, Clone)]
pub struct Access<'a> {
    /// The verb being attempted.
    pub verb: Verb,
    /// Namespace of the target kind.
    pub namespace: &'a str,
    /// Type of the target kind.
    pub type_: &'a str,
    /// The target id, or empty for kind-wide operations.
    pub id: &'a str,
}

/// A predicate deciding whether a given [`Access`] is permitted. Returning
/// `Err` denies the call with that error (typically
/// [`runtime_core::Error::AccessDenied`]); `Ok(())` passes the call
/// through unchanged.
pub trait AccessPredicate: Send + Sync {
    /// Authorize `access`, or return the error to fail the call with.
    fn check(&self, access: &Access<'_>) -> Result<()>;
}

impl<F> AccessPredicate for F
where
    F: Fn(&Access<'_>) -> Result<()> + Send + Sync,
{
    fn check(&self, access: &Access<'_>) -> Result<()> {
        (self)(access)
    }
}

/// Wraps a [`CoreStore`] with an [`AccessPredicate`] checked before every
/// operation.
pub struct AccessFilter<P> {
    store: CoreStore,
    predicate: P,
}

impl<P: AccessPredicate> AccessFilter<P> {
    /// Build a filter over `store` enforcing `predicate`.
    pub fn new(store: CoreStore, predicate: P) -> Self {
        Self { store, predicate }
    }

    /// See [`CoreStore::get`].
    pub async fn get(&self, pointer: &Pointer, opts: GetOptions) -> Result<Resource> {
        self.predicate.check(&Access {
            verb: Verb::Get,
            namespace: &pointer.namespace,
            type_: &pointer.type_,
            id: &pointer.id,
        })?;
        self.store.get(pointer, opts).await
    }

    /// See [`CoreStore::list`].
    pub async fn list(&self, kind: &Kind, opts: ListOptions) -> Result<Vec<Resource>> {
        self.predicate.check(&Access {
            verb: Verb::List,
            namespace: &kind.namespace,
            type_: &kind.type_,
            id: "",
        })?;
        self.store.list(kind, opts).await
    }

    /// See [`CoreStore::create`].
    pub async fn create(&self, resource: Resource, opts: CreateOptions) -> Result<Resource> {
        self.predicate.check(&Access {
            verb: Verb::Create,
            namespace: &resource.metadata.namespace,
            type_: &resource.metadata.type_,
            id: &resource.metadata.id,
        })?;
        self.store.create(resource, opts).await
    }

    /// See [`CoreStore::update`].
    pub async fn update(&self, resource: Resource, opts: UpdateOptions) -> Result<Resource> {
        self.predicate.check(&Access {
            verb: Verb::Update,
            namespace: &resource.metadata.namespace,
            type_: &resource.metadata.type_,
            id: &resource.metadata.id,
        })?;
        self.store.update(resource, opts).await
    }

    /// See [`CoreStore::destroy`].
    pub async fn destroy(&self, pointer: &Pointer, opts: DestroyOptions) -> Result<()> {
        self.predicate.check(&Access {
            verb: Verb::Destroy,
            namespace: &pointer.namespace,
            type_: &pointer.type_,
            id: &pointer.id,
        })?;
        self.store.destroy(pointer, opts).await
    }

    /// See [`CoreStore::watch`].
    pub async fn watch(&self, pointer: Pointer, opts: WatchOptions) -> Result<WatchStream> {
        self.predicate.check(&Access {
            verb: Verb::Watch,
            namespace: &pointer.namespace,
            type_: &pointer.type_,
            id: &pointer.id,
        })?;
        self.store.watch(pointer, opts).await
    }

    /// See [`CoreStore::watch_kind`].
    pub async fn watch_kind(&self, kind: Kind, opts: WatchKindOptions) -> Result<WatchStream> {
        self.predicate.check(&Access {
            verb: Verb::Watch,
            namespace: &kind.namespace,
            type_: &kind.type_,
            id: "",
        })?;
        self.store.watch_kind(kind, opts).await
    }
}

#[cfg(test)]
mod tests {
    use runtime_core::{Error, Metadata};
    use runtime_store::CoreStoreConfig;
    use serde_json::json;

    use super::*;

    fn deny_writes(access: &Access<'_>) -> Result<()> {
        match access.verb {
            Verb::Create | Verb::Update | Verb::Destroy => Err(Error::AccessDenied(format!(
                "writes to {}/{} are denied",
                access.namespace, access.type_
            ))),
            _ => Ok(()),
        }
    }

    #[tokio::test]
    async fn denied_verb_never_reaches_the_store() {
        let filter = AccessFilter::new(CoreStore::new(CoreStoreConfig::default()), deny_writes);
        let resource = Resource::new(Metadata::new("ns", "widget", "a"), json!({}));
        let err = filter.create(resource, CreateOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
    }

    #[tokio::test]
    async fn permitted_verb_passes_through() {
        let store = CoreStore::new(CoreStoreConfig::default());
        let filter = AccessFilter::new(store, deny_writes);
        let pointer = Pointer::new("ns", "widget", "a");
        let err = filter.get(&pointer, GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "Get is permitted; NotFound must come from the store");
    }
}
