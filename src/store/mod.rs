//! Object store abstraction
//!
//! All persistent state lives in externally owned resource objects keyed by
//! (kind, namespace, name). The trait below is the only surface the
//! reconcile engine touches, which keeps every provisioning path testable
//! against the in-memory implementation.

mod kube_store;
mod memory;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

/// Bounds every storable resource satisfies: a namespaced kube resource with
/// static type information and serde round-tripping.
pub trait StoreResource:
    kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> StoreResource for T where
    T: kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Kind name of a storable resource.
pub fn kind_of<K: StoreResource>() -> String {
    K::kind(&()).into_owned()
}

/// The store collaborator. Optimistic concurrency only: `update` fails with
/// [`StoreError::Conflict`] when the object changed since it was read, and
/// no method takes a lock.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    async fn create<K: StoreResource>(&self, obj: &K) -> Result<(), StoreError>;

    async fn update<K: StoreResource>(&self, obj: &K) -> Result<(), StoreError>;

    async fn delete<K: StoreResource>(&self, namespace: &str, name: &str)
        -> Result<(), StoreError>;

    async fn list<K: StoreResource>(&self, namespace: &str) -> Result<Vec<K>, StoreError>;

    /// Whether the resource kind is registered and usable. Custom resource
    /// kinds only appear once their definitions are installed, so the
    /// provisioning pipeline probes this before touching broker objects.
    async fn kind_registered<K: StoreResource>(&self) -> Result<bool, StoreError>;
}
