//! In-memory object store
//!
//! Behaves like the API server for the paths the engine exercises: keyed by
//! (kind, namespace, name), resource-version based conflict detection,
//! duplicate-create signaling, and a gate for simulating custom resource
//! kinds that are not registered yet. Conflicts can also be injected to
//! exercise retry paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{kind_of, ObjectStore, StoreResource};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    objects: HashMap<(String, String, String), Stored>,
    /// None: every kind is registered. Some: only the listed kinds are.
    registered: Option<HashSet<String>>,
    injected_conflicts: HashMap<String, u32>,
    writes: u64,
}

struct Stored {
    value: Value,
    version: u64,
}

/// Object store for tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Store with every resource kind registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unregister all kinds; only kinds added via [`Self::register_kind`]
    /// will be visible to `kind_registered`.
    pub async fn gate_kinds(&self) {
        self.inner.lock().await.registered = Some(HashSet::new());
    }

    pub async fn register_kind<K: StoreResource>(&self) {
        let mut inner = self.inner.lock().await;
        inner
            .registered
            .get_or_insert_with(HashSet::new)
            .insert(kind_of::<K>());
    }

    /// Make the next `count` updates of this kind fail with a conflict.
    pub async fn inject_conflicts<K: StoreResource>(&self, count: u32) {
        self.inner
            .lock()
            .await
            .injected_conflicts
            .insert(kind_of::<K>(), count);
    }

    /// Number of successful creates and updates so far.
    pub async fn write_count(&self) -> u64 {
        self.inner.lock().await.writes
    }

    pub async fn contains<K: StoreResource>(&self, namespace: &str, name: &str) -> bool {
        let key = (
            kind_of::<K>(),
            namespace.to_string(),
            name.to_string(),
        );
        self.inner.lock().await.objects.contains_key(&key)
    }

    /// Upsert without conflict checking or write counting. Test seeding
    /// only; stands in for mutations made by other actors (the broker
    /// operator publishing status, an admin editing a field).
    pub async fn put<K: StoreResource>(&self, obj: &K) {
        let (key, mut value) = encode(obj).expect("seed object must serialize");
        strip_version(&mut value);
        let mut inner = self.inner.lock().await;
        let version = inner.objects.get(&key).map(|s| s.version + 1).unwrap_or(1);
        inner.objects.insert(key, Stored { value, version });
    }
}

fn encode<K: StoreResource>(obj: &K) -> Result<((String, String, String), Value), StoreError> {
    let value = serde_json::to_value(obj).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let namespace = value["metadata"]["namespace"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let name = value["metadata"]["name"]
        .as_str()
        .ok_or_else(|| StoreError::Serialization("object has no name".to_string()))?
        .to_string();
    Ok(((kind_of::<K>(), namespace, name), value))
}

fn strip_version(value: &mut Value) {
    if let Some(meta) = value["metadata"].as_object_mut() {
        meta.remove("resourceVersion");
    }
}

fn with_version(mut value: Value, version: u64) -> Value {
    value["metadata"]["resourceVersion"] = Value::String(version.to_string());
    value
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let inner = self.inner.lock().await;
        let stored = inner.objects.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: kind_of::<K>(),
            name: name.to_string(),
        })?;
        serde_json::from_value(with_version(stored.value.clone(), stored.version))
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn create<K: StoreResource>(&self, obj: &K) -> Result<(), StoreError> {
        let (key, mut value) = encode(obj)?;
        strip_version(&mut value);
        let mut inner = self.inner.lock().await;
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.0,
                name: key.2,
            });
        }
        inner.objects.insert(key, Stored { value, version: 1 });
        inner.writes += 1;
        Ok(())
    }

    async fn update<K: StoreResource>(&self, obj: &K) -> Result<(), StoreError> {
        let (key, mut value) = encode(obj)?;
        let mut inner = self.inner.lock().await;

        if let Some(remaining) = inner.injected_conflicts.get_mut(&key.0) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Conflict {
                    kind: key.0,
                    name: key.2,
                });
            }
        }

        let current = match inner.objects.get(&key) {
            Some(stored) => stored.version,
            None => {
                return Err(StoreError::NotFound {
                    kind: key.0,
                    name: key.2,
                })
            }
        };

        if let Some(sent) = value["metadata"]["resourceVersion"].as_str() {
            if sent != current.to_string() {
                return Err(StoreError::Conflict {
                    kind: key.0,
                    name: key.2,
                });
            }
        }

        strip_version(&mut value);
        inner.objects.insert(
            key,
            Stored {
                value,
                version: current + 1,
            },
        );
        inner.writes += 1;
        Ok(())
    }

    async fn delete<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let mut inner = self.inner.lock().await;
        match inner.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                kind: kind_of::<K>(),
                name: name.to_string(),
            }),
        }
    }

    async fn list<K: StoreResource>(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        let kind = kind_of::<K>();
        let inner = self.inner.lock().await;
        let mut out = Vec::new();
        for ((k, ns, _), stored) in inner.objects.iter() {
            if *k == kind && ns == namespace {
                let obj = serde_json::from_value(with_version(stored.value.clone(), stored.version))
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                out.push(obj);
            }
        }
        Ok(out)
    }

    async fn kind_registered<K: StoreResource>(&self) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(match &inner.registered {
            None => true,
            Some(kinds) => kinds.contains(&kind_of::<K>()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{KafkaTopic, KafkaTopicSpec};
    use kube::ResourceExt;

    fn topic(name: &str, replicas: i32) -> KafkaTopic {
        let mut topic = KafkaTopic::new(
            name,
            KafkaTopicSpec {
                partitions: Some(1),
                replicas: Some(replicas),
                config: Default::default(),
                extra: Default::default(),
            },
        );
        topic.metadata.namespace = Some("meshbus".to_string());
        topic
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let store = MemoryStore::new();
        store.create(&topic("spec", 3)).await.unwrap();

        let got: KafkaTopic = store.get("meshbus", "spec").await.unwrap();
        assert_eq!(got.name_any(), "spec");
        assert_eq!(got.spec.replicas, Some(3));
        assert_eq!(got.resource_version().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get::<KafkaTopic>("meshbus", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_already_exists() {
        let store = MemoryStore::new();
        store.create(&topic("spec", 3)).await.unwrap();
        let err = store.create(&topic("spec", 3)).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = MemoryStore::new();
        store.create(&topic("spec", 3)).await.unwrap();

        let fresh: KafkaTopic = store.get("meshbus", "spec").await.unwrap();
        store.update(&fresh).await.unwrap();

        // The object read before the update now carries a stale version.
        let err = store.update(&fresh).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_injected_conflicts_drain() {
        let store = MemoryStore::new();
        store.create(&topic("spec", 3)).await.unwrap();
        store.inject_conflicts::<KafkaTopic>(1).await;

        let fresh: KafkaTopic = store.get("meshbus", "spec").await.unwrap();
        assert!(store.update(&fresh).await.unwrap_err().is_conflict());
        let fresh: KafkaTopic = store.get("meshbus", "spec").await.unwrap();
        assert!(store.update(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_and_not_found() {
        let store = MemoryStore::new();
        store.create(&topic("spec", 3)).await.unwrap();
        store.delete::<KafkaTopic>("meshbus", "spec").await.unwrap();
        let err = store
            .delete::<KafkaTopic>("meshbus", "spec")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_namespace() {
        let store = MemoryStore::new();
        store.create(&topic("spec", 3)).await.unwrap();
        let mut other = topic("spec", 3);
        other.metadata.namespace = Some("elsewhere".to_string());
        store.create(&other).await.unwrap();

        let listed: Vec<KafkaTopic> = store.list("meshbus").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_kind_gating() {
        let store = MemoryStore::new();
        assert!(store.kind_registered::<KafkaTopic>().await.unwrap());

        store.gate_kinds().await;
        assert!(!store.kind_registered::<KafkaTopic>().await.unwrap());

        store.register_kind::<KafkaTopic>().await;
        assert!(store.kind_registered::<KafkaTopic>().await.unwrap());
    }
}
