//! Idempotent merge-based "ensure" primitive
//!
//! `ensure` drives one object to its desired shape without clobbering
//! fields it does not own: absent objects are created verbatim, existing
//! ones get a field-level merge where desired fields win and everything
//! else survives. Equality is checked on the merged result, so a reconcile
//! pass that changes nothing performs no write at all.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{OperatorError, Result};
use crate::store::{kind_of, ObjectStore, StoreResource};

/// Bounded retries for read-merge-write cycles that hit a conflict.
const CONFLICT_RETRIES: u32 = 3;

/// What `ensure` did to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Updated,
    Unchanged,
}

impl EnsureOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, EnsureOutcome::Unchanged)
    }
}

/// Merge `patch` into `base`: object fields merge recursively, any other
/// desired value (including arrays) replaces the base value, and explicit
/// nulls delete the base field.
pub fn merge_patch(base: &Value, patch: &Value) -> Value {
    match patch {
        Value::Object(patch_map) => {
            let mut out = match base {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            for (key, value) in patch_map {
                if value.is_null() {
                    out.remove(key);
                } else {
                    let base_value = out.get(key).cloned().unwrap_or(Value::Null);
                    out.insert(key.clone(), merge_patch(&base_value, value));
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// The ensure primitive over an object store.
pub struct MergeReconciler<'a, S> {
    store: &'a S,
}

impl<'a, S: ObjectStore> MergeReconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Ensure the object exists and matches `desired`.
    pub async fn ensure<K: StoreResource>(&self, desired: &K) -> Result<EnsureOutcome> {
        self.ensure_with(desired, |_, _| {}).await
    }

    /// Like [`Self::ensure`], with a carry hook applied to the merged object
    /// before comparison. The hook receives the live object and may restore
    /// fields where the live value wins over the desired one (a topic's
    /// replica count) or force fields the merge would otherwise keep.
    pub async fn ensure_with<K, F>(&self, desired: &K, carry: F) -> Result<EnsureOutcome>
    where
        K: StoreResource,
        F: Fn(&K, &mut K),
    {
        let name = desired
            .meta()
            .name
            .clone()
            .ok_or_else(|| OperatorError::Malformed("desired object has no name".to_string()))?;
        let namespace = desired.meta().namespace.clone().ok_or_else(|| {
            OperatorError::Malformed("desired object has no namespace".to_string())
        })?;

        for attempt in 0..=CONFLICT_RETRIES {
            let existing = match self.store.get::<K>(&namespace, &name).await {
                Ok(existing) => existing,
                Err(err) if err.is_not_found() => {
                    match self.store.create(desired).await {
                        Ok(()) => {
                            debug!(kind = %kind_of::<K>(), name = %name, "created");
                            return Ok(EnsureOutcome::Created);
                        }
                        // Lost the create race; re-read and merge instead.
                        Err(err) if err.is_already_exists() || err.is_conflict() => {
                            debug!(kind = %kind_of::<K>(), name = %name, attempt, "create raced, merging");
                            continue;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Err(err) => return Err(err.into()),
            };

            let mut merged: K = merge_resources(&existing, desired)?;
            carry(&existing, &mut merged);

            if serde_json::to_value(&merged)? == serde_json::to_value(&existing)? {
                return Ok(EnsureOutcome::Unchanged);
            }

            match self.store.update(&merged).await {
                Ok(()) => {
                    debug!(kind = %kind_of::<K>(), name = %name, "updated");
                    return Ok(EnsureOutcome::Updated);
                }
                Err(err) if err.is_conflict() => {
                    debug!(kind = %kind_of::<K>(), name = %name, attempt, "update conflicted, retrying");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(OperatorError::Store(crate::error::StoreError::Conflict {
            kind: kind_of::<K>(),
            name,
        }))
    }
}

/// Merge desired into existing at the JSON level and decode the result.
/// Fields only present on the live object (server defaults, status, fields
/// set by other writers) survive because desired never serializes them.
fn merge_resources<K: StoreResource>(existing: &K, desired: &K) -> Result<K> {
    let existing_value = serde_json::to_value(existing)?;
    let desired_value = serde_json::to_value(desired)?;
    let merged = merge_patch(&existing_value, &desired_value);
    Ok(serde_json::from_value(merged)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{KafkaTopic, KafkaTopicSpec};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::collections::BTreeMap;

    // -- merge_patch ---------------------------------------------------------

    #[test]
    fn test_merge_desired_fields_win() {
        let base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let patch = json!({"b": {"c": 9}});
        let merged = merge_patch(&base, &patch);
        assert_eq!(merged, json!({"a": 1, "b": {"c": 9, "d": 3}}));
    }

    #[test]
    fn test_merge_preserves_unpatched_fields() {
        let base = json!({"spec": {"replicas": 3, "serverDefault": "x"}});
        let patch = json!({"spec": {"replicas": 5}});
        let merged = merge_patch(&base, &patch);
        assert_eq!(merged["spec"]["serverDefault"], "x");
        assert_eq!(merged["spec"]["replicas"], 5);
    }

    #[test]
    fn test_merge_null_deletes() {
        let base = json!({"a": 1, "b": 2});
        let patch = json!({"b": null});
        assert_eq!(merge_patch(&base, &patch), json!({"a": 1}));
    }

    #[test]
    fn test_merge_arrays_replace() {
        let base = json!({"listeners": [{"name": "plain"}, {"name": "tls"}]});
        let patch = json!({"listeners": [{"name": "tls"}]});
        let merged = merge_patch(&base, &patch);
        assert_eq!(merged["listeners"], json!([{"name": "tls"}]));
    }

    #[test]
    fn test_merge_scalar_over_object() {
        let base = json!({"a": {"nested": true}});
        let patch = json!({"a": "flat"});
        assert_eq!(merge_patch(&base, &patch), json!({"a": "flat"}));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = json!({"a": 1, "b": {"c": [1, 2], "d": "x"}});
        let patch = json!({"b": {"c": [3]}, "e": true});
        let once = merge_patch(&base, &patch);
        let twice = merge_patch(&once, &patch);
        assert_eq!(once, twice);
    }

    // -- ensure --------------------------------------------------------------

    fn topic(name: &str, replicas: i32) -> KafkaTopic {
        let mut config = BTreeMap::new();
        config.insert("cleanup.policy".to_string(), json!("compact"));
        let mut topic = KafkaTopic::new(
            name,
            KafkaTopicSpec {
                partitions: Some(1),
                replicas: Some(replicas),
                config,
                extra: BTreeMap::new(),
            },
        );
        topic.metadata.namespace = Some("meshbus".to_string());
        topic
    }

    #[tokio::test]
    async fn test_ensure_creates_when_absent() {
        let store = MemoryStore::new();
        let outcome = MergeReconciler::new(&store)
            .ensure(&topic("spec", 3))
            .await
            .unwrap();
        assert_eq!(outcome, EnsureOutcome::Created);
        assert!(store.contains::<KafkaTopic>("meshbus", "spec").await);
    }

    #[tokio::test]
    async fn test_ensure_twice_is_unchanged() {
        let store = MemoryStore::new();
        let reconciler = MergeReconciler::new(&store);
        let desired = topic("spec", 3);

        assert_eq!(
            reconciler.ensure(&desired).await.unwrap(),
            EnsureOutcome::Created
        );
        assert_eq!(
            reconciler.ensure(&desired).await.unwrap(),
            EnsureOutcome::Unchanged
        );
        assert_eq!(store.write_count().await, 1);
    }

    #[tokio::test]
    async fn test_ensure_updates_on_drift() {
        let store = MemoryStore::new();
        let reconciler = MergeReconciler::new(&store);
        reconciler.ensure(&topic("spec", 3)).await.unwrap();

        let outcome = reconciler.ensure(&topic("spec", 1)).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Updated);

        let live: KafkaTopic = store.get("meshbus", "spec").await.unwrap();
        assert_eq!(live.spec.replicas, Some(1));
    }

    #[tokio::test]
    async fn test_ensure_preserves_externally_set_fields() {
        let store = MemoryStore::new();
        let reconciler = MergeReconciler::new(&store);
        reconciler.ensure(&topic("spec", 3)).await.unwrap();

        // Another writer adds a field this operator does not manage.
        let mut live: KafkaTopic = store.get("meshbus", "spec").await.unwrap();
        live.spec
            .extra
            .insert("topicName".to_string(), json!("spec"));
        store.put(&live).await;

        // Drift in a managed field triggers an update that keeps the
        // external field intact.
        reconciler.ensure(&topic("spec", 1)).await.unwrap();
        let live: KafkaTopic = store.get("meshbus", "spec").await.unwrap();
        assert_eq!(live.spec.extra["topicName"], json!("spec"));
        assert_eq!(live.spec.replicas, Some(1));
    }

    #[tokio::test]
    async fn test_ensure_carry_keeps_live_value() {
        let store = MemoryStore::new();
        let reconciler = MergeReconciler::new(&store);
        reconciler.ensure(&topic("status.a", 3)).await.unwrap();

        // Desired asks for 1 replica, but the live replica count wins.
        let outcome = reconciler
            .ensure_with(&topic("status.a", 1), |existing: &KafkaTopic, merged| {
                merged.spec.replicas = existing.spec.replicas;
            })
            .await
            .unwrap();
        assert_eq!(outcome, EnsureOutcome::Unchanged);

        let live: KafkaTopic = store.get("meshbus", "status.a").await.unwrap();
        assert_eq!(live.spec.replicas, Some(3));
    }

    #[tokio::test]
    async fn test_ensure_retries_conflicts() {
        let store = MemoryStore::new();
        let reconciler = MergeReconciler::new(&store);
        reconciler.ensure(&topic("spec", 3)).await.unwrap();

        store.inject_conflicts::<KafkaTopic>(2).await;
        let outcome = reconciler.ensure(&topic("spec", 1)).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Updated);
    }

    #[tokio::test]
    async fn test_ensure_gives_up_after_retry_budget() {
        let store = MemoryStore::new();
        let reconciler = MergeReconciler::new(&store);
        reconciler.ensure(&topic("spec", 3)).await.unwrap();

        store.inject_conflicts::<KafkaTopic>(10).await;
        let err = reconciler.ensure(&topic("spec", 1)).await.unwrap_err();
        match err {
            OperatorError::Store(store_err) => assert!(store_err.is_conflict()),
            other => panic!("expected conflict, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_ensure_of_shared_topic() {
        let store = MemoryStore::new();
        let desired = topic("spec", 3);

        // Two tenants race to create the shared topic; neither may fail.
        let r1 = MergeReconciler::new(&store);
        let r2 = MergeReconciler::new(&store);
        let (a, b) = tokio::join!(
            r1.ensure(&desired),
            r2.ensure(&desired),
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(store.contains::<KafkaTopic>("meshbus", "spec").await);
    }
}
