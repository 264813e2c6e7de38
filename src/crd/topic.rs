//! Kafka topic resource (kafka.strimzi.io/v1beta2)

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// KafkaTopic is the broker operator's topic API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta2",
    kind = "KafkaTopic",
    plural = "kafkatopics",
    namespaced,
    status = "KafkaTopicStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaTopicSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Topic-level configuration (cleanup.policy and friends)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KafkaTopicStatus {
    #[serde(default)]
    pub topic_name: Option<String>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_spec_parsing() {
        let json = r#"{
            "partitions": 1,
            "replicas": 3,
            "config": {"cleanup.policy": "compact"}
        }"#;
        let spec: KafkaTopicSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.partitions, Some(1));
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.config["cleanup.policy"], "compact");
    }

    #[test]
    fn test_empty_config_omitted() {
        let spec = KafkaTopicSpec {
            partitions: Some(1),
            replicas: Some(1),
            config: BTreeMap::new(),
            extra: BTreeMap::new(),
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert!(value.get("config").is_none());
    }
}
