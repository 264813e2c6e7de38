//! Kafka cluster resource (kafka.strimzi.io/v1beta2)
//!
//! Typed subset of the broker operator's cluster object covering the fields
//! this operator manages. Every struct that takes part in the field-level
//! merge carries a flattened catch-all map so fields set by other writers
//! survive a read-merge-write cycle untouched.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{ResourceRequirements, Toleration};

/// Kafka is the broker operator's cluster API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta2",
    kind = "Kafka",
    plural = "kafkas",
    namespaced,
    status = "KafkaStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaSpec {
    pub kafka: BrokerSpec,
    pub zookeeper: ZookeeperSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_operator: Option<EntityOperatorSpec>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// Broker half of the cluster spec
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub replicas: i32,
    pub listeners: Vec<KafkaListener>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
    pub storage: KafkaStorage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<BrokerAuthorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_config: Option<MetricsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<ComponentTemplate>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// Zookeeper half of the cluster spec
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperSpec {
    pub replicas: i32,
    pub storage: StorageVolume,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_config: Option<MetricsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<ComponentTemplate>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// Topic and user operator deployment managed alongside the brokers
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EntityOperatorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_operator: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_operator: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<ComponentTemplate>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// A single broker listener
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaListener {
    pub name: String,
    pub port: i32,
    pub tls: bool,
    pub r#type: ListenerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ListenerAuthentication>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListenerType {
    Internal,
    Route,
    Ingress,
    Nodeport,
    Loadbalancer,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListenerAuthentication {
    pub r#type: String,
}

/// Broker storage (jbod with persistent-claim volumes)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaStorage {
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<StorageVolume>,
}

/// One persistent-claim volume
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageVolume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    pub r#type: String,
    pub size: String,
    pub delete_claim: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BrokerAuthorization {
    pub r#type: String,
}

/// JMX Prometheus exporter configuration reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    pub r#type: String,
    pub value_from: MetricsValueFrom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsValueFrom {
    pub config_map_key_ref: MetricsConfigMapKeyRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricsConfigMapKeyRef {
    pub name: String,
    pub key: String,
}

/// Pod-level template shared by all transport components
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<PodAffinity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodAffinity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<NodeAffinity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeAffinity {
    pub required_during_scheduling_ignored_during_execution: NodeSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LocalObjectReference {
    pub name: String,
}

/// Status published by the broker operator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KafkaStatus {
    #[serde(default)]
    pub conditions: Option<Vec<KafkaCondition>>,
    #[serde(default)]
    pub listeners: Option<Vec<ListenerStatus>>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KafkaCondition {
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

/// Published connection endpoint of one listener
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bootstrap_servers: Option<String>,
    #[serde(default)]
    pub certificates: Option<Vec<String>>,
}

impl Kafka {
    /// True when the broker operator reports a Ready condition with
    /// status True.
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.conditions.as_ref())
            .map(|conditions| {
                conditions.iter().any(|c| {
                    c.r#type.as_deref() == Some("Ready") && c.status.as_deref() == Some("True")
                })
            })
            .unwrap_or(false)
    }

    /// True when any declared listener has TLS enabled.
    pub fn any_tls_listener(&self) -> bool {
        self.spec.kafka.listeners.iter().any(|l| l.tls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_status(ready: bool) -> KafkaStatus {
        KafkaStatus {
            conditions: Some(vec![KafkaCondition {
                r#type: Some("Ready".to_string()),
                status: Some(if ready { "True" } else { "False" }.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    fn minimal_spec() -> KafkaSpec {
        KafkaSpec {
            kafka: BrokerSpec {
                version: None,
                replicas: 3,
                listeners: vec![
                    KafkaListener {
                        name: "plain".to_string(),
                        port: 9092,
                        tls: false,
                        r#type: ListenerType::Internal,
                        authentication: None,
                    },
                    KafkaListener {
                        name: "tls".to_string(),
                        port: 9093,
                        tls: true,
                        r#type: ListenerType::Route,
                        authentication: Some(ListenerAuthentication {
                            r#type: "tls".to_string(),
                        }),
                    },
                ],
                config: BTreeMap::new(),
                storage: KafkaStorage {
                    r#type: "jbod".to_string(),
                    volumes: vec![],
                },
                resources: None,
                authorization: None,
                metrics_config: None,
                template: None,
                extra: BTreeMap::new(),
            },
            zookeeper: ZookeeperSpec {
                replicas: 3,
                storage: StorageVolume {
                    id: None,
                    r#type: "persistent-claim".to_string(),
                    size: "10Gi".to_string(),
                    delete_claim: false,
                    class: None,
                },
                resources: None,
                metrics_config: None,
                template: None,
                extra: BTreeMap::new(),
            },
            entity_operator: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_ready_condition() {
        let mut kafka = Kafka::new("kafka", minimal_spec());
        assert!(!kafka.is_ready());

        kafka.status = Some(ready_status(false));
        assert!(!kafka.is_ready());

        kafka.status = Some(ready_status(true));
        assert!(kafka.is_ready());
    }

    #[test]
    fn test_tls_observation() {
        let kafka = Kafka::new("kafka", minimal_spec());
        assert!(kafka.any_tls_listener());
    }

    #[test]
    fn test_unknown_spec_fields_survive_round_trip() {
        let json = serde_json::json!({
            "kafka": {
                "replicas": 3,
                "listeners": [],
                "storage": {"type": "jbod"},
                "rack": {"topologyKey": "topology.kubernetes.io/zone"}
            },
            "zookeeper": {
                "replicas": 3,
                "storage": {"type": "persistent-claim", "size": "10Gi", "deleteClaim": false}
            },
            "cruiseControl": {}
        });
        let spec: KafkaSpec = serde_json::from_value(json.clone()).unwrap();
        assert!(spec.extra.contains_key("cruiseControl"));
        assert!(spec.kafka.extra.contains_key("rack"));

        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["cruiseControl"], serde_json::json!({}));
        assert_eq!(
            back["kafka"]["rack"]["topologyKey"],
            serde_json::json!("topology.kubernetes.io/zone")
        );
    }

    #[test]
    fn test_listener_serialization() {
        let listener = KafkaListener {
            name: "tls".to_string(),
            port: 9093,
            tls: true,
            r#type: ListenerType::Route,
            authentication: Some(ListenerAuthentication {
                r#type: "tls".to_string(),
            }),
        };
        let value = serde_json::to_value(&listener).unwrap();
        assert_eq!(value["type"], "route");
        assert_eq!(value["authentication"]["type"], "tls");
    }
}
