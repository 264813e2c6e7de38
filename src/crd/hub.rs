//! MessageHub Custom Resource Definition
//!
//! The owning deployment: one `MessageHub` declares one Kafka transport
//! cluster plus the tenants attached to it. The transport provisioner keeps
//! the live cluster converged with this object.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ResourceRequirements, Toleration};

/// MessageHub is the Schema for the messagehubs API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "meshbus.io",
    version = "v1alpha1",
    kind = "MessageHub",
    namespaced,
    status = "MessageHubStatus",
    shortname = "mhub",
    printcolumn = r#"{"name":"Availability","type":"string","jsonPath":".spec.availability"}"#,
    printcolumn = r#"{"name":"Bootstrap","type":"string","jsonPath":".status.bootstrapServer"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MessageHubSpec {
    /// Availability mode; Basic runs transport topics with one replica
    #[serde(default)]
    pub availability: AvailabilityMode,

    /// Tenants to provision transport access for
    #[serde(default)]
    pub tenants: Vec<String>,

    /// Enable JMX metrics export and a PodMonitor for the brokers
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Size of the persistent volumes (e.g., "10Gi")
    #[serde(default)]
    pub storage_size: Option<String>,

    /// Storage class for the persistent volumes
    #[serde(default)]
    pub storage_class: Option<String>,

    /// Node selector applied to broker, zookeeper and entity-operator pods
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Tolerations applied to all transport pods
    #[serde(default)]
    pub tolerations: Vec<Toleration>,

    /// Pull secret for broker images
    #[serde(default)]
    pub image_pull_secret: Option<String>,

    /// Resource requirements for the brokers
    #[serde(default)]
    pub kafka_resources: Option<ResourceRequirements>,

    /// Resource requirements for zookeeper
    #[serde(default)]
    pub zookeeper_resources: Option<ResourceRequirements>,
}

/// Availability mode of the transport
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum AvailabilityMode {
    /// Replicated topics, production default
    #[default]
    High,
    /// Single-replica topics for constrained environments
    Basic,
}

/// Status of the MessageHub
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageHubStatus {
    /// Current phase of the transport
    #[serde(default)]
    pub phase: HubPhase,

    /// Tenants whose topics and users have been provisioned
    #[serde(default)]
    pub provisioned_tenants: Vec<String>,

    /// Bootstrap address of the external TLS listener
    #[serde(default)]
    pub bootstrap_server: Option<String>,

    /// Identity of the underlying Kafka cluster
    #[serde(default)]
    pub cluster_id: Option<String>,

    /// Conditions representing transport state
    #[serde(default)]
    pub conditions: Vec<HubCondition>,

    /// Last observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,

    /// Last update timestamp
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Phase of the transport lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum HubPhase {
    /// Provisioning has not completed yet
    #[default]
    Pending,
    /// The pipeline is converging the cluster
    Provisioning,
    /// Cluster ready, tenants provisioned
    Ready,
    /// Provisioning failed; will be retried
    Failed,
    /// The hub is being torn down
    Terminating,
}

/// Condition of the hub transport
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HubCondition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_spec_defaults() {
        let spec: MessageHubSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.availability, AvailabilityMode::High);
        assert!(spec.tenants.is_empty());
        assert!(spec.enable_metrics);
        assert!(spec.node_selector.is_empty());
    }

    #[test]
    fn test_hub_spec_parsing() {
        let json = r#"{
            "availability": "Basic",
            "tenants": ["cluster-a", "cluster-b"],
            "enableMetrics": false,
            "storageSize": "50Gi"
        }"#;
        let spec: MessageHubSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.availability, AvailabilityMode::Basic);
        assert_eq!(spec.tenants.len(), 2);
        assert!(!spec.enable_metrics);
        assert_eq!(spec.storage_size.as_deref(), Some("50Gi"));
    }

    #[test]
    fn test_hub_phase_default() {
        assert_eq!(HubPhase::default(), HubPhase::Pending);
    }
}
