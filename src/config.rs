//! Transport configuration
//!
//! One explicit struct carries every knob of the provisioner. All fields are
//! defaulted and may be overridden before the provisioner is constructed;
//! nothing mutates the configuration afterwards.

use std::time::Duration;

use crate::crd::{AvailabilityMode, MessageHub};
use crate::error::{OperatorError, Result};
use kube::ResourceExt;

/// Name of the managed Kafka cluster object
pub const DEFAULT_CLUSTER_NAME: &str = "kafka";
/// Default persistent volume size for brokers and zookeeper
pub const DEFAULT_STORAGE_SIZE: &str = "10Gi";
/// Name of the operator's own Kafka access user
pub const OPERATOR_KAFKA_USER: &str = "meshbus-kafka-user";

// Subscription defaults, production profile
pub const DEFAULT_SUB_NAME: &str = "strimzi-kafka-operator";
pub const DEFAULT_CHANNEL: &str = "amq-streams-2.7.x";
pub const DEFAULT_PACKAGE_NAME: &str = "amq-streams";
pub const DEFAULT_CATALOG_SOURCE: &str = "redhat-operators";
pub const DEFAULT_CATALOG_SOURCE_NAMESPACE: &str = "openshift-marketplace";

// Subscription defaults, community profile
pub const COMMUNITY_CHANNEL: &str = "strimzi-0.40.x";
pub const COMMUNITY_PACKAGE_NAME: &str = "strimzi-kafka-operator";
pub const COMMUNITY_CATALOG_SOURCE: &str = "community-operators";

/// Fixed partition count for transport topics
pub const DEFAULT_TOPIC_PARTITIONS: i32 = 1;
/// Topic replica count under high availability
pub const DEFAULT_TOPIC_REPLICAS: i32 = 3;

/// Configuration for the Kafka transport provisioner.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Name of the Kafka cluster object
    pub cluster_name: String,
    /// Namespace everything is provisioned into
    pub namespace: String,

    /// Subscription (installation) parameters for the broker operator
    pub sub_name: String,
    pub channel: String,
    pub package_name: String,
    pub catalog_source: String,
    pub catalog_source_namespace: String,
    /// Optional CSV version pin for the installation
    pub starting_csv: Option<String>,

    /// Block inside `ensure_kafka` until the cluster reports Ready
    pub wait_ready: bool,
    /// Expect TLS on the external listener
    pub enable_tls: bool,
    /// All tenants share one literal status topic
    pub shared_topics: bool,

    /// The single inbound topic every tenant reads from
    pub spec_topic: String,
    /// Status topic name, or a prefix pattern containing `*`
    pub status_topic_template: String,
    pub topic_partitions: i32,
    pub topic_replicas: i32,

    /// Broker and zookeeper replica counts
    pub kafka_replicas: i32,
    pub zookeeper_replicas: i32,
    pub storage_size: String,
    pub storage_class: Option<String>,

    /// Secret holding the client certificate handed to tenants
    pub client_cert_secret: String,

    /// Fine-grained retry loop around resource application
    pub apply_interval: Duration,
    pub apply_timeout: Duration,
    /// Coarse wait for overall cluster readiness
    pub ready_interval: Duration,
    pub ready_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            namespace: "meshbus".to_string(),
            sub_name: DEFAULT_SUB_NAME.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            catalog_source: DEFAULT_CATALOG_SOURCE.to_string(),
            catalog_source_namespace: DEFAULT_CATALOG_SOURCE_NAMESPACE.to_string(),
            starting_csv: None,
            wait_ready: true,
            enable_tls: true,
            shared_topics: false,
            spec_topic: "spec".to_string(),
            status_topic_template: "status.*".to_string(),
            topic_partitions: DEFAULT_TOPIC_PARTITIONS,
            topic_replicas: DEFAULT_TOPIC_REPLICAS,
            kafka_replicas: 3,
            zookeeper_replicas: 3,
            storage_size: DEFAULT_STORAGE_SIZE.to_string(),
            storage_class: None,
            client_cert_secret: "meshbus-agent-certs".to_string(),
            apply_interval: Duration::from_secs(2),
            apply_timeout: Duration::from_secs(30),
            ready_interval: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(600),
        }
    }
}

impl TransportConfig {
    /// Derive the per-hub configuration from a `MessageHub` object.
    pub fn for_hub(hub: &MessageHub) -> Self {
        let mut config = Self::default();
        if let Some(namespace) = hub.namespace() {
            config.namespace = namespace;
        }
        if hub.spec.availability == AvailabilityMode::Basic {
            config.topic_replicas = 1;
        }
        if let Some(size) = &hub.spec.storage_size {
            config.storage_size = size.clone();
        }
        config.storage_class = hub.spec.storage_class.clone();
        config
    }

    /// Switch the subscription to the community install profile.
    pub fn community(mut self) -> Self {
        self.channel = COMMUNITY_CHANNEL.to_string();
        self.package_name = COMMUNITY_PACKAGE_NAME.to_string();
        self.catalog_source = COMMUNITY_CATALOG_SOURCE.to_string();
        self
    }

    /// Reject configurations that would break topic-naming invariants.
    pub fn validate(&self) -> Result<()> {
        if self.spec_topic.is_empty() || self.status_topic_template.is_empty() {
            return Err(OperatorError::Configuration(
                "spec topic and status topic template must not be empty".to_string(),
            ));
        }
        if self.spec_topic == self.status_topic_template {
            return Err(OperatorError::Configuration(format!(
                "status topic template {:?} collides with the spec topic",
                self.status_topic_template
            )));
        }
        if self.shared_topics
            && self
                .status_topic_template
                .contains(crate::policy::TOPIC_WILDCARD)
        {
            return Err(OperatorError::Configuration(format!(
                "shared topics need a literal status topic, template {:?} is per tenant",
                self.status_topic_template
            )));
        }
        if self.topic_partitions < 1 || self.topic_replicas < 1 {
            return Err(OperatorError::Configuration(
                "topic partitions and replicas must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
