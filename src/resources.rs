//! Typed builders for the provisioned objects
//!
//! Everything the pipeline ensures is constructed here from the transport
//! configuration and the owning hub. Placement, tolerations, image pull
//! secrets and metrics are applied by one typed function per concern, so
//! the non-destructive merge stays checkable instead of hiding behind
//! generic JSON patching.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use serde_json::json;

use crate::config::{TransportConfig, OPERATOR_KAFKA_USER};
use crate::crd::{
    AclPatternType, AclRule, BrokerAuthorization, BrokerSpec, ComponentTemplate,
    EntityOperatorSpec, InstallPlanApproval, Kafka, KafkaListener, KafkaSpec, KafkaStorage,
    KafkaTopic, KafkaTopicSpec, KafkaUser, KafkaUserSpec, LabelSelector, ListenerAuthentication,
    ListenerType, LocalObjectReference, MessageHub, MetricsConfig, MetricsConfigMapKeyRef,
    MetricsEndpoint, MetricsValueFrom, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, PodAffinity, PodMonitor, PodMonitorSpec, PodTemplate, StorageVolume,
    Subscription, SubscriptionConfig, SubscriptionSpec, Toleration, UserAuthentication,
    UserAuthenticationType, UserAuthorization, UserAuthorizationType, ZookeeperSpec,
};
use crate::policy;

/// Label marking every object this operator owns
pub const OWNER_LABEL_KEY: &str = "meshbus.io/managed-by";
pub const OWNER_LABEL_VALUE: &str = "meshbus-operator";

/// Label the broker operator requires on topics and users
pub const CLUSTER_LABEL: &str = "strimzi.io/cluster";

/// Annotation suppressing further patches of an existing cluster object.
/// Operational escape hatch for environments where a patched cluster takes
/// too long to roll.
pub const SKIP_PATCH_ANNOTATION: &str = "meshbus.io/skip-patch-if-exist";

pub const METRICS_CONFIGMAP_NAME: &str = "kafka-metrics";
pub const KAFKA_METRICS_KEY: &str = "kafka-metrics-config.yml";
pub const ZOOKEEPER_METRICS_KEY: &str = "zookeeper-metrics-config.yml";
pub const POD_MONITOR_NAME: &str = "kafka-pod-monitor";

const KAFKA_VERSION: &str = "3.7.0";
const STORAGE_VOLUME_ID: i32 = 0;

/// Controller owner reference pointing at the hub, so deleting the hub
/// garbage-collects everything provisioned for it.
pub fn owner_reference(hub: &MessageHub) -> OwnerReference {
    OwnerReference {
        api_version: MessageHub::api_version(&()).to_string(),
        kind: MessageHub::kind(&()).to_string(),
        name: hub.name_any(),
        uid: hub.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

pub fn owner_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(OWNER_LABEL_KEY.to_string(), OWNER_LABEL_VALUE.to_string());
    labels
}

fn broker_resource_labels(config: &TransportConfig) -> BTreeMap<String, String> {
    let mut labels = owner_labels();
    // The broker operator ignores topics and users without this label.
    labels.insert(CLUSTER_LABEL.to_string(), config.cluster_name.clone());
    labels
}

fn owned_meta(
    name: &str,
    config: &TransportConfig,
    hub: &MessageHub,
    labels: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(config.namespace.clone()),
        labels: Some(labels),
        owner_references: Some(vec![owner_reference(hub)]),
        ..Default::default()
    }
}

/// Subscription installing the broker operator.
pub fn new_subscription(config: &TransportConfig, hub: &MessageHub) -> Subscription {
    let mut labels = owner_labels();
    labels.insert("installer.name".to_string(), hub.name_any());
    labels.insert(
        "installer.namespace".to_string(),
        hub.namespace().unwrap_or_default(),
    );

    let sub_config = if hub.spec.node_selector.is_empty() && hub.spec.tolerations.is_empty() {
        None
    } else {
        Some(SubscriptionConfig {
            node_selector: hub.spec.node_selector.clone(),
            tolerations: hub.spec.tolerations.clone(),
        })
    };

    let mut subscription = Subscription::new(
        &config.sub_name,
        SubscriptionSpec {
            channel: config.channel.clone(),
            name: config.package_name.clone(),
            source: config.catalog_source.clone(),
            source_namespace: config.catalog_source_namespace.clone(),
            install_plan_approval: Some(InstallPlanApproval::Automatic),
            starting_csv: config.starting_csv.clone(),
            config: sub_config,
            extra: BTreeMap::new(),
        },
    );
    subscription.metadata.namespace = Some(config.namespace.clone());
    subscription.metadata.labels = Some(labels);
    subscription
}

/// The desired Kafka cluster object.
pub fn new_kafka_cluster(config: &TransportConfig, hub: &MessageHub) -> Kafka {
    let broker_config: BTreeMap<String, serde_json::Value> = [
        ("default.replication.factor", json!(3)),
        ("inter.broker.protocol.version", json!("3.7")),
        ("min.insync.replicas", json!(2)),
        ("offsets.topic.replication.factor", json!(3)),
        ("transaction.state.log.min.isr", json!(2)),
        ("transaction.state.log.replication.factor", json!(3)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut spec = KafkaSpec {
        kafka: BrokerSpec {
            version: Some(KAFKA_VERSION.to_string()),
            replicas: config.kafka_replicas,
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
                    tls: config.enable_tls,
                    r#type: ListenerType::Route,
                    authentication: Some(ListenerAuthentication {
                        r#type: "tls".to_string(),
                    }),
                },
            ],
            config: broker_config,
            storage: KafkaStorage {
                r#type: "jbod".to_string(),
                volumes: vec![StorageVolume {
                    id: Some(STORAGE_VOLUME_ID),
                    r#type: "persistent-claim".to_string(),
                    size: config.storage_size.clone(),
                    delete_claim: false,
                    class: config.storage_class.clone(),
                }],
            },
            resources: hub.spec.kafka_resources.clone(),
            authorization: Some(BrokerAuthorization {
                r#type: "simple".to_string(),
            }),
            metrics_config: None,
            template: None,
            extra: BTreeMap::new(),
        },
        zookeeper: ZookeeperSpec {
            replicas: config.zookeeper_replicas,
            storage: StorageVolume {
                id: None,
                r#type: "persistent-claim".to_string(),
                size: config.storage_size.clone(),
                delete_claim: false,
                class: config.storage_class.clone(),
            },
            resources: hub.spec.zookeeper_resources.clone(),
            metrics_config: None,
            template: None,
            extra: BTreeMap::new(),
        },
        entity_operator: Some(EntityOperatorSpec {
            topic_operator: Some(json!({})),
            user_operator: Some(json!({})),
            template: None,
            extra: BTreeMap::new(),
        }),
        extra: BTreeMap::new(),
    };

    apply_placement(&mut spec, &hub.spec.node_selector);
    apply_tolerations(&mut spec, &hub.spec.tolerations);
    if let Some(secret) = &hub.spec.image_pull_secret {
        apply_image_pull_secret(&mut spec, secret);
    }
    apply_metrics(&mut spec, hub.spec.enable_metrics);

    let mut kafka = Kafka::new(&config.cluster_name, spec);
    kafka.metadata = owned_meta(&config.cluster_name, config, hub, owner_labels());
    kafka
}

/// A transport topic with the fixed partition count, the configured replica
/// count and compaction cleanup.
pub fn new_kafka_topic(config: &TransportConfig, hub: &MessageHub, name: &str) -> KafkaTopic {
    let mut topic_config = BTreeMap::new();
    topic_config.insert("cleanup.policy".to_string(), json!("compact"));

    let mut topic = KafkaTopic::new(
        name,
        KafkaTopicSpec {
            partitions: Some(config.topic_partitions),
            replicas: Some(config.topic_replicas),
            config: topic_config,
            extra: BTreeMap::new(),
        },
    );
    topic.metadata = owned_meta(name, config, hub, broker_resource_labels(config));
    topic
}

/// A Kafka user with externally issued certificates and the given ACL set.
pub fn new_kafka_user(
    config: &TransportConfig,
    hub: &MessageHub,
    name: &str,
    acls: Vec<AclRule>,
) -> KafkaUser {
    let mut user = KafkaUser::new(
        name,
        KafkaUserSpec {
            authentication: UserAuthentication {
                r#type: UserAuthenticationType::TlsExternal,
            },
            authorization: Some(UserAuthorization {
                r#type: UserAuthorizationType::Simple,
                acls,
            }),
            extra: BTreeMap::new(),
        },
    );
    user.metadata = owned_meta(name, config, hub, broker_resource_labels(config));
    user
}

/// The operator's own access user: read and write everywhere, since it
/// fans spec messages out and collects status from every tenant topic.
pub fn new_operator_user(config: &TransportConfig, hub: &MessageHub) -> KafkaUser {
    let acls = vec![
        policy::consumer_group_read_acl(),
        policy::read_topic_acl("*", AclPatternType::Literal),
        policy::write_topic_acl("*", AclPatternType::Literal),
    ];
    new_kafka_user(config, hub, OPERATOR_KAFKA_USER, acls)
}

/// JMX exporter rules for brokers and zookeeper.
pub fn new_metrics_config_map(config: &TransportConfig, hub: &MessageHub) -> ConfigMap {
    let kafka_rules = r#"lowercaseOutputName: true
rules:
- pattern: kafka.server<type=(.+), name=(.+)><>Value
  name: kafka_server_$1_$2
  type: GAUGE
- pattern: kafka.server<type=(.+), name=(.+)PerSec\w*><>Count
  name: kafka_server_$1_$2_total
  type: COUNTER
"#;
    let zookeeper_rules = r#"lowercaseOutputName: true
rules:
- pattern: "org.apache.ZooKeeperService<name0=ReplicatedServer_id(\\d+)><>(\\w+)"
  name: zookeeper_$2
  type: GAUGE
"#;

    let mut data = BTreeMap::new();
    data.insert(KAFKA_METRICS_KEY.to_string(), kafka_rules.to_string());
    data.insert(
        ZOOKEEPER_METRICS_KEY.to_string(),
        zookeeper_rules.to_string(),
    );

    ConfigMap {
        metadata: owned_meta(METRICS_CONFIGMAP_NAME, config, hub, owner_labels()),
        data: Some(data),
        ..Default::default()
    }
}

/// Scrape target for the broker metrics port.
pub fn new_pod_monitor(config: &TransportConfig, hub: &MessageHub) -> PodMonitor {
    let mut match_labels = BTreeMap::new();
    match_labels.insert("strimzi.io/kind".to_string(), "Kafka".to_string());

    let mut monitor = PodMonitor::new(
        POD_MONITOR_NAME,
        PodMonitorSpec {
            selector: LabelSelector { match_labels },
            pod_metrics_endpoints: vec![MetricsEndpoint {
                port: Some("tcp-prometheus".to_string()),
                path: Some("/metrics".to_string()),
            }],
        },
    );
    monitor.metadata = owned_meta(POD_MONITOR_NAME, config, hub, owner_labels());
    monitor
}

// ---------------------------------------------------------------------------
// Per-concern appliers
// ---------------------------------------------------------------------------

/// Pin all transport pods to nodes matching the hub's node selector.
pub fn apply_placement(spec: &mut KafkaSpec, node_selector: &BTreeMap<String, String>) {
    if node_selector.is_empty() {
        return;
    }
    let requirements: Vec<NodeSelectorRequirement> = node_selector
        .iter()
        .map(|(key, value)| NodeSelectorRequirement {
            key: key.clone(),
            operator: "In".to_string(),
            values: vec![value.clone()],
        })
        .collect();
    let affinity = PodAffinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: requirements,
                }],
            },
        }),
    };
    for pod in component_pods(spec) {
        pod.affinity = Some(affinity.clone());
    }
}

/// Propagate the hub's tolerations to all transport pods.
pub fn apply_tolerations(spec: &mut KafkaSpec, tolerations: &[Toleration]) {
    if tolerations.is_empty() {
        return;
    }
    for pod in component_pods(spec) {
        pod.tolerations = tolerations.to_vec();
    }
}

/// Attach the hub's image pull secret to all transport pods.
pub fn apply_image_pull_secret(spec: &mut KafkaSpec, secret: &str) {
    let reference = LocalObjectReference {
        name: secret.to_string(),
    };
    for pod in component_pods(spec) {
        pod.image_pull_secrets = vec![reference.clone()];
    }
}

/// Point broker and zookeeper metrics at the exporter config map, or leave
/// metrics off entirely.
pub fn apply_metrics(spec: &mut KafkaSpec, enabled: bool) {
    if !enabled {
        spec.kafka.metrics_config = None;
        spec.zookeeper.metrics_config = None;
        return;
    }
    spec.kafka.metrics_config = Some(metrics_config(KAFKA_METRICS_KEY));
    spec.zookeeper.metrics_config = Some(metrics_config(ZOOKEEPER_METRICS_KEY));
}

fn metrics_config(key: &str) -> MetricsConfig {
    MetricsConfig {
        r#type: "jmxPrometheusExporter".to_string(),
        value_from: MetricsValueFrom {
            config_map_key_ref: MetricsConfigMapKeyRef {
                name: METRICS_CONFIGMAP_NAME.to_string(),
                key: key.to_string(),
            },
        },
    }
}

/// Mutable access to the pod template of every transport component.
fn component_pods(spec: &mut KafkaSpec) -> Vec<&mut PodTemplate> {
    let mut pods = Vec::new();
    pods.push(
        spec.kafka
            .template
            .get_or_insert_with(ComponentTemplate::default)
            .pod
            .get_or_insert_with(PodTemplate::default),
    );
    pods.push(
        spec.zookeeper
            .template
            .get_or_insert_with(ComponentTemplate::default)
            .pod
            .get_or_insert_with(PodTemplate::default),
    );
    if let Some(entity_operator) = spec.entity_operator.as_mut() {
        pods.push(
            entity_operator
                .template
                .get_or_insert_with(ComponentTemplate::default)
                .pod
                .get_or_insert_with(PodTemplate::default),
        );
    }
    pods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::MessageHubSpec;

    fn test_hub() -> MessageHub {
        let mut hub = MessageHub::new("hub", serde_json::from_str::<MessageHubSpec>("{}").unwrap());
        hub.metadata.namespace = Some("meshbus".to_string());
        hub.metadata.uid = Some("hub-uid".to_string());
        hub
    }

    fn config() -> TransportConfig {
        TransportConfig::default()
    }

    #[test]
    fn test_cluster_has_fixed_two_listener_layout() {
        let kafka = new_kafka_cluster(&config(), &test_hub());
        let listeners = &kafka.spec.kafka.listeners;
        assert_eq!(listeners.len(), 2);
        assert_eq!(listeners[0].name, "plain");
        assert!(!listeners[0].tls);
        assert_eq!(listeners[0].r#type, ListenerType::Internal);
        assert_eq!(listeners[1].name, "tls");
        assert!(listeners[1].tls);
        assert_eq!(listeners[1].r#type, ListenerType::Route);
    }

    #[test]
    fn test_cluster_carries_owner_metadata() {
        let kafka = new_kafka_cluster(&config(), &test_hub());
        let labels = kafka.metadata.labels.as_ref().unwrap();
        assert_eq!(labels[OWNER_LABEL_KEY], OWNER_LABEL_VALUE);
        let owners = kafka.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners[0].kind, "MessageHub");
        assert_eq!(owners[0].uid, "hub-uid");
    }

    #[test]
    fn test_metrics_follow_hub_toggle() {
        let mut hub = test_hub();
        hub.spec.enable_metrics = true;
        let kafka = new_kafka_cluster(&config(), &hub);
        let metrics = kafka.spec.kafka.metrics_config.as_ref().unwrap();
        assert_eq!(metrics.value_from.config_map_key_ref.name, METRICS_CONFIGMAP_NAME);

        hub.spec.enable_metrics = false;
        let kafka = new_kafka_cluster(&config(), &hub);
        assert!(kafka.spec.kafka.metrics_config.is_none());
        assert!(kafka.spec.zookeeper.metrics_config.is_none());
    }

    #[test]
    fn test_placement_lands_on_every_component() {
        let mut hub = test_hub();
        hub.spec
            .node_selector
            .insert("kubernetes.io/arch".to_string(), "amd64".to_string());
        let kafka = new_kafka_cluster(&config(), &hub);

        for template in [
            kafka.spec.kafka.template.as_ref(),
            kafka.spec.zookeeper.template.as_ref(),
            kafka
                .spec
                .entity_operator
                .as_ref()
                .and_then(|e| e.template.as_ref()),
        ] {
            let pod = template.unwrap().pod.as_ref().unwrap();
            let affinity = pod.affinity.as_ref().unwrap();
            let terms = &affinity
                .node_affinity
                .as_ref()
                .unwrap()
                .required_during_scheduling_ignored_during_execution
                .node_selector_terms;
            assert_eq!(terms[0].match_expressions[0].key, "kubernetes.io/arch");
            assert_eq!(terms[0].match_expressions[0].values, vec!["amd64"]);
        }
    }

    #[test]
    fn test_image_pull_secret_applied() {
        let mut hub = test_hub();
        hub.spec.image_pull_secret = Some("registry-creds".to_string());
        let kafka = new_kafka_cluster(&config(), &hub);
        let pod = kafka.spec.kafka.template.unwrap().pod.unwrap();
        assert_eq!(pod.image_pull_secrets[0].name, "registry-creds");
    }

    #[test]
    fn test_no_placement_leaves_templates_empty() {
        let kafka = new_kafka_cluster(&config(), &test_hub());
        assert!(kafka.spec.kafka.template.is_none());
        assert!(kafka.spec.zookeeper.template.is_none());
    }

    #[test]
    fn test_topic_builder() {
        let topic = new_kafka_topic(&config(), &test_hub(), "status.cluster-a");
        assert_eq!(topic.spec.partitions, Some(1));
        assert_eq!(topic.spec.replicas, Some(3));
        assert_eq!(topic.spec.config["cleanup.policy"], "compact");
        let labels = topic.metadata.labels.as_ref().unwrap();
        assert_eq!(labels[CLUSTER_LABEL], "kafka");
    }

    #[test]
    fn test_user_builder_uses_external_tls() {
        let user = new_kafka_user(&config(), &test_hub(), "cluster-a-kafka-user", vec![]);
        assert_eq!(
            user.spec.authentication.r#type,
            UserAuthenticationType::TlsExternal
        );
        let labels = user.metadata.labels.as_ref().unwrap();
        assert_eq!(labels[CLUSTER_LABEL], "kafka");
    }

    #[test]
    fn test_operator_user_reads_and_writes_everywhere() {
        let user = new_operator_user(&config(), &test_hub());
        let acls = user.spec.authorization.as_ref().unwrap().acls.clone();
        assert_eq!(acls.len(), 3);
        assert_eq!(acls[1].resource.name, "*");
        assert_eq!(acls[2].resource.name, "*");
    }

    #[test]
    fn test_subscription_builder() {
        let subscription = new_subscription(&config(), &test_hub());
        assert_eq!(subscription.spec.channel, "amq-streams-2.7.x");
        assert_eq!(subscription.spec.name, "amq-streams");
        assert_eq!(
            subscription.spec.install_plan_approval,
            Some(InstallPlanApproval::Automatic)
        );
        assert!(subscription.spec.config.is_none());
    }

    #[test]
    fn test_subscription_forwards_scheduling() {
        let mut hub = test_hub();
        hub.spec
            .node_selector
            .insert("zone".to_string(), "a".to_string());
        let subscription = new_subscription(&config(), &hub);
        let sub_config = subscription.spec.config.unwrap();
        assert_eq!(sub_config.node_selector["zone"], "a");
    }

    #[test]
    fn test_metrics_config_map_has_both_keys() {
        let cm = new_metrics_config_map(&config(), &test_hub());
        let data = cm.data.unwrap();
        assert!(data.contains_key(KAFKA_METRICS_KEY));
        assert!(data.contains_key(ZOOKEEPER_METRICS_KEY));
    }
}
