//! Resource definitions handled by the MeshBus transport operator
//!
//! - `MessageHub`: the owning deployment, defined by this operator
//! - `Kafka`, `KafkaTopic`, `KafkaUser`: broker-operator resources we
//!   provision and keep converged
//! - `Subscription`: OLM installation of the broker operator
//! - `PodMonitor`: metrics scrape object, managed when metrics are enabled

mod common;
mod hub;
mod kafka;
mod monitoring;
mod subscription;
mod topic;
mod user;

pub use common::{ResourceList, ResourceRequirements, Toleration};
pub use hub::{
    AvailabilityMode, HubCondition, HubPhase, MessageHub, MessageHubSpec, MessageHubStatus,
};
pub use kafka::{
    BrokerAuthorization, BrokerSpec, ComponentTemplate, EntityOperatorSpec, Kafka, KafkaCondition,
    KafkaListener, KafkaSpec, KafkaStatus, KafkaStorage, ListenerAuthentication, ListenerStatus,
    ListenerType, LocalObjectReference, MetricsConfig, MetricsConfigMapKeyRef, MetricsValueFrom,
    NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PodAffinity,
    PodTemplate, StorageVolume, ZookeeperSpec,
};
pub use monitoring::{LabelSelector, MetricsEndpoint, PodMonitor, PodMonitorSpec};
pub use subscription::{
    InstallPlanApproval, Subscription, SubscriptionConfig, SubscriptionSpec,
};
pub use topic::{KafkaTopic, KafkaTopicSpec, KafkaTopicStatus};
pub use user::{
    AclOperation, AclPatternType, AclResource, AclResourceType, AclRule, KafkaUser,
    KafkaUserSpec, KafkaUserStatus, UserAuthentication, UserAuthenticationType,
    UserAuthorization, UserAuthorizationType,
};
