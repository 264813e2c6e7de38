//! MeshBus Transport Operator
//!
//! Provisions and keeps converged the multi-tenant Kafka transport of a
//! MeshBus hub: the broker cluster, per-tenant topics, consumer-group
//! access and credential material, all declared through a `MessageHub`
//! custom resource.
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: meshbus.io/v1alpha1
//! kind: MessageHub
//! metadata:
//!   name: hub
//! spec:
//!   availability: High
//!   tenants:
//!     - cluster-a
//!     - cluster-b
//! ```
//!
//! The engine is built from four pieces: a merge-based ensure primitive
//! that never clobbers fields it does not own, a bounded readiness poller,
//! a deterministic per-tenant access-policy builder, and a credential
//! resolver gated on the cluster's Ready condition.

pub mod conditions;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod credential;
pub mod error;
pub mod leader_election;
pub mod pipeline;
pub mod policy;
pub mod provisioner;
pub mod prune;
pub mod reconcile;
pub mod resources;
pub mod store;

pub use config::TransportConfig;
pub use credential::{ClusterConnection, ConnCredential, SecretKeyRef};
pub use crd::{Kafka, KafkaTopic, KafkaUser, MessageHub, MessageHubSpec, MessageHubStatus};
pub use error::{OperatorError, Result, StoreError};
pub use pipeline::{PipelineReport, ProvisioningPipeline, ProvisioningStage};
pub use policy::{TopicNaming, TopicPair};
pub use provisioner::KafkaProvisioner;
pub use reconcile::{EnsureOutcome, MergeReconciler, Poller};
pub use store::{KubeStore, MemoryStore, ObjectStore, StoreResource};
