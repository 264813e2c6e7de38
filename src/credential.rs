//! Connection credential resolution
//!
//! Extracts connection facts from a ready cluster's published status. The
//! readiness gate comes first: listener fields are only defined once the
//! broker operator reports Ready, so nothing here reads them before that
//! check passes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::config::TransportConfig;
use crate::crd::Kafka;
use crate::error::{OperatorError, Result};
use crate::policy::{self, TopicNaming};
use crate::store::ObjectStore;

/// Reference to one key of a Kubernetes secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// Everything a tenant needs to connect. Constructed whole or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnCredential {
    pub cluster_id: String,
    pub bootstrap_server: String,
    /// Cluster CA certificate, base64 encoded
    pub ca_cert: String,
    /// Secret holding the cluster CA, for callers that mount it instead
    pub ca_secret_name: String,
    pub client_cert_secret: SecretKeyRef,
    pub client_key_secret: SecretKeyRef,
    pub spec_topic: String,
    pub status_topic: String,
}

/// Connection facts published by the cluster itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConnection {
    pub cluster_id: String,
    pub bootstrap_server: String,
    pub ca_cert: String,
}

/// Name of the secret the broker operator stores the cluster CA in.
pub fn cluster_ca_secret_name(cluster_name: &str) -> String {
    format!("{}-cluster-ca-cert", cluster_name)
}

/// Index of the TLS route listener in the fixed two-listener layout.
const TLS_LISTENER: usize = 1;

pub struct CredentialResolver<'a, S> {
    store: &'a S,
    config: &'a TransportConfig,
}

impl<'a, S: ObjectStore> CredentialResolver<'a, S> {
    pub fn new(store: &'a S, config: &'a TransportConfig) -> Self {
        Self { store, config }
    }

    /// Resolve the full credential for one tenant.
    pub async fn resolve(&self, tenant: &str) -> Result<ConnCredential> {
        let connection = self.resolve_cluster().await?;
        let naming = TopicNaming::from_config(self.config);
        let topics = policy::topic_pair(&naming, tenant);

        Ok(ConnCredential {
            cluster_id: connection.cluster_id,
            bootstrap_server: connection.bootstrap_server,
            ca_cert: connection.ca_cert,
            ca_secret_name: cluster_ca_secret_name(&self.config.cluster_name),
            client_cert_secret: SecretKeyRef {
                name: self.config.client_cert_secret.clone(),
                key: "tls.crt".to_string(),
            },
            client_key_secret: SecretKeyRef {
                name: self.config.client_cert_secret.clone(),
                key: "tls.key".to_string(),
            },
            spec_topic: topics.spec_topic,
            status_topic: topics.status_topic,
        })
    }

    /// Read the cluster's published connection facts, gated on readiness.
    pub async fn resolve_cluster(&self) -> Result<ClusterConnection> {
        let kafka: Kafka = self
            .store
            .get(&self.config.namespace, &self.config.cluster_name)
            .await?;

        let status = match kafka.status.as_ref() {
            Some(status) if kafka.is_ready() => status,
            _ => {
                return Err(OperatorError::NotReady(format!(
                    "kafka cluster {}/{} has not reported Ready",
                    self.config.namespace, self.config.cluster_name
                )))
            }
        };

        // Ready without listener data is an inconsistent status; surfaced as
        // a hard error, the caller owns any retry policy.
        let listener = status
            .listeners
            .as_ref()
            .and_then(|listeners| listeners.get(TLS_LISTENER))
            .ok_or_else(|| {
                OperatorError::NotFound(format!(
                    "kafka cluster {} is Ready but has no TLS listener status",
                    self.config.cluster_name
                ))
            })?;

        let bootstrap_server = listener.bootstrap_servers.clone().ok_or_else(|| {
            OperatorError::NotFound(format!(
                "kafka cluster {} listener has no bootstrap address",
                self.config.cluster_name
            ))
        })?;

        let ca_cert = listener
            .certificates
            .as_ref()
            .and_then(|certs| certs.first())
            .map(|cert| BASE64.encode(cert.as_bytes()))
            .unwrap_or_default();

        // A server-assigned cluster id wins; the object uid is the stable
        // fallback for clusters that have not published one.
        let cluster_id = status
            .cluster_id
            .clone()
            .or_else(|| kafka.metadata.uid.clone())
            .ok_or_else(|| {
                OperatorError::Malformed(format!(
                    "kafka cluster {} has neither a cluster id nor a uid",
                    self.config.cluster_name
                ))
            })?;

        Ok(ClusterConnection {
            cluster_id,
            bootstrap_server,
            ca_cert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{KafkaCondition, KafkaStatus, ListenerStatus};
    use crate::store::MemoryStore;

    fn cluster_with_status(status: Option<KafkaStatus>) -> Kafka {
        let spec = serde_json::from_value(serde_json::json!({
            "kafka": {
                "replicas": 3,
                "listeners": [],
                "storage": {"type": "jbod"}
            },
            "zookeeper": {
                "replicas": 3,
                "storage": {"type": "persistent-claim", "size": "10Gi", "deleteClaim": false}
            }
        }))
        .unwrap();
        let mut kafka = Kafka::new("kafka", spec);
        kafka.metadata.namespace = Some("meshbus".to_string());
        kafka.metadata.uid = Some("cluster-uid".to_string());
        kafka.status = status;
        kafka
    }

    fn ready_status(cluster_id: Option<&str>, listeners: Option<Vec<ListenerStatus>>) -> KafkaStatus {
        KafkaStatus {
            conditions: Some(vec![KafkaCondition {
                r#type: Some("Ready".to_string()),
                status: Some("True".to_string()),
                ..Default::default()
            }]),
            listeners,
            cluster_id: cluster_id.map(str::to_string),
            ..Default::default()
        }
    }

    fn two_listeners() -> Vec<ListenerStatus> {
        vec![
            ListenerStatus {
                name: Some("plain".to_string()),
                bootstrap_servers: Some("kafka-bootstrap.meshbus.svc:9092".to_string()),
                certificates: None,
            },
            ListenerStatus {
                name: Some("tls".to_string()),
                bootstrap_servers: Some("kafka-route.apps.example.com:443".to_string()),
                certificates: Some(vec!["-----BEGIN CERTIFICATE-----".to_string()]),
            },
        ]
    }

    async fn resolve(status: Option<KafkaStatus>) -> Result<ConnCredential> {
        let store = MemoryStore::new();
        store.put(&cluster_with_status(status)).await;
        let config = TransportConfig::default();
        CredentialResolver::new(&store, &config)
            .resolve("cluster-a")
            .await
    }

    #[tokio::test]
    async fn test_no_status_is_not_ready() {
        let err = resolve(None).await.unwrap_err();
        assert!(matches!(err, OperatorError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_no_conditions_is_not_ready() {
        let err = resolve(Some(KafkaStatus::default())).await.unwrap_err();
        assert!(matches!(err, OperatorError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_false_ready_condition_is_not_ready() {
        let status = KafkaStatus {
            conditions: Some(vec![KafkaCondition {
                r#type: Some("Ready".to_string()),
                status: Some("False".to_string()),
                ..Default::default()
            }]),
            // Listener data present, but the gate must fire first.
            listeners: Some(two_listeners()),
            ..Default::default()
        };
        let err = resolve(Some(status)).await.unwrap_err();
        assert!(matches!(err, OperatorError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_ready_without_listeners_is_hard_error() {
        let err = resolve(Some(ready_status(Some("id"), None)))
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolves_full_credential() {
        let credential = resolve(Some(ready_status(Some("the-cluster-id"), Some(two_listeners()))))
            .await
            .unwrap();
        assert_eq!(credential.cluster_id, "the-cluster-id");
        assert_eq!(
            credential.bootstrap_server,
            "kafka-route.apps.example.com:443"
        );
        assert_eq!(
            credential.ca_cert,
            BASE64.encode("-----BEGIN CERTIFICATE-----")
        );
        assert_eq!(credential.ca_secret_name, "kafka-cluster-ca-cert");
        assert_eq!(credential.client_cert_secret.key, "tls.crt");
        assert_eq!(credential.client_key_secret.key, "tls.key");
        assert_eq!(credential.spec_topic, "spec");
        assert_eq!(credential.status_topic, "status.cluster-a");
    }

    #[tokio::test]
    async fn test_cluster_id_falls_back_to_uid() {
        let credential = resolve(Some(ready_status(None, Some(two_listeners()))))
            .await
            .unwrap();
        assert_eq!(credential.cluster_id, "cluster-uid");
    }

    #[tokio::test]
    async fn test_absent_cluster_propagates_store_error() {
        let store = MemoryStore::new();
        let config = TransportConfig::default();
        let err = CredentialResolver::new(&store, &config)
            .resolve("cluster-a")
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Store(_)));
    }
}
