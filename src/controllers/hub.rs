//! MessageHub Controller
//!
//! Reconciles MessageHub custom resources: drives the transport pipeline,
//! provisions topics and users for every declared tenant, prunes tenants
//! that were removed, and publishes connection facts into the status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::conditions::{
    build_condition, set_condition, CONDITION_FALSE, CONDITION_TRUE, HUB_CONDITION_KAFKA_READY,
    HUB_CONDITION_READY, HUB_CONDITION_TENANTS_READY, HUB_FINALIZER,
};
use crate::config::TransportConfig;
use crate::controllers::error_policy_backoff;
use crate::crd::{HubCondition, HubPhase, MessageHub, MessageHubStatus};
use crate::error::{OperatorError, Result};
use crate::provisioner::KafkaProvisioner;
use crate::store::KubeStore;

/// Context for the hub controller
pub struct HubController {
    client: Client,
    cancel: CancellationToken,
}

impl HubController {
    pub fn new(client: Client, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// Run the hub controller until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let hubs: Api<MessageHub> = Api::all(self.client.clone());

        info!("Starting MessageHub controller");

        Controller::new(hubs, Config::default())
            .shutdown_on_signal()
            .run(
                |hub, ctx| async move { ctx.reconcile(hub).await },
                |hub, err, ctx| {
                    error!("Reconciliation error: {:?}", err);
                    error_policy_backoff(hub, err, ctx)
                },
                Arc::clone(&self),
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => {
                        info!("Reconciled hub: {}", obj.name);
                    }
                    Err(err) => {
                        error!("Reconciliation failed: {:?}", err);
                    }
                }
            })
            .await;

        Ok(())
    }

    /// Reconcile one MessageHub
    async fn reconcile(&self, hub: Arc<MessageHub>) -> std::result::Result<Action, OperatorError> {
        let name = hub.name_any();
        let namespace = hub.namespace().unwrap_or_else(|| "default".to_string());

        info!("Reconciling MessageHub {}/{}", namespace, name);

        if hub.metadata.deletion_timestamp.is_some() {
            return self.handle_deletion(&hub, &namespace).await;
        }

        self.ensure_finalizer(&hub, &namespace).await?;

        let config = TransportConfig::for_hub(&hub);
        let provisioner = KafkaProvisioner::new(
            KubeStore::new(self.client.clone()),
            config,
            (*hub).clone(),
        )?
        .with_cancellation(self.cancel.clone());

        match provisioner.ensure_kafka().await {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("Transport not converged for hub {}: {}", name, err);
                self.update_status_provisioning(&hub, &namespace, &err.to_string())
                    .await?;
                return Ok(Action::requeue(Duration::from_secs(30)));
            }
        }

        let mut provisioned = Vec::new();
        for tenant in &hub.spec.tenants {
            let result = async {
                provisioner.ensure_topic(tenant).await?;
                provisioner.ensure_user(tenant).await
            }
            .await;
            match result {
                Ok(_) => provisioned.push(tenant.clone()),
                Err(err) => {
                    error!("Failed to provision tenant {}: {}", tenant, err);
                    self.update_status_error(&hub, &namespace, &err.to_string())
                        .await?;
                    return Ok(Action::requeue(Duration::from_secs(30)));
                }
            }
        }

        // Tenants dropped from the spec lose their access credential.
        let previous = hub
            .status
            .as_ref()
            .map(|status| status.provisioned_tenants.clone())
            .unwrap_or_default();
        for tenant in previous.iter().filter(|t| !hub.spec.tenants.contains(t)) {
            provisioner.prune(tenant).await?;
        }

        let connection = match provisioner.cluster_connection().await {
            Ok(connection) => connection,
            Err(OperatorError::NotReady(msg)) => {
                self.update_status_provisioning(&hub, &namespace, &msg).await?;
                return Ok(Action::requeue(Duration::from_secs(10)));
            }
            Err(err) => return Err(err),
        };

        self.update_status_ready(&hub, &namespace, provisioned, connection)
            .await?;

        Ok(Action::requeue(Duration::from_secs(60)))
    }

    /// Ensure the finalizer is present on the resource
    async fn ensure_finalizer(&self, hub: &MessageHub, namespace: &str) -> Result<()> {
        let finalizers = hub.metadata.finalizers.as_deref().unwrap_or_default();
        if finalizers.contains(&HUB_FINALIZER.to_string()) {
            return Ok(());
        }

        let hubs: Api<MessageHub> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": [HUB_FINALIZER]
            }
        });
        hubs.patch(
            &hub.name_any(),
            &PatchParams::apply("meshbus-operator").force(),
            &Patch::Apply(&patch),
        )
        .await?;

        Ok(())
    }

    /// Handle deletion: prune every tenant credential, then remove the
    /// finalizer. The cluster and its topics are garbage-collected through
    /// their owner references.
    async fn handle_deletion(
        &self,
        hub: &MessageHub,
        namespace: &str,
    ) -> std::result::Result<Action, OperatorError> {
        let name = hub.name_any();
        info!("Handling deletion of MessageHub {}/{}", namespace, name);

        let config = TransportConfig::for_hub(hub);
        let provisioner = KafkaProvisioner::new(
            KubeStore::new(self.client.clone()),
            config,
            hub.clone(),
        )?;

        provisioner.prune_all().await?;

        let hubs: Api<MessageHub> = Api::namespaced(self.client.clone(), namespace);
        let finalizers: Vec<String> = hub
            .metadata
            .finalizers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|f| f.as_str() != HUB_FINALIZER)
            .cloned()
            .collect();

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        hubs.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        info!("Finalizer removed for MessageHub {}/{}", namespace, name);
        Ok(Action::await_change())
    }

    async fn update_status_ready(
        &self,
        hub: &MessageHub,
        namespace: &str,
        provisioned: Vec<String>,
        connection: crate::credential::ClusterConnection,
    ) -> Result<()> {
        let mut conditions = existing_conditions(hub);
        set_condition(
            &mut conditions,
            build_condition(
                HUB_CONDITION_KAFKA_READY,
                CONDITION_TRUE,
                "ClusterReady",
                "kafka cluster reports Ready",
            ),
        );
        set_condition(
            &mut conditions,
            build_condition(
                HUB_CONDITION_TENANTS_READY,
                CONDITION_TRUE,
                "TenantsProvisioned",
                &format!("{} tenant(s) provisioned", provisioned.len()),
            ),
        );
        set_condition(
            &mut conditions,
            build_condition(
                HUB_CONDITION_READY,
                CONDITION_TRUE,
                "TransportReady",
                "transport is ready",
            ),
        );

        let status = MessageHubStatus {
            phase: HubPhase::Ready,
            provisioned_tenants: provisioned,
            bootstrap_server: Some(connection.bootstrap_server),
            cluster_id: Some(connection.cluster_id),
            conditions,
            observed_generation: hub.metadata.generation,
            last_updated: Some(Utc::now().to_rfc3339()),
        };
        self.patch_status(hub, namespace, status).await
    }

    async fn update_status_provisioning(
        &self,
        hub: &MessageHub,
        namespace: &str,
        message: &str,
    ) -> Result<()> {
        let mut conditions = existing_conditions(hub);
        set_condition(
            &mut conditions,
            build_condition(
                HUB_CONDITION_KAFKA_READY,
                CONDITION_FALSE,
                "Provisioning",
                message,
            ),
        );
        set_condition(
            &mut conditions,
            build_condition(
                HUB_CONDITION_READY,
                CONDITION_FALSE,
                "Provisioning",
                "transport is still converging",
            ),
        );

        let status = MessageHubStatus {
            phase: HubPhase::Provisioning,
            provisioned_tenants: hub
                .status
                .as_ref()
                .map(|s| s.provisioned_tenants.clone())
                .unwrap_or_default(),
            bootstrap_server: None,
            cluster_id: None,
            conditions,
            observed_generation: hub.metadata.generation,
            last_updated: Some(Utc::now().to_rfc3339()),
        };
        self.patch_status(hub, namespace, status).await
    }

    async fn update_status_error(
        &self,
        hub: &MessageHub,
        namespace: &str,
        message: &str,
    ) -> Result<()> {
        let mut conditions = existing_conditions(hub);
        set_condition(
            &mut conditions,
            build_condition(
                HUB_CONDITION_TENANTS_READY,
                CONDITION_FALSE,
                "ProvisioningFailed",
                message,
            ),
        );
        set_condition(
            &mut conditions,
            build_condition(HUB_CONDITION_READY, CONDITION_FALSE, "Error", message),
        );

        let status = MessageHubStatus {
            phase: HubPhase::Failed,
            provisioned_tenants: hub
                .status
                .as_ref()
                .map(|s| s.provisioned_tenants.clone())
                .unwrap_or_default(),
            bootstrap_server: None,
            cluster_id: None,
            conditions,
            observed_generation: hub.metadata.generation,
            last_updated: Some(Utc::now().to_rfc3339()),
        };
        self.patch_status(hub, namespace, status).await
    }

    async fn patch_status(
        &self,
        hub: &MessageHub,
        namespace: &str,
        status: MessageHubStatus,
    ) -> Result<()> {
        let hubs: Api<MessageHub> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        hubs.patch_status(&hub.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

fn existing_conditions(hub: &MessageHub) -> Vec<HubCondition> {
    hub.status
        .as_ref()
        .map(|status| status.conditions.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_hub_controller() {
        // Controller tests require a k8s cluster; the provisioning logic is
        // covered against the in-memory store in the provisioner module.
    }
}
