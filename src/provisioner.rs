//! Kafka transport provisioner
//!
//! The surface the hub controller talks to: one idempotent `ensure_kafka`
//! driving the full pipeline, plus the tenant-scoped operations. Tenant
//! operations are independent of each other and safe to run concurrently
//! for different tenants sharing the cluster; the only shared object, the
//! spec topic, is created idempotently and updated through the semantic
//! equality check, so concurrent tenants never fight over it.

use std::sync::atomic::{AtomicBool, Ordering};

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::TransportConfig;
use crate::credential::{ClusterConnection, ConnCredential, CredentialResolver};
use crate::crd::{KafkaUser, MessageHub};
use crate::error::Result;
use crate::pipeline::{ensure_transport_topic, ProvisioningPipeline};
use crate::policy::{self, TopicNaming, TopicPair};
use crate::prune::prune_tenant;
use crate::reconcile::MergeReconciler;
use crate::resources;
use crate::store::ObjectStore;

/// Provisions and keeps converged the Kafka transport of one hub.
pub struct KafkaProvisioner<S> {
    store: S,
    config: TransportConfig,
    hub: MessageHub,
    cancel: CancellationToken,
    tls_enabled: AtomicBool,
}

impl<S: ObjectStore> KafkaProvisioner<S> {
    /// Build a provisioner for one hub. Fails on invalid configuration.
    pub fn new(store: S, config: TransportConfig, hub: MessageHub) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tls_enabled: AtomicBool::new(config.enable_tls),
            store,
            config,
            hub,
            cancel: CancellationToken::new(),
        })
    }

    /// Attach an external cancellation signal; blocking waits abort when it
    /// fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// TLS state of the live listeners, observed during the last readiness
    /// wait.
    pub fn tls_enabled(&self) -> bool {
        self.tls_enabled.load(Ordering::Relaxed)
    }

    /// Drive the full provisioning pipeline. Idempotent: a second call
    /// against a converged deployment performs no writes.
    pub async fn ensure_kafka(&self) -> Result<()> {
        let pipeline =
            ProvisioningPipeline::new(&self.store, &self.config, &self.hub, &self.cancel);
        let report = pipeline.run().await?;
        self.tls_enabled.store(report.tls_enabled, Ordering::Relaxed);
        Ok(())
    }

    /// Ensure the tenant's access credential object and return its identity
    /// name.
    pub async fn ensure_user(&self, tenant: &str) -> Result<String> {
        let naming = TopicNaming::from_config(&self.config);
        let acls = policy::access_policy(&naming, tenant);
        let user_name = policy::tenant_user_name(tenant);
        let desired = resources::new_kafka_user(&self.config, &self.hub, &user_name, acls);

        let outcome = MergeReconciler::new(&self.store).ensure(&desired).await?;
        if outcome.changed() {
            info!(tenant, user = %user_name, ?outcome, "reconciled kafka user");
        }
        Ok(user_name)
    }

    /// Ensure both of the tenant's topics and return the pair.
    pub async fn ensure_topic(&self, tenant: &str) -> Result<TopicPair> {
        let naming = TopicNaming::from_config(&self.config);
        let pair = policy::topic_pair(&naming, tenant);

        for name in [&pair.spec_topic, &pair.status_topic] {
            ensure_transport_topic(&self.store, &self.config, &self.hub, name).await?;
        }
        Ok(pair)
    }

    /// Resolve the tenant's connection credential from the ready cluster.
    pub async fn conn_credential(&self, tenant: &str) -> Result<ConnCredential> {
        CredentialResolver::new(&self.store, &self.config)
            .resolve(tenant)
            .await
    }

    /// Connection facts of the cluster itself, without tenant scoping.
    pub async fn cluster_connection(&self) -> Result<ClusterConnection> {
        CredentialResolver::new(&self.store, &self.config)
            .resolve_cluster()
            .await
    }

    /// Remove the tenant's access credential object. Shared topics stay.
    pub async fn prune(&self, tenant: &str) -> Result<()> {
        prune_tenant(&self.store, &self.config, tenant).await
    }

    /// Remove every access credential this operator owns in the transport
    /// namespace. Teardown path: the cluster and its topics disappear with
    /// the hub through their owner references.
    pub async fn prune_all(&self) -> Result<()> {
        let users: Vec<KafkaUser> = self.store.list(&self.config.namespace).await?;
        for user in users {
            let owned = user.labels().get(resources::OWNER_LABEL_KEY).map(String::as_str)
                == Some(resources::OWNER_LABEL_VALUE);
            if !owned {
                continue;
            }
            let name = user.name_any();
            match self
                .store
                .delete::<KafkaUser>(&self.config.namespace, &name)
                .await
            {
                Ok(()) => info!(user = %name, "pruned kafka user"),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Name of the owning hub, mainly for logging.
    pub fn hub_name(&self) -> String {
        self.hub.name_any()
    }
}
