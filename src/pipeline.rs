//! Staged provisioning pipeline
//!
//! Drives the transport from nothing to a ready cluster in strict order:
//! installation subscription, capability probe, cluster object, dependent
//! resources, readiness wait. Every stage goes through the merge-based
//! ensure primitive, so re-running the pipeline against a converged
//! deployment writes nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::crd::{Kafka, KafkaTopic, MessageHub, PodMonitor, Subscription};
use crate::error::{OperatorError, Result};
use crate::policy::TopicNaming;
use crate::reconcile::{EnsureOutcome, MergeReconciler, Poller};
use crate::resources;
use crate::store::ObjectStore;

/// Stage labels for logging and error context. The pipeline moves through
/// them strictly in order; `Aborted` is reached only when the owning hub is
/// found mid-wait with a deletion timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStage {
    SubscriptionPending,
    CapabilityPending,
    ClusterApplying,
    DependentResourcesApplying,
    AwaitingReady,
    Ready,
    Aborted,
}

impl fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProvisioningStage::SubscriptionPending => "subscription-pending",
            ProvisioningStage::CapabilityPending => "capability-pending",
            ProvisioningStage::ClusterApplying => "cluster-applying",
            ProvisioningStage::DependentResourcesApplying => "dependent-resources-applying",
            ProvisioningStage::AwaitingReady => "awaiting-ready",
            ProvisioningStage::Ready => "ready",
            ProvisioningStage::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Facts observed while the pipeline ran.
#[derive(Debug, Clone, Copy)]
pub struct PipelineReport {
    /// Whether the live listeners actually carry TLS
    pub tls_enabled: bool,
}

/// One pipeline run over one hub. Re-entrant: safe to construct and run
/// again on every reconcile pass.
pub struct ProvisioningPipeline<'a, S> {
    store: &'a S,
    config: &'a TransportConfig,
    hub: &'a MessageHub,
    cancel: &'a CancellationToken,
}

impl<'a, S: ObjectStore> ProvisioningPipeline<'a, S> {
    pub fn new(
        store: &'a S,
        config: &'a TransportConfig,
        hub: &'a MessageHub,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            config,
            hub,
            cancel,
        }
    }

    pub async fn run(&self) -> Result<PipelineReport> {
        info!(stage = %ProvisioningStage::SubscriptionPending, "reconciling transport installation");
        self.ensure_subscription().await?;

        // Stages 2 to 4 share one bounded loop: the capability probe and the
        // resource application both retry until everything lands or the
        // fine-grained budget runs out. The probe state is re-derived on
        // every run instead of living in a process-global flag.
        let apply = Poller::new(self.config.apply_interval, self.config.apply_timeout);
        let this = self;
        apply
            .wait_until(self.cancel, "kafka resources applied", move || async move {
                match this.store.kind_registered::<Kafka>().await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(stage = %ProvisioningStage::CapabilityPending, "kafka resource kinds not registered yet");
                        return Ok(false);
                    }
                    Err(err) => {
                        debug!(stage = %ProvisioningStage::CapabilityPending, error = %err, "capability probe failed, retrying");
                        return Ok(false);
                    }
                }
                if let Err(err) = this.ensure_cluster().await {
                    if err.is_fatal() {
                        return Err(err);
                    }
                    info!(stage = %ProvisioningStage::ClusterApplying, error = %err, "kafka cluster not applied yet, retrying");
                    return Ok(false);
                }
                if let Err(err) = this.ensure_dependents().await {
                    if err.is_fatal() {
                        return Err(err);
                    }
                    info!(stage = %ProvisioningStage::DependentResourcesApplying, error = %err, "dependent resources not applied yet, retrying");
                    return Ok(false);
                }
                Ok(true)
            })
            .await?;

        if !self.config.wait_ready {
            return Ok(PipelineReport {
                tls_enabled: self.config.enable_tls,
            });
        }

        info!(stage = %ProvisioningStage::AwaitingReady, "waiting for the kafka cluster to be ready");
        let observed_tls = AtomicBool::new(self.config.enable_tls);
        let tls = &observed_tls;
        let hub_name = self.hub.name_any();
        let hub_namespace = self
            .hub
            .namespace()
            .unwrap_or_else(|| self.config.namespace.clone());

        let ready = Poller::new(self.config.ready_interval, self.config.ready_timeout);
        ready
            .wait_until(self.cancel, "kafka cluster ready", move || {
                let hub_name = hub_name.clone();
                let hub_namespace = hub_namespace.clone();
                async move {
                    // Re-read the owner before each poll: waiting for the
                    // readiness of a cluster whose hub is being torn down
                    // would just block the teardown.
                    let hub_live: MessageHub =
                        this.store.get(&hub_namespace, &hub_name).await?;
                    if hub_live.metadata.deletion_timestamp.is_some() {
                        info!(stage = %ProvisioningStage::Aborted, hub = %hub_name, "hub is being deleted");
                        return Err(OperatorError::OwnerDeleting(format!(
                            "hub {}/{}",
                            hub_namespace, hub_name
                        )));
                    }

                    let kafka: Kafka = match this
                        .store
                        .get(&this.config.namespace, &this.config.cluster_name)
                        .await
                    {
                        Ok(kafka) => kafka,
                        Err(err) => {
                            debug!(stage = %ProvisioningStage::AwaitingReady, error = %err, "kafka cluster not readable yet");
                            return Ok(false);
                        }
                    };

                    if !kafka.spec.kafka.listeners.is_empty() {
                        tls.store(kafka.any_tls_listener(), Ordering::Relaxed);
                    }

                    Ok(kafka.is_ready())
                }
            })
            .await?;

        info!(stage = %ProvisioningStage::Ready, "kafka cluster is ready");
        Ok(PipelineReport {
            tls_enabled: observed_tls.load(Ordering::Relaxed),
        })
    }

    /// Stage 1: the broker-operator installation object.
    async fn ensure_subscription(&self) -> Result<EnsureOutcome> {
        let desired = resources::new_subscription(self.config, self.hub);
        MergeReconciler::new(self.store)
            .ensure_with(&desired, |existing: &Subscription, merged| {
                // Switching channels invalidates a pinned version; the pin
                // only ever made sense on the channel it was set for.
                if existing.spec.channel != merged.spec.channel {
                    merged.spec.starting_csv = None;
                }
            })
            .await
    }

    /// Stage 3: the cluster object itself.
    async fn ensure_cluster(&self) -> Result<EnsureOutcome> {
        match self
            .store
            .get::<Kafka>(&self.config.namespace, &self.config.cluster_name)
            .await
        {
            Ok(existing)
                if existing
                    .annotations()
                    .contains_key(resources::SKIP_PATCH_ANNOTATION) =>
            {
                debug!(cluster = %self.config.cluster_name, "skip-patch annotation set, leaving cluster as is");
                return Ok(EnsureOutcome::Unchanged);
            }
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        let desired = resources::new_kafka_cluster(self.config, self.hub);
        MergeReconciler::new(self.store)
            .ensure_with(&desired, |_existing: &Kafka, merged| {
                // Metrics configuration always follows the desired object,
                // including removal when metrics were switched off; the
                // field-level merge alone would keep a stale exporter ref.
                merged.spec.kafka.metrics_config = desired.spec.kafka.metrics_config.clone();
                merged.spec.zookeeper.metrics_config =
                    desired.spec.zookeeper.metrics_config.clone();
            })
            .await
    }

    /// Stage 4: metrics objects, the shared spec topic and the operator's
    /// own access user.
    async fn ensure_dependents(&self) -> Result<()> {
        let reconciler = MergeReconciler::new(self.store);

        if self.hub.spec.enable_metrics {
            reconciler
                .ensure(&resources::new_metrics_config_map(self.config, self.hub))
                .await?;
            // The scrape kind belongs to the monitoring stack and may be
            // absent on clusters without it; metrics still work, unscraped.
            if self.store.kind_registered::<PodMonitor>().await? {
                reconciler
                    .ensure(&resources::new_pod_monitor(self.config, self.hub))
                    .await?;
            } else {
                debug!("pod monitor kind not registered, skipping scrape object");
            }
        }

        ensure_transport_topic(self.store, self.config, self.hub, &self.config.spec_topic).await?;

        // With a wildcard template the hub publishes its own status under
        // the shared prefix as well.
        let naming = TopicNaming::from_config(self.config);
        if naming.has_wildcard() {
            let placeholder = naming.status_topic_for(&self.hub.name_any());
            ensure_transport_topic(self.store, self.config, self.hub, &placeholder).await?;
        }

        reconciler
            .ensure(&resources::new_operator_user(self.config, self.hub))
            .await?;

        Ok(())
    }
}

/// Ensure one transport topic. The live replication factor always wins over
/// the desired one: the underlying system cannot change it in place, so the
/// merge must never try.
pub(crate) async fn ensure_transport_topic<S: ObjectStore>(
    store: &S,
    config: &TransportConfig,
    hub: &MessageHub,
    name: &str,
) -> Result<EnsureOutcome> {
    let desired = resources::new_kafka_topic(config, hub, name);
    MergeReconciler::new(store)
        .ensure_with(&desired, |existing: &KafkaTopic, merged| {
            merged.spec.replicas = existing.spec.replicas;
        })
        .await
}
