//! Lease-based leader election
//!
//! The provisioning pipeline must run at most once at a time per hub, so in
//! HA deployments only the Lease holder runs the controllers. Acquiring
//! yields a [`LeaderLease`] guard whose background renewal task fires the
//! shared cancellation token when leadership is lost, which in turn aborts
//! any in-flight readiness waits.

use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const LEASE_NAME: &str = "meshbus-operator-leader";
const LEASE_DURATION_SECS: i32 = 15;
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Namespace for the election Lease: explicit argument, then the service
/// account mount, then `"default"`.
pub fn detect_namespace(explicit: &str) -> String {
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    std::fs::read_to_string("/var/run/secrets/kubernetes.io/serviceaccount/namespace")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "default".to_string())
}

fn instance_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("operator-{:08x}", rand::random::<u32>()))
}

/// Candidate in the election.
pub struct LeaderElection {
    lease_api: Api<Lease>,
    identity: String,
}

impl LeaderElection {
    pub fn new(client: Client, namespace: &str) -> Self {
        let identity = instance_identity();
        info!(identity = %identity, namespace = %namespace, "Initialized leader election");
        Self {
            lease_api: Api::namespaced(client, namespace),
            identity,
        }
    }

    /// Block until this instance holds the lease, then return the guard.
    pub async fn acquire(self) -> anyhow::Result<LeaderLease> {
        info!(identity = %self.identity, "Waiting to acquire leader lease '{}'", LEASE_NAME);
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Acquired leader lease");
                    return Ok(LeaderLease {
                        lease_api: self.lease_api,
                        identity: self.identity,
                    });
                }
                Ok(false) => {
                    debug!("Lease held elsewhere, retrying in {:?}", RETRY_INTERVAL);
                }
                Err(err) => {
                    warn!("Lease acquisition error: {}, retrying", err);
                }
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    async fn try_acquire(&self) -> anyhow::Result<bool> {
        let now = MicroTime(Utc::now());
        let existing = match self.lease_api.get(LEASE_NAME).await {
            Ok(lease) => lease,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                return write_lease(
                    &self.lease_api,
                    None,
                    lease_spec(&self.identity, &now, &now, 0),
                )
                .await;
            }
            Err(err) => return Err(err.into()),
        };

        let spec = existing.spec.as_ref();
        let holder = spec.and_then(|s| s.holder_identity.as_deref());
        let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);

        if holder == Some(self.identity.as_str()) {
            let acquire_time = spec.and_then(|s| s.acquire_time.clone()).unwrap_or(now.clone());
            let next = lease_spec(&self.identity, &acquire_time, &now, transitions);
            write_lease(&self.lease_api, Some(existing), next).await
        } else if lease_expired(spec) {
            let next = lease_spec(&self.identity, &now, &now, transitions + 1);
            write_lease(&self.lease_api, Some(existing), next).await
        } else {
            Ok(false)
        }
    }
}

/// Held lease. Dropping it without `release` leaves takeover to expiry.
pub struct LeaderLease {
    lease_api: Api<Lease>,
    identity: String,
}

impl LeaderLease {
    /// Renew in the background; fire `cancel` if leadership is lost so the
    /// rest of the process winds down its waits.
    pub fn spawn_renewal(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.release().await;
                        return;
                    }
                    _ = tokio::time::sleep(RENEW_INTERVAL) => {}
                }
                match self.renew().await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(identity = %self.identity, "Lost leader lease");
                        cancel.cancel();
                        return;
                    }
                    Err(err) => {
                        warn!("Failed to renew leader lease: {}", err);
                        cancel.cancel();
                        return;
                    }
                }
            }
        })
    }

    /// Renew the lease. `Ok(false)` means leadership is gone.
    pub async fn renew(&self) -> anyhow::Result<bool> {
        let existing = self.lease_api.get(LEASE_NAME).await?;
        let spec = existing.spec.as_ref();
        if spec.and_then(|s| s.holder_identity.as_deref()) != Some(self.identity.as_str()) {
            return Ok(false);
        }

        let now = MicroTime(Utc::now());
        let acquire_time = spec.and_then(|s| s.acquire_time.clone()).unwrap_or(now.clone());
        let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);
        let next = lease_spec(&self.identity, &acquire_time, &now, transitions);
        write_lease(&self.lease_api, Some(existing), next).await
    }

    /// Clear the holder so a standby can take over immediately.
    pub async fn release(&self) {
        let mut lease = match self.lease_api.get(LEASE_NAME).await {
            Ok(lease) => lease,
            Err(err) => {
                warn!("Failed to read lease for release: {}", err);
                return;
            }
        };
        let held = lease
            .spec
            .as_ref()
            .and_then(|s| s.holder_identity.as_deref())
            == Some(self.identity.as_str());
        if !held {
            debug!("Lease not held by us, skipping release");
            return;
        }
        if let Some(spec) = lease.spec.as_mut() {
            spec.holder_identity = None;
        }
        match self
            .lease_api
            .replace(LEASE_NAME, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => info!("Released leader lease"),
            Err(err) => warn!("Failed to release leader lease: {}", err),
        }
    }
}

fn lease_spec(
    identity: &str,
    acquire_time: &MicroTime,
    renew_time: &MicroTime,
    transitions: i32,
) -> LeaseSpec {
    LeaseSpec {
        holder_identity: Some(identity.to_string()),
        lease_duration_seconds: Some(LEASE_DURATION_SECS),
        acquire_time: Some(acquire_time.clone()),
        renew_time: Some(renew_time.clone()),
        lease_transitions: Some(transitions),
        ..Default::default()
    }
}

fn lease_expired(spec: Option<&LeaseSpec>) -> bool {
    let duration = spec
        .and_then(|s| s.lease_duration_seconds)
        .unwrap_or(LEASE_DURATION_SECS) as i64;
    match spec.and_then(|s| s.renew_time.as_ref()) {
        Some(MicroTime(renewed)) => {
            Utc::now().signed_duration_since(*renewed).num_seconds() > duration
        }
        None => true,
    }
}

/// Write the lease, treating a write conflict as "someone else won".
async fn write_lease(
    lease_api: &Api<Lease>,
    existing: Option<Lease>,
    spec: LeaseSpec,
) -> anyhow::Result<bool> {
    let result = match existing {
        Some(mut lease) => {
            lease.spec = Some(spec);
            lease_api
                .replace(LEASE_NAME, &PostParams::default(), &lease)
                .await
        }
        None => {
            let lease = Lease {
                metadata: ObjectMeta {
                    name: Some(LEASE_NAME.to_string()),
                    ..Default::default()
                },
                spec: Some(spec),
            };
            lease_api.create(&PostParams::default(), &lease).await
        }
    };
    match result {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_when_never_renewed() {
        assert!(lease_expired(None));
        assert!(lease_expired(Some(&LeaseSpec::default())));
    }

    #[test]
    fn test_fresh_lease_is_not_expired() {
        let spec = lease_spec(
            "me",
            &MicroTime(Utc::now()),
            &MicroTime(Utc::now()),
            0,
        );
        assert!(!lease_expired(Some(&spec)));
    }

    #[test]
    fn test_stale_lease_is_expired() {
        let stale = MicroTime(Utc::now() - chrono::Duration::seconds(60));
        let spec = lease_spec("me", &stale, &stale, 0);
        assert!(lease_expired(Some(&spec)));
    }

    #[test]
    fn test_identity_fallback_is_nonempty() {
        assert!(!instance_identity().is_empty());
    }
}
