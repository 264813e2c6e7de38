//! Tenant decommissioning
//!
//! Removes the objects scoped to a single tenant. The shared cluster and
//! the shared spec topic are never touched here, and status topics are
//! deliberately left in place as well: with a prefix template they may be
//! shared infrastructure, and deleting one under an in-flight consumer
//! breaks the remaining tenants. Topic lifecycle removal happens only when
//! the owning hub itself is deleted, via garbage collection.

use tracing::info;

use crate::config::TransportConfig;
use crate::crd::KafkaUser;
use crate::error::Result;
use crate::policy::tenant_user_name;
use crate::store::ObjectStore;

/// Delete the tenant's access credential object. Absence is success.
pub async fn prune_tenant<S: ObjectStore>(
    store: &S,
    config: &TransportConfig,
    tenant: &str,
) -> Result<()> {
    let user_name = tenant_user_name(tenant);
    match store
        .delete::<KafkaUser>(&config.namespace, &user_name)
        .await
    {
        Ok(()) => {
            info!(tenant, user = %user_name, "pruned tenant kafka user");
            Ok(())
        }
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err.into()),
    }
}
