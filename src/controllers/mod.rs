//! Controllers for the MeshBus transport operator
//!
//! The hub controller watches `MessageHub` resources and drives the
//! transport provisioner on every reconcile pass.

mod hub;

pub use hub::HubController;

use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

use crate::error::OperatorError;

/// Requeue policy for failed reconciles.
pub fn error_policy_backoff<K, C>(_obj: Arc<K>, error: &OperatorError, _ctx: Arc<C>) -> Action {
    // Fatal errors get a longer pause; everything else retries briskly.
    if error.is_fatal() {
        Action::requeue(Duration::from_secs(120))
    } else {
        Action::requeue(Duration::from_secs(30))
    }
}
