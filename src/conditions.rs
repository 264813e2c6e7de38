//! Kubernetes-standard status condition helpers
//!
//! Constants and builders for the MessageHub status conditions, following
//! the Kubernetes API conventions.

use chrono::Utc;

use crate::crd::HubCondition;

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

// MessageHub condition types
pub const HUB_CONDITION_READY: &str = "Ready";
pub const HUB_CONDITION_KAFKA_READY: &str = "KafkaReady";
pub const HUB_CONDITION_TENANTS_READY: &str = "TenantsReady";

// Finalizer name
pub const HUB_FINALIZER: &str = "meshbus.io/hub-cleanup";

/// Build a condition with the current timestamp.
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> HubCondition {
    HubCondition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Set or update a condition in a list, preserving lastTransitionTime when
/// the status has not changed.
pub fn set_condition(conditions: &mut Vec<HubCondition>, new: HubCondition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        if existing.status != new.status {
            *existing = new;
        } else {
            existing.reason = new.reason;
            existing.message = new.message;
        }
    } else {
        conditions.push(new);
    }
}
