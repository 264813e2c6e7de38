//! Reconcile primitives
//!
//! The merge-based "ensure" primitive and the bounded readiness poller that
//! every provisioning stage is built from.

mod merge;
mod poll;

pub use merge::{merge_patch, EnsureOutcome, MergeReconciler};
pub use poll::Poller;
