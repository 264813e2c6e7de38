//! Bounded readiness polling
//!
//! Evaluates a condition immediately and then on every interval tick until
//! it succeeds, fails fatally, or the timeout elapses. External cancellation
//! aborts the wait immediately and is reported distinctly from a timeout so
//! callers can tell "gave up" from "told to stop".

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{OperatorError, Result};

/// A bounded poller. The same primitive backs coarse waits (cluster
/// readiness, minutes) and fine waits (one resource-application round,
/// seconds); only the interval and timeout differ.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Poll `condition` until it returns `Ok(true)`.
    ///
    /// `Ok(false)` means "not yet" and keeps the poller going; any `Err` is
    /// fatal and aborts the wait immediately. `what` labels the wait in
    /// timeout and cancellation errors.
    pub async fn wait_until<F, Fut>(
        &self,
        cancel: &CancellationToken,
        what: &str,
        mut condition: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(OperatorError::Cancelled(what.to_string()));
            }

            if condition().await? {
                return Ok(());
            }

            let now = Instant::now();
            if now + self.interval >= deadline {
                // The next tick would land past the deadline; sleep out the
                // remainder and report the timeout.
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(OperatorError::Cancelled(what.to_string()));
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        return Err(OperatorError::Timeout {
                            what: what.to_string(),
                            elapsed: start.elapsed(),
                        });
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(OperatorError::Cancelled(what.to_string()));
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
