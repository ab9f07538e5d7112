//! Status Poller
//!
//! Polls the transaction-status endpoint on a fixed interval until the
//! intent reaches a terminal status, the failure cap is hit, or the poller
//! is cancelled. Every result is applied through the shared workflow cell
//! together with the generation the poller was started under; once the
//! workflow moves on, the poller's results are discarded and it exits.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::workflow::{Shared, StatusOutcome};
use crate::api::DepositGateway;

/// Handle to the running poll task; dropping it stops the task
#[derive(Debug)]
pub struct StatusPoller {
    handle: JoinHandle<()>,
}

impl StatusPoller {
    /// Start polling `intent_id` every `period`; the first request goes out
    /// one period after the call.
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        gateway: Arc<dyn DepositGateway>,
        intent_id: String,
        period: Duration,
        settle_delay: Duration,
        generation: u64,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let outcome = match gateway.transaction_status(&intent_id).await {
                    Ok(status) => shared.apply_status(generation, status),
                    Err(e) => shared.record_poll_failure(generation, &e),
                };

                match outcome {
                    StatusOutcome::Continue => continue,
                    StatusOutcome::Settle => {
                        tokio::time::sleep(settle_delay).await;
                        shared.finish_success(generation);
                        break;
                    }
                    StatusOutcome::Stopped | StatusOutcome::Stale => break,
                }
            }

            debug!(target: "vault5::deposit", intent_id = %intent_id, generation, "poller exited");
        });

        Self { handle }
    }

    /// Whether the task has exited
    /// Finish a success observed outside the interval after `delay`.
    pub(crate) fn settle(shared: Arc<Shared>, generation: u64, delay: Duration) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.finish_success(generation);
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
