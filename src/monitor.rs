//! Completion monitoring for asynchronous executions.

use crate::core::{Deadline, ExecutionHandle, ExecutionPoller, ExecutionState, ExecutionStatus};
use crate::error::{ActionError, DeliveryError, Result};
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, timeout_at, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Polls an execution until it reaches a terminal state or the deadline passes.
pub struct CompletionMonitor<'a> {
    poller: &'a dyn ExecutionPoller,
    interval: Duration,
    destination: String,
}

impl<'a> CompletionMonitor<'a> {
    pub fn new(
        poller: &'a dyn ExecutionPoller,
        interval: Duration,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            poller,
            interval,
            destination: destination.into(),
        }
    }

    /// Waits for `handle` to finish.
    ///
    /// The first poll happens one interval after the call. `SUCCEEDED` returns
    /// the final status, `FAILED` and `CANCELLED` become delivery errors, and
    /// any other state keeps polling. A failed poll ends the wait immediately.
    #[instrument(skip_all, fields(execution = %handle))]
    pub async fn wait(&self, handle: &ExecutionHandle, deadline: Deadline) -> Result<ExecutionStatus> {
        info!(
            interval_secs = self.interval.as_secs(),
            remaining_secs = deadline.remaining().as_secs(),
            "Waiting for execution to complete"
        );

        let start = tokio::time::Instant::now();
        let mut ticker = interval_at(start + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let expiry = sleep_until(deadline.expires_at());
        tokio::pin!(expiry);
        let mut polls: u32 = 0;

        loop {
            tokio::select! {
                // A tick landing on the deadline does not get another poll.
                biased;
                _ = &mut expiry => {
                    warn!(
                        polls,
                        budget_secs = deadline.budget().as_secs(),
                        "Deadline reached while execution still running; outcome unknown"
                    );
                    return Err(deadline.timeout_error("completion wait"));
                }
                _ = ticker.tick() => {
                    polls += 1;
                    let status = match timeout_at(deadline.expires_at(), self.poller.poll(handle, deadline)).await {
                        Ok(result) => result?,
                        Err(_) => return Err(deadline.timeout_error("completion wait")),
                    };
                    info!(state = %status.state, poll = polls, "Execution state");
                    if !status.state.is_terminal() {
                        debug!(
                            remaining_secs = deadline.remaining().as_secs(),
                            "Execution still running"
                        );
                    }

                    match status.state {
                        ExecutionState::Succeeded => {
                            if let Some(result) = &status.result {
                                info!(result = %result, "Execution result");
                            }
                            info!("Workflow execution completed successfully");
                            return Ok(status);
                        }
                        ExecutionState::Failed => {
                            let payload = status.error_payload.unwrap_or_default();
                            return Err(ActionError::Delivery {
                                destination: self.destination.clone(),
                                source: DeliveryError::ExecutionFailed { payload },
                            });
                        }
                        ExecutionState::Cancelled => {
                            return Err(ActionError::Delivery {
                                destination: self.destination.clone(),
                                source: DeliveryError::Cancelled,
                            });
                        }
                        ExecutionState::Unknown(ref other) => {
                            debug!(state = %other, "Unrecognized execution state, still waiting");
                        }
                        ExecutionState::Active | ExecutionState::Queued => {}
                    }
                }
            }
        }
    }
}
