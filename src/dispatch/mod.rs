//! Delivery of the payload to the configured destination.
//!
//! Each target implements the `Dispatcher` trait. `DeliveryAttempt` wraps a
//! dispatcher with the single-attempt state machine, and the HTTP helpers here
//! classify every failure into the error taxonomy.

pub mod pubsub;
pub mod webhook;
pub mod workflows;

use crate::core::{Deadline, DispatchPayload, Dispatcher, ExecutionHandle};
use crate::error::{ActionError, DeliveryError, Result};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

pub use pubsub::PubSubDispatcher;
pub use webhook::WebhookDispatcher;
pub use workflows::{WorkflowsClient, WorkflowsDispatcher};

/// Progress of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Sending,
    Delivered,
    Failed,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchState::Delivered | DispatchState::Failed)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchState::Idle => write!(f, "Idle"),
            DispatchState::Sending => write!(f, "Sending"),
            DispatchState::Delivered => write!(f, "Delivered"),
            DispatchState::Failed => write!(f, "Failed"),
        }
    }
}

/// Runs a dispatcher at most once: `Idle -> Sending -> {Delivered | Failed}`.
#[derive(Debug)]
pub struct DeliveryAttempt {
    state: DispatchState,
}

impl Default for DeliveryAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryAttempt {
    pub fn new() -> Self {
        Self {
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Performs the single delivery attempt.
    ///
    /// The dispatcher future is raced against the deadline so a stalled
    /// destination surfaces as a timeout even if the transport never returns.
    #[instrument(skip_all, fields(action = dispatcher.name(), destination = dispatcher.destination()))]
    pub async fn run(
        &mut self,
        dispatcher: &dyn Dispatcher,
        payload: &DispatchPayload,
        deadline: Deadline,
    ) -> Result<Option<ExecutionHandle>> {
        // `&mut self` rules out observing `Sending` here.
        if self.state.is_terminal() {
            return Err(ActionError::Configuration(format!(
                "delivery already attempted (state: {})",
                self.state
            )));
        }
        self.state = DispatchState::Sending;
        let started = Instant::now();
        debug!(budget_secs = deadline.budget().as_secs(), "Sending payload");

        let outcome = match tokio::time::timeout_at(
            deadline.expires_at(),
            dispatcher.dispatch(payload, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(deadline.timeout_error("dispatch")),
        };

        match &outcome {
            Ok(handle) => {
                self.state = DispatchState::Delivered;
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    handle = handle.as_ref().map(ExecutionHandle::as_str),
                    "Payload delivered"
                );
            }
            Err(e) => {
                self.state = DispatchState::Failed;
                error!(error = %e, "Delivery failed");
            }
        }
        outcome
    }
}

/// A successful HTTP exchange.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: reqwest::StatusCode,
    pub body: String,
}

/// Sends `request` within the deadline and returns the 2xx response.
///
/// Non-2xx answers become `DeliveryError::Rejected` carrying status and body.
/// Transport failures become `Transport` or `Timeout` errors.
pub async fn send(
    request: reqwest::RequestBuilder,
    destination: &str,
    phase: &'static str,
    deadline: Deadline,
) -> Result<HttpResponse> {
    if deadline.is_expired() {
        return Err(deadline.timeout_error(phase));
    }

    let response = request
        .timeout(deadline.remaining())
        .send()
        .await
        .map_err(|e| classify(e, destination, phase, deadline))?;

    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) if e.is_timeout() => return Err(deadline.timeout_error(phase)),
        Err(e) => {
            warn!(error = %e, "Failed to read response body");
            String::new()
        }
    };

    debug!(%status, "Response received");
    if !body.is_empty() {
        debug!(body = %body, "Response body");
    }

    if !status.is_success() {
        return Err(ActionError::Delivery {
            destination: destination.to_string(),
            source: DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            },
        });
    }

    Ok(HttpResponse { status, body })
}

/// Maps a `reqwest` failure onto the timeout or transport class.
pub fn classify(
    err: reqwest::Error,
    destination: &str,
    phase: &'static str,
    deadline: Deadline,
) -> ActionError {
    if err.is_timeout() {
        deadline.timeout_error(phase)
    } else {
        ActionError::Transport {
            destination: destination.to_string(),
            message: error_chain(&err),
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Builds the HTTP client shared by the targets.
pub fn http_client(user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|e| ActionError::Configuration(format!("failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingDispatcher {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl Dispatcher for CountingDispatcher {
        fn name(&self) -> &str {
            "counting"
        }

        fn destination(&self) -> &str {
            "memory://counting"
        }

        async fn dispatch(
            &self,
            _payload: &DispatchPayload,
            _deadline: Deadline,
        ) -> Result<Option<ExecutionHandle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(ActionError::Delivery {
                    destination: "memory://counting".into(),
                    source: DeliveryError::Rejected {
                        status: 500,
                        body: "boom".into(),
                    },
                })
            } else {
                Ok(Some(ExecutionHandle::new("exec-1")))
            }
        }
    }

    fn dispatcher(delay: Duration, fail: bool) -> (CountingDispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingDispatcher {
                calls: calls.clone(),
                delay,
                fail,
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_successful_attempt_is_delivered() {
        let (d, calls) = dispatcher(Duration::ZERO, false);
        let mut attempt = DeliveryAttempt::new();
        let handle = attempt
            .run(&d, &DispatchPayload::default(), Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(handle, Some(ExecutionHandle::new("exec-1")));
        assert_eq!(attempt.state(), DispatchState::Delivered);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_attempt_is_failed() {
        let (d, _) = dispatcher(Duration::ZERO, true);
        let mut attempt = DeliveryAttempt::new();
        let err = attempt
            .run(&d, &DispatchPayload::default(), Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Delivery { .. }));
        assert_eq!(attempt.state(), DispatchState::Failed);
        assert!(attempt.state().is_terminal());
    }

    #[tokio::test]
    async fn test_no_second_attempt() {
        let (d, calls) = dispatcher(Duration::ZERO, true);
        let mut attempt = DeliveryAttempt::new();
        let deadline = Deadline::after(Duration::from_secs(5));
        let _ = attempt.run(&d, &DispatchPayload::default(), deadline).await;
        let second = attempt.run(&d, &DispatchPayload::default(), deadline).await;
        assert!(second.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempt.state(), DispatchState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_dispatch_times_out() {
        let (d, _) = dispatcher(Duration::from_secs(60), false);
        let mut attempt = DeliveryAttempt::new();
        let err = attempt
            .run(&d, &DispatchPayload::default(), Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(attempt.state(), DispatchState::Failed);
    }

    #[tokio::test]
    async fn test_no_second_attempt_after_delivery() {
        let (d, calls) = dispatcher(Duration::ZERO, false);
        let mut attempt = DeliveryAttempt::new();
        let deadline = Deadline::after(Duration::from_secs(5));
        assert!(attempt.run(&d, &DispatchPayload::default(), deadline).await.is_ok());
        let second = attempt.run(&d, &DispatchPayload::default(), deadline).await;
        assert!(second.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempt.state(), DispatchState::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_deadline_is_timeout_without_request() {
        let deadline = Deadline::after(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        let client = http_client("test").unwrap();
        let err = send(client.get("http://127.0.0.1:9/"), "local", "request", deadline)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
