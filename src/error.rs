//! Error taxonomy for a single action invocation.
//!
//! Every error is fatal: it propagates to the process boundary, where it is
//! logged once and mapped to a non-zero exit code.

use std::time::Duration;
use thiserror::Error;

/// Errors that terminate an invocation.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Missing or contradictory settings. Raised before any network activity.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A field path or destination name resolved to nothing usable.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// The destination was reached but rejected the payload or reported failure.
    #[error("delivery to {destination} failed: {source}")]
    Delivery {
        destination: String,
        #[source]
        source: DeliveryError,
    },

    /// Network-level failure (DNS, connection refused, TLS).
    #[error("transport error talking to {destination}: {message}")]
    Transport { destination: String, message: String },

    /// The deadline elapsed before a terminal outcome was observed.
    #[error("timed out after {}s during {phase}", .elapsed.as_secs())]
    Timeout { phase: &'static str, elapsed: Duration },

    /// The outbound payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Ways a reachable destination can refuse or fail a delivery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("destination responded with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("execution failed: {payload}")]
    ExecutionFailed { payload: String },

    #[error("execution was cancelled")]
    Cancelled,
}

impl ActionError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            ActionError::Configuration(_) => 2,
            ActionError::Resolution(_) => 3,
            ActionError::Delivery { .. } => 4,
            ActionError::Transport { .. } => 5,
            ActionError::Timeout { .. } => 6,
            ActionError::Payload(_) => 1,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::Timeout { .. })
    }
}

pub type Result<T, E = ActionError> = std::result::Result<T, E>;
