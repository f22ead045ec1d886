//! Core domain types and service traits.
//!
//! This module defines the alert record an action receives, the payload it
//! delivers, and the trait contracts for the delivery targets.

use crate::error::{ActionError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle status of an alert.
///
/// Unexpected values are kept verbatim rather than rejecting the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlertStatus {
    Firing,
    Resolved,
    Other(String),
}

impl AlertStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Other(s) => s,
        }
    }
}

impl From<String> for AlertStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "firing" => AlertStatus::Firing,
            "resolved" => AlertStatus::Resolved,
            _ => AlertStatus::Other(s),
        }
    }
}

impl From<AlertStatus> for String {
    fn from(status: AlertStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitoring alert, as delivered in `ALERT_JSON`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    #[serde(default)]
    pub status: Option<AlertStatus>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Kept as received; never used for the outbound timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
}

/// Treats an explicit `null` section like a missing one.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl AlertRecord {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// The status as a string, empty when absent.
    pub fn status_str(&self) -> &str {
        self.status.as_ref().map(AlertStatus::as_str).unwrap_or("")
    }

    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn annotation(&self, key: &str) -> &str {
        self.annotations.get(key).map(String::as_str).unwrap_or("")
    }
}

/// The canonical record delivered to every target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    pub alert_name: String,
    pub status: String,
    pub severity: String,
    pub instance: String,
    pub summary: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// RFC3339 UTC time at which the payload was built.
    pub timestamp: String,
    pub source: String,
}

impl DispatchPayload {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Opaque reference to an asynchronous execution on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a remote execution as reported by the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Active,
    Queued,
    Succeeded,
    Failed,
    Cancelled,
    Unknown(String),
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }
}

impl From<&str> for ExecutionState {
    fn from(s: &str) -> Self {
        match s {
            "ACTIVE" => ExecutionState::Active,
            "QUEUED" => ExecutionState::Queued,
            "SUCCEEDED" => ExecutionState::Succeeded,
            "FAILED" => ExecutionState::Failed,
            "CANCELLED" => ExecutionState::Cancelled,
            other => ExecutionState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Active => write!(f, "ACTIVE"),
            ExecutionState::Queued => write!(f, "QUEUED"),
            ExecutionState::Succeeded => write!(f, "SUCCEEDED"),
            ExecutionState::Failed => write!(f, "FAILED"),
            ExecutionState::Cancelled => write!(f, "CANCELLED"),
            ExecutionState::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// One observation of a remote execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    /// Result payload of a successful execution, surfaced for logging only.
    pub result: Option<String>,
    /// Failure payload of a failed execution, passed through verbatim.
    pub error_payload: Option<String>,
}

impl ExecutionStatus {
    pub fn new(state: ExecutionState) -> Self {
        Self {
            state,
            result: None,
            error_payload: None,
        }
    }
}

/// The single time budget shared by dispatch and completion polling.
///
/// It is counted from the moment dispatch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    expires_at: Instant,
}

impl Deadline {
    /// Starts a deadline that expires `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires_at: started + budget,
        }
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn budget(&self) -> Duration {
        self.expires_at - self.started
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// The error reported when this deadline elapses during `phase`.
    pub fn timeout_error(&self, phase: &'static str) -> ActionError {
        ActionError::Timeout {
            phase,
            elapsed: self.started.elapsed(),
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Delivers a payload to one destination.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Short name of the delivery target (e.g., "webhook", "pubsub").
    fn name(&self) -> &str;

    /// Human-readable destination identity, used in logs and errors.
    fn destination(&self) -> &str;

    /// Performs exactly one delivery attempt, bounded by `deadline`.
    ///
    /// # Returns
    /// * `Ok(Some(handle))` when the destination started an asynchronous execution
    /// * `Ok(None)` when delivery is complete on acceptance
    /// * `Err` for rejections, transport failures and timeouts
    async fn dispatch(
        &self,
        payload: &DispatchPayload,
        deadline: Deadline,
    ) -> Result<Option<ExecutionHandle>>;
}

/// Queries the status of an asynchronous execution.
#[async_trait]
pub trait ExecutionPoller: Send + Sync {
    async fn poll(&self, handle: &ExecutionHandle, deadline: Deadline) -> Result<ExecutionStatus>;
}
