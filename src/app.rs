//! Wiring of one action invocation.
//!
//! `App::run` is the whole pipeline: resolve the destination, build the
//! payload, dispatch it once, and optionally wait for the remote execution.

use crate::config::{ActionConfig, DestinationConfig, WorkflowNaming};
use crate::core::{
    AlertRecord, Deadline, DispatchPayload, Dispatcher, ExecutionHandle, ExecutionPoller,
    ExecutionStatus,
};
use crate::dispatch::{
    DeliveryAttempt, PubSubDispatcher, WebhookDispatcher, WorkflowsClient, WorkflowsDispatcher,
};
use crate::environment::Environment;
use crate::error::{ActionError, Result};
use crate::monitor::CompletionMonitor;
use crate::payload::build_payload;
use crate::resolver::resolve_field;
use crate::sanitize::sanitize_name;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// What a successful invocation did.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub payload: DispatchPayload,
    /// Handle of the started execution, for targets that start one.
    pub handle: Option<ExecutionHandle>,
    /// Final status when the invocation waited for completion.
    pub completion: Option<ExecutionStatus>,
}

/// A configured action, ready to run once.
pub struct App {
    config: ActionConfig,
    alert: Option<AlertRecord>,
    env: Environment,
    dispatcher: Arc<dyn Dispatcher>,
    poller: Option<Arc<dyn ExecutionPoller>>,
    now: Option<DateTime<Utc>>,
}

impl App {
    /// Creates a new `AppBuilder`.
    pub fn builder(config: ActionConfig, env: Environment) -> AppBuilder {
        AppBuilder::new(config, env)
    }

    pub fn dispatcher(&self) -> &dyn Dispatcher {
        self.dispatcher.as_ref()
    }

    /// Runs the single delivery and, when configured, the completion wait.
    pub async fn run(self) -> Result<Outcome> {
        let payload = build_payload(
            self.alert.as_ref(),
            &self.env,
            &self.config.source,
            self.now.unwrap_or_else(Utc::now),
        );

        let deadline = Deadline::after(self.config.timeout);
        let mut attempt = DeliveryAttempt::new();
        let handle = attempt
            .run(self.dispatcher.as_ref(), &payload, deadline)
            .await?;

        let completion = match (&handle, &self.poller) {
            (Some(handle), Some(poller)) if self.config.wait_for_completion() => {
                let monitor = CompletionMonitor::new(
                    poller.as_ref(),
                    poll_interval(&self.config),
                    self.dispatcher.destination(),
                );
                Some(monitor.wait(handle, deadline).await?)
            }
            (Some(handle), _) => {
                info!(execution = %handle, "Not waiting for completion");
                None
            }
            (None, _) => None,
        };

        Ok(Outcome {
            payload,
            handle,
            completion,
        })
    }
}

fn poll_interval(config: &ActionConfig) -> Duration {
    match &config.destination {
        DestinationConfig::Workflows { poll_interval, .. } => *poll_interval,
        _ => Duration::from_secs(crate::config::DEFAULT_POLL_INTERVAL_SECONDS),
    }
}

/// Resolves the workflow to execute for this alert.
///
/// A static name is used as given. A field-derived name is sanitized, and a
/// field that resolves to nothing usable is a resolution error.
pub fn resolve_workflow_name(
    naming: &WorkflowNaming,
    alert: Option<&AlertRecord>,
    env: &Environment,
) -> Result<String> {
    match naming {
        WorkflowNaming::Static(name) => {
            info!(workflow = %name, "Using static workflow name");
            Ok(name.clone())
        }
        WorkflowNaming::Field(path) => {
            let resolved = resolve_field(alert, env, path);
            if resolved.is_empty() {
                return Err(ActionError::Resolution(format!(
                    "workflow name field '{}' resolved to empty value",
                    path
                )));
            }
            let name = sanitize_name(&resolved);
            if name.is_empty() {
                return Err(ActionError::Resolution(format!(
                    "workflow name '{}' from field '{}' is empty after sanitization",
                    resolved, path
                )));
            }
            info!(field = %path, raw = %resolved, workflow = %name, "Resolved workflow name from alert");
            Ok(name)
        }
    }
}

/// A builder for creating an `App` instance.
pub struct AppBuilder {
    config: ActionConfig,
    env: Environment,
    dispatcher_override: Option<Arc<dyn Dispatcher>>,
    poller_override: Option<Arc<dyn ExecutionPoller>>,
    now: Option<DateTime<Utc>>,
}

impl AppBuilder {
    pub fn new(config: ActionConfig, env: Environment) -> Self {
        Self {
            config,
            env,
            dispatcher_override: None,
            poller_override: None,
            now: None,
        }
    }

    /// Replaces the dispatcher derived from the configuration.
    pub fn dispatcher_override(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher_override = Some(dispatcher);
        self
    }

    /// Replaces the execution poller derived from the configuration.
    pub fn poller_override(mut self, poller: Arc<dyn ExecutionPoller>) -> Self {
        self.poller_override = Some(poller);
        self
    }

    /// Fixes the payload timestamp.
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Resolves the destination and constructs the target clients.
    ///
    /// No network activity happens here.
    pub fn build(self) -> Result<App> {
        let alert = self.env.alert_record();

        let (dispatcher, poller): (Arc<dyn Dispatcher>, Option<Arc<dyn ExecutionPoller>>) =
            match &self.config.destination {
                DestinationConfig::Webhook { url, auth_header } => (
                    Arc::new(WebhookDispatcher::new(url.clone(), auth_header.clone())?),
                    None,
                ),
                DestinationConfig::PubSub {
                    project_id,
                    topic_id,
                    endpoint,
                    access_token,
                } => (
                    Arc::new(PubSubDispatcher::new(
                        project_id,
                        topic_id,
                        endpoint,
                        access_token.clone(),
                    )?),
                    None,
                ),
                DestinationConfig::Workflows {
                    project_id,
                    location,
                    naming,
                    endpoint,
                    access_token,
                    ..
                } => {
                    let workflow = resolve_workflow_name(naming, alert.as_ref(), &self.env)?;
                    let client =
                        WorkflowsClient::new(project_id, location, endpoint, access_token.clone())?;
                    (
                        Arc::new(WorkflowsDispatcher::new(client.clone(), workflow)),
                        Some(Arc::new(client)),
                    )
                }
            };

        Ok(App {
            config: self.config,
            alert,
            env: self.env,
            dispatcher: self.dispatcher_override.unwrap_or(dispatcher),
            poller: self.poller_override.or(poller),
            now: self.now,
        })
    }
}
