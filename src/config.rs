//! Configuration management.
//!
//! This module defines the `Config` struct holding every setting an action
//! can receive, and the validated `ActionConfig` a single invocation runs
//! with. It uses the `figment` crate to layer defaults, an optional TOML file,
//! the environment variables the actions are invoked with, and CLI flags.

use crate::cli::{Cli, Target};
use crate::environment::Environment;
use crate::error::{ActionError, Result};
use figment::{
    providers::{Format, Serialized, Toml},
    value::{Dict, Map, Value},
    Figment, Metadata, Profile, Provider,
};
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_SOURCE: &str = "karo";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";
pub const DEFAULT_WORKFLOWS_ENDPOINT: &str = "https://workflowexecutions.googleapis.com";
/// Interval between completion polls.
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;
/// Largest accepted overall deadline (one day).
pub const MAX_TIMEOUT_SECONDS: u64 = 86_400;
/// Largest accepted poll interval.
pub const MAX_POLL_INTERVAL_SECONDS: u64 = 3_600;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging filter for the application.
    pub log_level: String,
    /// Overall deadline in seconds. Each target has its own default.
    pub timeout_seconds: Option<u64>,
    /// Shared Google Cloud settings for the pubsub and workflows targets.
    pub gcp: GcpConfig,
    pub webhook: WebhookConfig,
    pub pubsub: PubSubConfig,
    pub workflows: WorkflowsConfig,
}

/// Google Cloud project settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct GcpConfig {
    pub project_id: Option<String>,
    pub location: Option<String>,
    /// Opaque bearer credential sent as `Authorization: Bearer <token>`.
    pub access_token: Option<String>,
}

/// Configuration for the webhook target.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WebhookConfig {
    pub url: Option<String>,
    /// Sent verbatim as the `Authorization` header.
    pub auth_header: Option<String>,
    pub source: String,
}

/// Configuration for the Pub/Sub target.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PubSubConfig {
    pub topic_id: Option<String>,
    pub endpoint: String,
    pub source: String,
}

/// Configuration for the workflows target.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkflowsConfig {
    /// Static workflow name. Mutually exclusive with `workflow_name_field`.
    pub workflow_name: Option<String>,
    /// Field path in the alert naming the workflow.
    pub workflow_name_field: Option<String>,
    pub wait_for_completion: bool,
    /// Seconds between completion polls. The actions always poll every
    /// `DEFAULT_POLL_INTERVAL_SECONDS`; this is only settable from a config
    /// file, for emulators and tests, and is not mapped to any variable.
    pub poll_interval_seconds: u64,
    pub endpoint: String,
    pub source: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            timeout_seconds: None,
            gcp: GcpConfig::default(),
            webhook: WebhookConfig {
                url: None,
                auth_header: None,
                source: DEFAULT_SOURCE.to_string(),
            },
            pubsub: PubSubConfig {
                topic_id: None,
                endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
                source: DEFAULT_SOURCE.to_string(),
            },
            workflows: WorkflowsConfig {
                workflow_name: None,
                workflow_name_field: None,
                wait_for_completion: true,
                poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
                endpoint: DEFAULT_WORKFLOWS_ENDPOINT.to_string(),
                source: DEFAULT_SOURCE.to_string(),
            },
        }
    }
}

// =============================================================================
// Environment provider
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Int,
    Bool,
}

/// Environment variables the actions accept, and the config keys they set.
pub const ENV_CONFIG_KEYS: &[(&str, &str)] = &[
    ("LOG_LEVEL", "log_level"),
    ("TIMEOUT_SECONDS", "timeout_seconds"),
    ("GCP_PROJECT_ID", "gcp.project_id"),
    ("GCP_LOCATION", "gcp.location"),
    ("GCP_ACCESS_TOKEN", "gcp.access_token"),
    ("WEBHOOK_URL", "webhook.url"),
    ("AUTH_HEADER", "webhook.auth_header"),
    ("WEBHOOK_SOURCE", "webhook.source"),
    ("PUBSUB_TOPIC_ID", "pubsub.topic_id"),
    ("PUBSUB_ENDPOINT", "pubsub.endpoint"),
    ("MESSAGE_SOURCE", "pubsub.source"),
    ("WORKFLOW_NAME", "workflows.workflow_name"),
    ("WORKFLOW_NAME_FIELD", "workflows.workflow_name_field"),
    ("WAIT_FOR_COMPLETION", "workflows.wait_for_completion"),
    ("WORKFLOWS_ENDPOINT", "workflows.endpoint"),
    ("WORKFLOW_SOURCE", "workflows.source"),
];

fn kind_of(key: &str) -> Kind {
    match key {
        "timeout_seconds" => Kind::Int,
        "workflows.wait_for_completion" => Kind::Bool,
        _ => Kind::Str,
    }
}

/// Parses a boolean the way the action environment spells them.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// A `figment` provider reading the action variables from an `Environment`.
///
/// Empty variables count as unset. Values that do not parse as their key's
/// type are passed through as strings so extraction reports them.
pub struct EnvironmentProvider<'a> {
    env: &'a Environment,
}

impl<'a> EnvironmentProvider<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self { env }
    }
}

impl Provider for EnvironmentProvider<'_> {
    fn metadata(&self) -> Metadata {
        Metadata::named("Environment Variables")
    }

    fn data(&self) -> std::result::Result<Map<Profile, figment::value::Dict>, figment::Error> {
        let mut dict = Dict::new();

        for (var, key) in ENV_CONFIG_KEYS {
            let raw = self.env.get(var).trim();
            if raw.is_empty() {
                continue;
            }
            let value = match kind_of(key) {
                Kind::Str => Value::from(raw.to_string()),
                Kind::Int => raw
                    .parse::<u64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(raw.to_string())),
                Kind::Bool => parse_flag(raw)
                    .map(Value::from)
                    .unwrap_or_else(|| Value::from(raw.to_string())),
            };
            insert_nested(&mut dict, key, value);
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

fn insert_nested(dict: &mut Dict, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            dict.insert(key.to_string(), value);
        }
        Some((section, rest)) => {
            let entry = dict
                .entry(section.to_string())
                .or_insert_with(|| Value::from(Dict::new()));
            if let Value::Dict(_, inner) = entry {
                insert_nested(inner, rest, value);
            }
        }
    }
}

impl Config {
    /// Loads the configuration by layering defaults, the optional file named
    /// on the command line, the environment and the CLI flags.
    pub fn load(cli: &Cli, env: &Environment) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = &cli.config {
            if !path.exists() {
                return Err(ActionError::Configuration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(EnvironmentProvider::new(env))
            .merge(cli)
            .extract()
            .map_err(|e| ActionError::Configuration(e.to_string()))
    }

    /// Validates the settings for `target` and produces the configuration the
    /// invocation runs with. Nothing here touches the network.
    pub fn validate(&self, target: Target) -> Result<ActionConfig> {
        let (destination, default_timeout, source) = match target {
            Target::Webhook => (self.validate_webhook()?, 30, &self.webhook.source),
            Target::PubSub => (self.validate_pubsub()?, 30, &self.pubsub.source),
            Target::Workflows => (self.validate_workflows()?, 300, &self.workflows.source),
        };

        let timeout_seconds = self.timeout_seconds.unwrap_or(default_timeout);
        if timeout_seconds == 0 || timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ActionError::Configuration(format!(
                "TIMEOUT_SECONDS must be between 1 and {}, got {}",
                MAX_TIMEOUT_SECONDS, timeout_seconds
            )));
        }

        Ok(ActionConfig {
            destination,
            timeout: Duration::from_secs(timeout_seconds),
            source: source.clone(),
        })
    }

    fn validate_webhook(&self) -> Result<DestinationConfig> {
        let raw = required(&self.webhook.url, "WEBHOOK_URL")?;
        let url = Url::parse(&raw)
            .map_err(|e| ActionError::Configuration(format!("WEBHOOK_URL is not a valid URL: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ActionError::Configuration(format!(
                "WEBHOOK_URL must use http or https, got '{}'",
                url.scheme()
            )));
        }
        let auth_header = non_empty(&self.webhook.auth_header);
        if let Some(value) = &auth_header {
            HeaderValue::from_str(value).map_err(|_| {
                ActionError::Configuration(
                    "AUTH_HEADER contains characters not allowed in an HTTP header".to_string(),
                )
            })?;
        }
        Ok(DestinationConfig::Webhook { url, auth_header })
    }

    fn validate_pubsub(&self) -> Result<DestinationConfig> {
        Ok(DestinationConfig::PubSub {
            project_id: required_segment(&self.gcp.project_id, "GCP_PROJECT_ID")?,
            topic_id: required_segment(&self.pubsub.topic_id, "PUBSUB_TOPIC_ID")?,
            endpoint: endpoint(&self.pubsub.endpoint, "PUBSUB_ENDPOINT")?,
            access_token: non_empty(&self.gcp.access_token),
        })
    }

    fn validate_workflows(&self) -> Result<DestinationConfig> {
        let project_id = required_segment(&self.gcp.project_id, "GCP_PROJECT_ID")?;
        let location = non_empty(&self.gcp.location).unwrap_or_else(|| {
            info!("GCP_LOCATION not specified, using default: {}", DEFAULT_LOCATION);
            DEFAULT_LOCATION.to_string()
        });
        let location = path_segment(location, "GCP_LOCATION")?;

        let naming = match (
            non_empty(&self.workflows.workflow_name),
            non_empty(&self.workflows.workflow_name_field),
        ) {
            (Some(name), None) => WorkflowNaming::Static(path_segment(name, "WORKFLOW_NAME")?),
            (None, Some(field)) => WorkflowNaming::Field(field),
            (None, None) => {
                return Err(ActionError::Configuration(
                    "either WORKFLOW_NAME (static) or WORKFLOW_NAME_FIELD (from alert) must be specified"
                        .to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ActionError::Configuration(
                    "WORKFLOW_NAME and WORKFLOW_NAME_FIELD are mutually exclusive, specify only one"
                        .to_string(),
                ))
            }
        };

        let interval = self.workflows.poll_interval_seconds;
        if interval == 0 || interval > MAX_POLL_INTERVAL_SECONDS {
            return Err(ActionError::Configuration(format!(
                "workflows.poll_interval_seconds must be between 1 and {}, got {}",
                MAX_POLL_INTERVAL_SECONDS, interval
            )));
        }

        Ok(DestinationConfig::Workflows {
            project_id,
            location,
            naming,
            wait_for_completion: self.workflows.wait_for_completion,
            poll_interval: Duration::from_secs(self.workflows.poll_interval_seconds),
            endpoint: endpoint(&self.workflows.endpoint, "WORKFLOWS_ENDPOINT")?,
            access_token: non_empty(&self.gcp.access_token),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, var: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| {
        ActionError::Configuration(format!("{} environment variable is required", var))
    })
}

fn required_segment(value: &Option<String>, var: &str) -> Result<String> {
    path_segment(required(value, var)?, var)
}

/// Rejects values that would change the request target when placed in a URL path.
fn path_segment(value: String, var: &str) -> Result<String> {
    match value
        .chars()
        .find(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace() || c.is_control())
    {
        Some(c) => Err(ActionError::Configuration(format!(
            "{} must not contain {:?}, got '{}'",
            var, c, value
        ))),
        None => Ok(value),
    }
}

fn endpoint(raw: &str, var: &str) -> Result<Url> {
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| ActionError::Configuration(format!("{} is not a valid URL: {}", var, e)))
}

// =============================================================================
// Validated configuration
// =============================================================================

/// How the workflow to execute is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowNaming {
    /// A fixed name, used as given.
    Static(String),
    /// A field path resolved against the alert, then sanitized.
    Field(String),
}

/// Destination settings for one target, after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationConfig {
    Webhook {
        url: Url,
        auth_header: Option<String>,
    },
    PubSub {
        project_id: String,
        topic_id: String,
        endpoint: Url,
        access_token: Option<String>,
    },
    Workflows {
        project_id: String,
        location: String,
        naming: WorkflowNaming,
        wait_for_completion: bool,
        poll_interval: Duration,
        endpoint: Url,
        access_token: Option<String>,
    },
}

impl DestinationConfig {
    pub fn target(&self) -> Target {
        match self {
            DestinationConfig::Webhook { .. } => Target::Webhook,
            DestinationConfig::PubSub { .. } => Target::PubSub,
            DestinationConfig::Workflows { .. } => Target::Workflows,
        }
    }
}

/// Everything a single invocation needs, validated once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionConfig {
    pub destination: DestinationConfig,
    /// Deadline for dispatch plus any completion wait.
    pub timeout: Duration,
    /// Tag identifying the sender in the payload.
    pub source: String,
}

impl ActionConfig {
    pub fn wait_for_completion(&self) -> bool {
        matches!(
            self.destination,
            DestinationConfig::Workflows {
                wait_for_completion: true,
                ..
            }
        )
    }
}
