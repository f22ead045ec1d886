//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the action using the
//! `clap` crate. These arguments are parsed at startup and then merged on top
//! of the configuration file and the environment variables.

use clap::{Parser, Subcommand};
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::fmt;
use std::path::PathBuf;

/// Dispatches one monitoring alert to an external system.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Deadline for the whole dispatch, including any completion wait.
    #[arg(long, value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Log filter directive (e.g. "debug", "karo_actions=trace").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// The delivery target for this invocation.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// POST the alert payload to an HTTP endpoint.
    Webhook {
        /// Destination URL; overrides WEBHOOK_URL.
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },
    /// Publish the alert payload to a Pub/Sub topic.
    Pubsub {
        /// Topic id; overrides PUBSUB_TOPIC_ID.
        #[arg(long, value_name = "TOPIC")]
        topic: Option<String>,
    },
    /// Start a workflow execution with the alert payload as its argument.
    Workflows {
        /// Return as soon as the execution is created.
        #[arg(long)]
        no_wait: bool,
    },
}

/// Delivery target without its per-invocation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Webhook,
    PubSub,
    Workflows,
}

impl Command {
    pub fn target(&self) -> Target {
        match self {
            Command::Webhook { .. } => Target::Webhook,
            Command::Pubsub { .. } => Target::PubSub,
            Command::Workflows { .. } => Target::Workflows,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Webhook => write!(f, "webhook"),
            Target::PubSub => write!(f, "pubsub"),
            Target::Workflows => write!(f, "workflows"),
        }
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(timeout) = self.timeout_seconds {
            dict.insert("timeout_seconds".into(), Value::from(timeout));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        match &self.command {
            Command::Webhook { url: Some(url) } => {
                dict.insert("webhook".into(), section("url", url.clone()));
            }
            Command::Pubsub { topic: Some(topic) } => {
                dict.insert("pubsub".into(), section("topic_id", topic.clone()));
            }
            // `--no-wait` only ever turns waiting off; its absence leaves the
            // file and environment value in place.
            Command::Workflows { no_wait: true } => {
                dict.insert("workflows".into(), section("wait_for_completion", false));
            }
            _ => {}
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

fn section(key: &str, value: impl Into<Value>) -> Value {
    let mut dict = Dict::new();
    dict.insert(key.into(), value.into());
    Value::from(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workflows_no_wait() {
        let cli = Cli::try_parse_from(["karo-action", "--timeout-seconds", "10", "workflows", "--no-wait"])
            .unwrap();
        assert_eq!(cli.timeout_seconds, Some(10));
        assert_eq!(cli.command, Command::Workflows { no_wait: true });
        assert_eq!(cli.command.target(), Target::Workflows);
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["karo-action"]).is_err());
    }

    #[test]
    fn test_provider_only_emits_given_flags() {
        let cli = Cli::try_parse_from(["karo-action", "webhook"]).unwrap();
        let data = cli.data().unwrap();
        assert!(data[&Profile::Default].is_empty());

        let cli = Cli::try_parse_from(["karo-action", "--log-level", "debug", "webhook", "--url", "http://x"])
            .unwrap();
        let dict = &cli.data().unwrap()[&Profile::Default];
        assert_eq!(dict["log_level"].as_str(), Some("debug"));
        assert!(dict.contains_key("webhook"));
    }
}
