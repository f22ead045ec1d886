#![allow(dead_code)]

pub mod fake_poller;
pub mod recording_dispatcher;

use karo_actions::cli::Cli;
use karo_actions::config::{ActionConfig, Config};
use karo_actions::environment::Environment;
use karo_actions::error::Result;
use clap::Parser;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("karo_actions=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Builds an environment snapshot from literal pairs.
pub fn env(pairs: &[(&str, &str)]) -> Environment {
    pairs.iter().copied().collect()
}

/// Parses `args` as the command line after the binary name.
pub fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["karo-action"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).expect("test command line should parse")
}

/// Loads and validates the configuration the binary would run with.
pub fn action_config(args: &[&str], environment: &Environment) -> Result<ActionConfig> {
    let cli = cli(args);
    Config::load(&cli, environment)?.validate(cli.command.target())
}

/// A representative Alertmanager alert.
pub const FIRING_ALERT: &str = r#"{
    "status": "firing",
    "labels": {
        "alertname": "HighCPU",
        "severity": "critical",
        "instance": "web-1",
        "workflow": "Incident Triage"
    },
    "annotations": {
        "summary": "CPU above 90%",
        "description": "web-1 CPU has been above 90% for 5 minutes"
    },
    "startsAt": "2024-05-01T10:00:00Z"
}"#;
