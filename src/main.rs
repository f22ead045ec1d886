//! Karo action binary.
//!
//! Runs one alert dispatch and exits with a code describing the outcome.

use anyhow::Result;
use clap::Parser;
use karo_actions::{
    app::App,
    cli::Cli,
    config::{ActionConfig, Config, DestinationConfig, WorkflowNaming},
    environment::Environment,
    error::ActionError,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = Environment::capture();
    let target = cli.command.target();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli, &env) {
        Ok(config) => config,
        Err(err) => {
            init_logging("info");
            fail(err);
        }
    };

    init_logging(&config.log_level);
    info!(action = %target, "Karo action starting up...");

    let action = match config.validate(target) {
        Ok(action) => action,
        Err(err) => fail(err),
    };
    log_summary(&action);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        let app = App::builder(action, env).build()?;
        app.run().await
    });

    match result {
        Ok(outcome) => {
            match (&outcome.handle, &outcome.completion) {
                (Some(handle), Some(status)) => {
                    info!(execution = %handle, state = %status.state, "Execution finished")
                }
                (Some(handle), None) => info!(execution = %handle, "Execution started"),
                _ => {}
            }
            info!("Alert dispatched successfully");
            Ok(())
        }
        Err(err) => fail(err),
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn fail(err: ActionError) -> ! {
    error!(error = %err, exit_code = err.exit_code(), "Action failed");
    std::process::exit(err.exit_code());
}

fn log_summary(action: &ActionConfig) {
    info!("-------------------- Configuration --------------------");
    info!("Target: {}", action.destination.target());
    info!("Timeout: {}s", action.timeout.as_secs());
    info!("Source: {}", action.source);
    match &action.destination {
        DestinationConfig::Webhook { url, auth_header } => {
            info!("Webhook URL: {}", url);
            info!("Authorization Header: {}", if auth_header.is_some() { "set" } else { "not set" });
        }
        DestinationConfig::PubSub {
            project_id,
            topic_id,
            endpoint,
            ..
        } => {
            info!("Project: {}", project_id);
            info!("Topic: {}", topic_id);
            info!("Endpoint: {}", endpoint);
        }
        DestinationConfig::Workflows {
            project_id,
            location,
            naming,
            wait_for_completion,
            endpoint,
            ..
        } => {
            info!("Project: {}", project_id);
            info!("Location: {}", location);
            match naming {
                WorkflowNaming::Static(name) => info!("Workflow: {}", name),
                WorkflowNaming::Field(field) => info!("Workflow Name Field: {}", field),
            }
            info!("Wait For Completion: {}", wait_for_completion);
            info!("Endpoint: {}", endpoint);
        }
    }
    info!("-------------------------------------------------------");
}
