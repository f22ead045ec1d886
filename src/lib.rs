//! Karo actions: dispatch one monitoring alert to an external system.
//!
//! Each invocation reads a single alert from the environment, builds the
//! canonical payload, and delivers it once to a webhook, a Pub/Sub topic or a
//! workflow, optionally waiting for the workflow execution to finish.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod monitor;
pub mod payload;
pub mod resolver;
pub mod sanitize;

// Re-export core types for convenience
pub use crate::core::*;
pub use error::{ActionError, DeliveryError};
