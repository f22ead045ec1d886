//! Field resolution with an environment fallback.
//!
//! A field path uses dot notation: `status`, `labels.<key>` or
//! `annotations.<key>`. The alert record is consulted first; when it yields
//! nothing, the environment snapshot is consulted through a fixed mapping
//! table, and otherwise through a variable name derived from the path.

use crate::core::AlertRecord;
use crate::environment::Environment;
use tracing::debug;

/// Well-known field paths and the environment variables that back them.
pub const ENV_FIELD_MAPPINGS: &[(&str, &str)] = &[
    ("labels.alertname", "ALERT_NAME"),
    ("labels.workflow", "WORKFLOW_FROM_LABEL"),
    ("annotations.workflow", "WORKFLOW_FROM_ANNOTATION"),
    ("annotations.workflow_name", "WORKFLOW_NAME_FROM_ANNOTATION"),
    ("status", "ALERT_STATUS"),
];

/// Reads `path` from the alert record.
///
/// Only `status` is recognized as a single segment. Two-segment paths read the
/// `labels` or `annotations` map. Deeper paths are unsupported and yield an
/// empty string.
pub fn resolve_from_record<'a>(alert: &'a AlertRecord, path: &str) -> &'a str {
    let parts: Vec<&str> = path.split('.').collect();
    match parts.as_slice() {
        ["status"] => alert.status_str(),
        ["labels", key] => alert.label(key),
        ["annotations", key] => alert.annotation(key),
        _ => "",
    }
}

/// Name of the environment variable that backs `path`.
pub fn env_var_for_path(path: &str) -> String {
    ENV_FIELD_MAPPINGS
        .iter()
        .find(|(field, _)| *field == path)
        .map(|(_, var)| (*var).to_string())
        .unwrap_or_else(|| path.replace('.', "_").to_uppercase())
}

/// Reads `path` from the environment snapshot.
pub fn resolve_from_env<'a>(env: &'a Environment, path: &str) -> &'a str {
    env.get(&env_var_for_path(path))
}

/// Resolves `path`, record first and environment second.
///
/// Returns an empty string when neither source has a value; callers decide
/// whether that is fatal.
pub fn resolve_field(alert: Option<&AlertRecord>, env: &Environment, path: &str) -> String {
    if let Some(value) = alert
        .map(|a| resolve_from_record(a, path))
        .filter(|v| !v.is_empty())
    {
        debug!(field = path, "Resolved field from alert record");
        return value.to_string();
    }

    let value = resolve_from_env(env, path);
    if !value.is_empty() {
        debug!(field = path, var = %env_var_for_path(path), "Resolved field from environment");
    }
    value.to_string()
}
