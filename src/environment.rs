//! A snapshot of the process environment.
//!
//! The environment is captured once at startup and passed explicitly to the
//! components that need per-field fallbacks, so nothing below `main` reads
//! process-global state.

use crate::core::AlertRecord;
use std::collections::HashMap;
use std::ffi::OsString;
use tracing::{info, warn};

/// Environment variable carrying the full alert record.
pub const ALERT_JSON: &str = "ALERT_JSON";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn capture() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    fn from_os_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    /// Returns the value of `key`, or an empty string when unset.
    pub fn get(&self, key: &str) -> &str {
        self.lookup(key).unwrap_or("")
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Parses the alert record from `ALERT_JSON`.
    ///
    /// An absent or empty variable yields `None`. A malformed record is logged
    /// and also yields `None`: every field then degrades to its own variable.
    pub fn alert_record(&self) -> Option<AlertRecord> {
        let raw = self.get(ALERT_JSON);
        if raw.trim().is_empty() {
            info!("No ALERT_JSON provided, using individual environment variables");
            return None;
        }
        match AlertRecord::from_json(raw) {
            Ok(alert) => Some(alert),
            Err(e) => {
                warn!(error = %e, "Failed to parse ALERT_JSON, falling back to environment variables");
                None
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
