//! Construction of the outbound `DispatchPayload`.

use crate::core::{AlertRecord, DispatchPayload};
use crate::environment::Environment;
use chrono::{DateTime, SecondsFormat, Utc};

/// Environment fallbacks, one per payload field.
pub const ENV_ALERT_NAME: &str = "ALERT_NAME";
pub const ENV_ALERT_STATUS: &str = "ALERT_STATUS";
pub const ENV_ALERT_SEVERITY: &str = "ALERT_SEVERITY";
pub const ENV_INSTANCE: &str = "INSTANCE";
pub const ENV_ALERT_SUMMARY: &str = "ALERT_SUMMARY";
pub const ENV_ALERT_DESCRIPTION: &str = "ALERT_DESCRIPTION";

/// Builds the payload for one invocation.
///
/// Fields come from the alert record when present; every field still empty
/// afterwards is filled from its environment variable. The timestamp is `now`,
/// never a timestamp carried by the alert.
pub fn build_payload(
    alert: Option<&AlertRecord>,
    env: &Environment,
    source: &str,
    now: DateTime<Utc>,
) -> DispatchPayload {
    let mut payload = DispatchPayload {
        source: source.to_string(),
        timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        ..Default::default()
    };

    if let Some(alert) = alert {
        payload.status = alert.status_str().to_string();
        payload.labels = alert.labels.clone();
        payload.annotations = alert.annotations.clone();
        payload.alert_name = alert.label("alertname").to_string();
        payload.severity = alert.label("severity").to_string();
        payload.instance = alert.label("instance").to_string();
        payload.summary = alert.annotation("summary").to_string();
        payload.description = alert.annotation("description").to_string();
    }

    let fallbacks: [(&mut String, &str); 6] = [
        (&mut payload.alert_name, ENV_ALERT_NAME),
        (&mut payload.status, ENV_ALERT_STATUS),
        (&mut payload.severity, ENV_ALERT_SEVERITY),
        (&mut payload.instance, ENV_INSTANCE),
        (&mut payload.summary, ENV_ALERT_SUMMARY),
        (&mut payload.description, ENV_ALERT_DESCRIPTION),
    ];
    for (field, var) in fallbacks {
        if field.is_empty() {
            *field = env.get(var).to_string();
        }
    }

    payload
}
