//! Google Cloud Pub/Sub target, over the REST `topics.publish` call.

use super::{http_client, send};
use crate::core::{Deadline, DispatchPayload, Dispatcher, ExecutionHandle};
use crate::error::{ActionError, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

const USER_AGENT: &str = concat!("karo-pubsub-publisher/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<PubSubMessage>,
}

#[derive(Debug, Serialize)]
struct PubSubMessage {
    /// Base64 of the payload JSON.
    data: String,
    attributes: BTreeMap<&'static str, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Message attributes for routing without decoding the data.
fn attributes(payload: &DispatchPayload) -> BTreeMap<&'static str, String> {
    BTreeMap::from([
        ("alertName", payload.alert_name.clone()),
        ("status", payload.status.clone()),
        ("severity", payload.severity.clone()),
        ("source", payload.source.clone()),
        ("timestamp", payload.timestamp.clone()),
    ])
}

/// Publishes the payload as a single message to one topic.
pub struct PubSubDispatcher {
    client: reqwest::Client,
    topic: String,
    publish_url: String,
    access_token: Option<String>,
}

impl PubSubDispatcher {
    pub fn new(
        project_id: &str,
        topic_id: &str,
        endpoint: &Url,
        access_token: Option<String>,
    ) -> Result<Self> {
        let topic = format!("projects/{}/topics/{}", project_id, topic_id);
        let publish_url = format!(
            "{}/v1/{}:publish",
            endpoint.as_str().trim_end_matches('/'),
            topic
        );
        Ok(Self {
            client: http_client(USER_AGENT)?,
            topic,
            publish_url,
            access_token,
        })
    }
}

#[async_trait]
impl Dispatcher for PubSubDispatcher {
    fn name(&self) -> &str {
        "pubsub"
    }

    fn destination(&self) -> &str {
        &self.topic
    }

    async fn dispatch(
        &self,
        payload: &DispatchPayload,
        deadline: Deadline,
    ) -> Result<Option<ExecutionHandle>> {
        let data = payload.to_json()?;
        info!(topic = %self.topic, "Publishing message");
        info!(payload = %data, "Payload");

        let body = PublishRequest {
            messages: vec![PubSubMessage {
                data: base64::encode(data.as_bytes()),
                attributes: attributes(payload),
            }],
        };

        let mut request = self.client.post(&self.publish_url).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = send(request, &self.topic, "publish", deadline).await?;
        let published: PublishResponse =
            serde_json::from_str(&response.body).map_err(|e| ActionError::Transport {
                destination: self.topic.clone(),
                message: format!("unexpected publish response: {}", e),
            })?;

        match published.message_ids.first() {
            Some(id) => info!(message_id = %id, "Message published successfully"),
            None => warn!("Publish succeeded but returned no message id"),
        }
        Ok(None)
    }
}
