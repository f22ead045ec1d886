//! HTTP webhook target.

use super::{http_client, send};
use crate::core::{Deadline, DispatchPayload, Dispatcher, ExecutionHandle};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use tracing::info;

/// `User-Agent` sent with every webhook request.
pub const USER_AGENT: &str = concat!("karo-webhook-sender/", env!("CARGO_PKG_VERSION"));

/// POSTs the JSON payload to a fixed URL.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: Url,
    auth_header: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(url: Url, auth_header: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(USER_AGENT)?,
            url,
            auth_header,
        })
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    fn destination(&self) -> &str {
        self.url.as_str()
    }

    async fn dispatch(
        &self,
        payload: &DispatchPayload,
        deadline: Deadline,
    ) -> Result<Option<ExecutionHandle>> {
        let body = payload.to_json()?;
        info!(url = %self.url, "Sending webhook");
        info!(payload = %body, "Payload");

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(auth) = &self.auth_header {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = send(request, self.destination(), "webhook request", deadline).await?;
        info!(status = %response.status, "Webhook accepted");
        Ok(None)
    }
}
