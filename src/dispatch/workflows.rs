//! Google Cloud Workflows target.
//!
//! Dispatch creates one execution with the payload as its argument. The same
//! client polls executions for the completion monitor.

use super::{http_client, send};
use crate::core::{
    Deadline, DispatchPayload, Dispatcher, ExecutionHandle, ExecutionPoller, ExecutionState,
    ExecutionStatus,
};
use crate::error::{ActionError, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const USER_AGENT: &str = concat!("karo-workflow-trigger/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct CreateExecutionRequest {
    /// The payload JSON, passed as a string.
    argument: String,
}

/// The subset of the Execution resource the actions read.
#[derive(Debug, Deserialize)]
struct Execution {
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<ExecutionError>,
}

#[derive(Debug, Deserialize)]
struct ExecutionError {
    #[serde(default)]
    payload: String,
    #[serde(default)]
    context: String,
}

impl From<Execution> for ExecutionStatus {
    fn from(execution: Execution) -> Self {
        let mut status = ExecutionStatus::new(ExecutionState::from(execution.state.as_str()));
        status.result = execution.result;
        status.error_payload = execution.error.map(|e| {
            if e.payload.is_empty() {
                e.context
            } else {
                e.payload
            }
        });
        status
    }
}

/// REST client for one project and location.
#[derive(Clone)]
pub struct WorkflowsClient {
    http: reqwest::Client,
    base: String,
    project_id: String,
    location: String,
    access_token: Option<String>,
}

impl WorkflowsClient {
    pub fn new(
        project_id: &str,
        location: &str,
        endpoint: &Url,
        access_token: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(USER_AGENT)?,
            base: format!("{}/v1", endpoint.as_str().trim_end_matches('/')),
            project_id: project_id.to_string(),
            location: location.to_string(),
            access_token,
        })
    }

    /// Resource name of a workflow in this project and location.
    pub fn workflow_path(&self, workflow: &str) -> String {
        format!(
            "projects/{}/locations/{}/workflows/{}",
            self.project_id, self.location, workflow
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn parse_execution(body: &str, destination: &str) -> Result<Execution> {
        serde_json::from_str(body).map_err(|e| ActionError::Transport {
            destination: destination.to_string(),
            message: format!("unexpected execution response: {}", e),
        })
    }

    /// Starts one execution of `workflow` with `argument`.
    pub async fn create_execution(
        &self,
        workflow: &str,
        argument: String,
        deadline: Deadline,
    ) -> Result<ExecutionHandle> {
        let parent = self.workflow_path(workflow);
        let url = format!("{}/{}/executions", self.base, parent);
        let request = self
            .authorize(self.http.post(url))
            .json(&CreateExecutionRequest { argument });

        let response = send(request, &parent, "execution create", deadline).await?;
        let execution = Self::parse_execution(&response.body, &parent)?;
        info!(
            execution = %execution.name,
            state = %execution.state,
            "Workflow execution started"
        );
        Ok(ExecutionHandle::new(execution.name))
    }
}

#[async_trait]
impl ExecutionPoller for WorkflowsClient {
    async fn poll(&self, handle: &ExecutionHandle, deadline: Deadline) -> Result<ExecutionStatus> {
        let url = format!("{}/{}", self.base, handle.as_str());
        let request = self.authorize(self.http.get(url));
        let response = send(request, handle.as_str(), "execution poll", deadline).await?;
        let execution = Self::parse_execution(&response.body, handle.as_str())?;
        debug!(execution = %execution.name, state = %execution.state, "Polled execution");
        Ok(execution.into())
    }
}

/// Executes one named workflow.
pub struct WorkflowsDispatcher {
    client: WorkflowsClient,
    workflow: String,
    destination: String,
}

impl WorkflowsDispatcher {
    pub fn new(client: WorkflowsClient, workflow: impl Into<String>) -> Self {
        let workflow = workflow.into();
        let destination = client.workflow_path(&workflow);
        Self {
            client,
            workflow,
            destination,
        }
    }
}

#[async_trait]
impl Dispatcher for WorkflowsDispatcher {
    fn name(&self) -> &str {
        "workflows"
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    async fn dispatch(
        &self,
        payload: &DispatchPayload,
        deadline: Deadline,
    ) -> Result<Option<ExecutionHandle>> {
        let argument = payload.to_json()?;
        info!(workflow = %self.destination, "Creating workflow execution");
        info!(payload = %argument, "Payload");

        let handle = self
            .client
            .create_execution(&self.workflow, argument, deadline)
            .await?;
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EXECUTION: &str = "projects/proj/locations/us-central1/workflows/triage/executions/abc123";

    fn client(server: &MockServer, token: Option<&str>) -> WorkflowsClient {
        let endpoint = Url::parse(&server.uri()).unwrap();
        WorkflowsClient::new("proj", "us-central1", &endpoint, token.map(String::from)).unwrap()
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_dispatch_creates_execution_with_string_argument() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1/projects/proj/locations/us-central1/workflows/triage/executions",
            ))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"name": EXECUTION, "state": "ACTIVE"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let payload = DispatchPayload {
            alert_name: "HighCPU".into(),
            ..Default::default()
        };
        let d = WorkflowsDispatcher::new(client(&server, Some("tok")), "triage");
        assert_eq!(
            d.destination(),
            "projects/proj/locations/us-central1/workflows/triage"
        );

        let handle = d.dispatch(&payload, deadline()).await.unwrap();
        assert_eq!(handle, Some(ExecutionHandle::new(EXECUTION)));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let argument = body["argument"].as_str().unwrap();
        let decoded: Value = serde_json::from_str(argument).unwrap();
        assert_eq!(decoded["alertName"], json!("HighCPU"));
    }

    #[tokio::test]
    async fn test_create_rejection_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let err = WorkflowsDispatcher::new(client(&server, None), "triage")
            .dispatch(&DispatchPayload::default(), deadline())
            .await
            .unwrap_err();
        match err {
            ActionError::Delivery { source, .. } => assert_eq!(
                source,
                DeliveryError::Rejected {
                    status: 403,
                    body: "permission denied".into()
                }
            ),
            other => panic!("expected delivery error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_reads_state_and_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}", EXECUTION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": EXECUTION,
                "state": "SUCCEEDED",
                "result": "{\"ok\":true}"
            })))
            .mount(&server)
            .await;

        let status = client(&server, None)
            .poll(&ExecutionHandle::new(EXECUTION), deadline())
            .await
            .unwrap();
        assert_eq!(status.state, ExecutionState::Succeeded);
        assert_eq!(status.result.as_deref(), Some("{\"ok\":true}"));
        assert_eq!(status.error_payload, None);
    }

    #[tokio::test]
    async fn test_poll_surfaces_failure_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": EXECUTION,
                "state": "FAILED",
                "error": {"payload": "step 3 exploded", "context": "ctx"}
            })))
            .mount(&server)
            .await;

        let status = client(&server, None)
            .poll(&ExecutionHandle::new(EXECUTION), deadline())
            .await
            .unwrap();
        assert_eq!(status.state, ExecutionState::Failed);
        assert_eq!(status.error_payload.as_deref(), Some("step 3 exploded"));
    }

    #[tokio::test]
    async fn test_poll_error_status_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .poll(&ExecutionHandle::new(EXECUTION), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Delivery { .. }));
    }
}
