//! JSON/HTTP implementation of the engine client
//!
//! Attaches the session's bearer token to every request, applies the failure
//! policy, and publishes exactly one notification per failed request.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{EngineApi, EngineError, StepExecution};
use crate::config::EngineConfig;
use crate::domain::{
    Agent, ApiResponse, ApprovalRequest, DashboardStats, ExecutionPlan, ExecutionPlanStatus, FlowDocument,
    PromptRequest, PromptResponse, parse_flow_document,
};
use crate::notify::NotificationBus;
use crate::session::Session;

/// Engine client over reqwest
pub struct HttpEngineClient {
    base_url: String,
    flow_path: String,
    step_execute_path: String,
    http: Client,
    session: Arc<Session>,
    notifications: NotificationBus,
}

impl HttpEngineClient {
    /// Create a client from configuration
    ///
    /// `timeout-ms: 0` leaves requests unbounded.
    pub fn from_config(
        config: &EngineConfig,
        session: Arc<Session>,
        notifications: NotificationBus,
    ) -> Result<Self, EngineError> {
        debug!(base_url = %config.base_url, timeout_ms = config.timeout_ms, "from_config: called");
        let mut builder = Client::builder();
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }
        let http = builder.build().map_err(EngineError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            flow_path: config.flow_path.clone(),
            step_execute_path: config.step_execute_path.clone(),
            http,
            session,
            notifications,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Send one request and return the body of a 2xx response
    async fn send(&self, method: Method, path: &str, body: Option<Value>, resource: &str) -> Result<Vec<u8>, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "send: called");

        let token = self.session.token();
        let mut request = self.http.request(method, &url);
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "send: network error");
                return Err(self.fail(EngineError::Network(e)));
            }
        };

        let status = response.status().as_u16();
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return Err(self.fail(EngineError::Network(e))),
        };

        if !(200..300).contains(&status) {
            debug!(status, %resource, "send: engine returned failure");
            let reauth = status == 401 && self.session.revoke(token.as_deref());
            return Err(self.fail(EngineError::from_response(status, &bytes, resource, reauth)));
        }

        debug!(status, len = bytes.len(), "send: success");
        Ok(bytes.to_vec())
    }

    /// Publish the failure's notification, then hand the error back
    fn fail(&self, err: EngineError) -> EngineError {
        warn!(error = %err, "request failed");
        if let Some(notification) = err.notification() {
            self.notifications.publish(notification);
        }
        err
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8], what: &str) -> Result<T, EngineError> {
        serde_json::from_slice(bytes).map_err(|e| self.fail(EngineError::Decode(format!("{}: {}", what, e))))
    }

    /// Acknowledgements may arrive with an empty body
    fn decode_ack(&self, bytes: &[u8], what: &str) -> Result<ApiResponse, EngineError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ApiResponse {
                success: true,
                ..Default::default()
            });
        }
        self.decode(bytes, what)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, resource: &str) -> Result<T, EngineError> {
        let bytes = self.send(Method::GET, path, None, resource).await?;
        self.decode(&bytes, resource)
    }

    async fn post_ack(&self, path: &str, body: Option<Value>, resource: &str) -> Result<ApiResponse, EngineError> {
        let bytes = self.send(Method::POST, path, body, resource).await?;
        self.decode_ack(&bytes, resource)
    }
}

/// Substitute `{planId}`/`{stepId}` placeholders with encoded segments
pub(crate) fn fill_path(template: &str, plan_id: &str, step_id: Option<&str>) -> String {
    let path = template.replace("{planId}", &encode_segment(plan_id));
    match step_id {
        Some(step_id) => path.replace("{stepId}", &encode_segment(step_id)),
        None => path,
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set
pub(crate) fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Decode(format!("request body: {}", e)))
}

#[async_trait]
impl EngineApi for HttpEngineClient {
    async fn list_plans(&self) -> Result<Vec<ExecutionPlan>, EngineError> {
        debug!("list_plans: called");
        self.get("/execution-plans", "execution plans").await
    }

    async fn get_flow(&self, plan_id: &str) -> Result<FlowDocument, EngineError> {
        debug!(%plan_id, "get_flow: called");
        let path = fill_path(&self.flow_path, plan_id, None);
        let bytes = self.send(Method::GET, &path, None, &format!("plan {}", plan_id)).await?;
        parse_flow_document(&bytes).map_err(|e| self.fail(EngineError::Validation(e)))
    }

    async fn execute_step(&self, plan_id: &str, execution: &StepExecution) -> Result<ApiResponse, EngineError> {
        debug!(%plan_id, step_id = %execution.step_id, flow_path = %execution.flow_path, "execute_step: called");
        let path = fill_path(&self.step_execute_path, plan_id, Some(&execution.step_id));
        let body = to_body(execution)?;
        self.post_ack(&path, Some(body), &format!("step {}", execution.step_id)).await
    }

    async fn execute_flow(&self, plan_id: &str) -> Result<ApiResponse, EngineError> {
        debug!(%plan_id, "execute_flow: called");
        let path = format!("/execution-plans/{}/execute", encode_segment(plan_id));
        self.post_ack(&path, None, &format!("plan {}", plan_id)).await
    }

    async fn plan_status(&self, plan_id: &str) -> Result<ExecutionPlanStatus, EngineError> {
        debug!(%plan_id, "plan_status: called");
        let path = format!("/master-agent/execution/{}/status", encode_segment(plan_id));
        self.get(&path, &format!("execution {}", plan_id)).await
    }

    async fn plan_agents(&self, plan_id: &str) -> Result<Vec<Agent>, EngineError> {
        debug!(%plan_id, "plan_agents: called");
        let path = format!("/master-agent/execution/{}/agents", encode_segment(plan_id));
        self.get(&path, &format!("execution {}", plan_id)).await
    }

    async fn stop_execution(&self, plan_id: &str) -> Result<ApiResponse, EngineError> {
        debug!(%plan_id, "stop_execution: called");
        let path = format!("/master-agent/execution/{}/stop", encode_segment(plan_id));
        self.post_ack(&path, None, &format!("execution {}", plan_id)).await
    }

    async fn submit_approval(
        &self,
        plan_id: &str,
        step_id: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<ApiResponse, EngineError> {
        debug!(%plan_id, %step_id, approved, "submit_approval: called");
        let path = format!(
            "/master-agent/execution/{}/steps/{}/approval",
            encode_segment(plan_id),
            encode_segment(step_id)
        );
        let body = to_body(&ApprovalRequest { approved, feedback })?;
        self.post_ack(&path, Some(body), &format!("step {}", step_id)).await
    }

    async fn process_prompt(&self, request: &PromptRequest) -> Result<PromptResponse, EngineError> {
        debug!(prompt_len = request.prompt.len(), "process_prompt: called");
        let body = to_body(request)?;
        let bytes = self.send(Method::POST, "/master-agent/process", Some(body), "prompt").await?;
        self.decode(&bytes, "prompt")
    }

    async fn active_executions(&self) -> Result<Vec<ExecutionPlanStatus>, EngineError> {
        debug!("active_executions: called");
        self.get("/monitoring/active-executions", "active executions").await
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, EngineError> {
        debug!("dashboard_stats: called");
        self.get("/analytics/dashboard-stats", "dashboard stats").await
    }
}
