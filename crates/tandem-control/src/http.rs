//! `reqwest`-backed control-plane client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::config::ControlPlaneConfig;
use crate::deployments::DeploymentConfig;
use crate::error::{ControlError, ControlResult};
use crate::hotload::{HotloadAck, HotloadRequest, HotloadStatus};
use crate::plane::ControlPlane;
use crate::records::{DeploymentRecord, JobRecord};
use crate::retry::{is_retryable_status, retry_transient};
use crate::trainer_jobs::TrainerJobConfig;

/// Path of the hotload endpoint on the inference gateway.
pub const HOTLOAD_PATH: &str = "/hot_load/v1/models/hot_load";

/// Path of the trainer liveness probe.
pub const HEALTH_PATH: &str = "/health";

/// Path of the completion endpoint used for warmup.
pub const COMPLETIONS_PATH: &str = "/inference/v1/completions";

pub const MODEL_HEADER: &str = "x-model";
pub const DEPLOYMENT_HEADER: &str = "x-deployment";

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Control-plane client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    config: ControlPlaneConfig,
    client: Client,
    probe_client: Client,
}

impl HttpControlPlane {
    /// Creates a client from a validated configuration.
    ///
    /// # Errors
    /// Returns `ControlError::Config` if the configuration is incomplete or
    /// the HTTP client cannot be built.
    pub fn new(config: ControlPlaneConfig) -> ControlResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ControlError::Config(format!("Failed to build HTTP client: {e}")))?;
        let probe_client = Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| ControlError::Config(format!("Failed to build probe client: {e}")))?;
        Ok(Self { config, client, probe_client })
    }

    #[must_use]
    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/v1/accounts/{}/{}", self.config.base_url(), self.config.account_id, path)
    }

    /// Fully-qualified deployment name, as the inference gateway expects it.
    fn deployment_name(&self, deployment_id: &str) -> String {
        format!("accounts/{}/deployments/{}", self.config.account_id, deployment_id)
    }

    fn hotload_url(&self) -> String {
        format!("{}{}", self.config.inference_url(), HOTLOAD_PATH)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        self.config
            .extra_headers
            .iter()
            .fold(builder.bearer_auth(&self.config.api_key), |b, (name, value)| b.header(name, value))
    }

    fn hotload_headers(&self, builder: RequestBuilder, deployment_id: &str, model: &str) -> RequestBuilder {
        self.authorized(builder)
            .header(MODEL_HEADER, model)
            .header(DEPLOYMENT_HEADER, self.deployment_name(deployment_id))
    }

    /// Sends one request and returns the body of a 2xx response.
    async fn send_once(&self, request: RequestBuilder) -> ControlResult<String> {
        let response = request.send().await.map_err(classify_request_error)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ControlError::Transient(format!("Failed to read response body: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = extract_error_message(&body);
        if is_retryable_status(status.as_u16()) {
            debug!(status = %status, error = %message, "Control plane returned retryable status");
            Err(ControlError::Transient(format!("HTTP {}: {}", status.as_u16(), message)))
        } else {
            debug!(status = %status, error = %message, "Control plane returned error status");
            Err(ControlError::Api { status: status.as_u16(), message })
        }
    }

    /// Sends a request under the retry policy. `build` is invoked once per attempt.
    async fn call<F>(&self, operation: &str, build: F) -> ControlResult<String>
    where
        F: Fn() -> RequestBuilder + Send,
    {
        let this = self;
        retry_transient(&self.config.retry, operation, move || {
            let request = build();
            async move { this.send_once(request).await }
        })
        .await
        .inspect_err(|e| {
            if !e.is_not_found() {
                error!(operation, error = %e, "Control-plane call failed");
            }
        })
    }

    async fn call_json<T, F>(&self, operation: &str, build: F) -> ControlResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send,
    {
        let body = self.call(operation, build).await?;
        parse_body(operation, &body)
    }
}

fn classify_request_error(err: reqwest::Error) -> ControlError {
    if err.is_builder() {
        ControlError::Config(format!("Invalid request: {err}"))
    } else {
        ControlError::Transient(format!("Network error: {err}"))
    }
}

fn parse_body<T: DeserializeOwned>(operation: &str, body: &str) -> ControlResult<T> {
    serde_json::from_str(body).map_err(|e| {
        error!(operation, error = %e, "Failed to parse control-plane response");
        ControlError::Serialization(format!("Failed to parse {operation} response: {e}"))
    })
}

/// Pulls a human-readable message out of an error body.
///
/// Looks at `error` (a string, or an object with `message`), then
/// `message`, else returns the raw body cut to 500 characters.
#[must_use]
pub fn extract_error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        match map.get("error") {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Object(inner)) => {
                if let Some(Value::String(s)) = inner.get("message") {
                    return s.clone();
                }
            }
            _ => {}
        }
        if let Some(Value::String(s)) = map.get("message") {
            return s.clone();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_trainer_job(&self, config: &TrainerJobConfig) -> ControlResult<JobRecord> {
        debug!(display_name = ?config.display_name, base_model = %config.base_model, "Creating trainer job");
        let url = self.account_url("trainerJobs");
        self.call_json("create_trainer_job", || {
            let mut request = self.authorized(self.client.post(&url)).json(config);
            if let Some(job_id) = &config.job_id {
                request = request.query(&[("trainerJobId", job_id)]);
            }
            request
        })
        .await
    }

    async fn get_trainer_job(&self, job_id: &str) -> ControlResult<JobRecord> {
        let url = self.account_url(&format!("trainerJobs/{job_id}"));
        self.call_json("get_trainer_job", || self.authorized(self.client.get(&url))).await
    }

    async fn resume_trainer_job(&self, job_id: &str) -> ControlResult<JobRecord> {
        debug!(job_id, "Resuming trainer job");
        let url = self.account_url(&format!("trainerJobs/{job_id}:resume"));
        self.call_json("resume_trainer_job", || self.authorized(self.client.post(&url)).json(&json!({})))
            .await
    }

    async fn delete_trainer_job(&self, job_id: &str) -> ControlResult<()> {
        let url = self.account_url(&format!("trainerJobs/{job_id}"));
        self.call("delete_trainer_job", || self.authorized(self.client.delete(&url))).await.map(|_| ())
    }

    async fn probe_endpoint(&self, base_url: &str) -> bool {
        let url = format!("{}{}", base_url.trim_end_matches('/'), HEALTH_PATH);
        match self.probe_client.get(&url).send().await {
            Ok(response) => {
                let healthy = response.status() == StatusCode::OK;
                debug!(url = %url, status = %response.status(), healthy, "Liveness probe");
                healthy
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Liveness probe failed");
                false
            }
        }
    }

    async fn create_deployment(&self, config: &DeploymentConfig) -> ControlResult<DeploymentRecord> {
        debug!(deployment_id = %config.deployment_id, base_model = %config.base_model, "Creating deployment");
        let url = self.account_url("deployments");
        self.call_json("create_deployment", || {
            self.authorized(self.client.post(&url))
                .query(&[("deploymentId", config.deployment_id.as_str())])
                .json(config)
        })
        .await
    }

    async fn get_deployment(&self, deployment_id: &str) -> ControlResult<DeploymentRecord> {
        let url = self.account_url(&format!("deployments/{deployment_id}"));
        self.call_json("get_deployment", || self.authorized(self.client.get(&url))).await
    }

    async fn delete_deployment(&self, deployment_id: &str) -> ControlResult<()> {
        let url = self.account_url(&format!("deployments/{deployment_id}"));
        self.call("delete_deployment", || self.authorized(self.client.delete(&url))).await.map(|_| ())
    }

    async fn scale_deployment(&self, deployment_id: &str, replicas: u32) -> ControlResult<DeploymentRecord> {
        debug!(deployment_id, replicas, "Scaling deployment");
        let url = self.account_url(&format!("deployments/{deployment_id}"));
        let body = json!({ "minReplicaCount": replicas, "maxReplicaCount": replicas });
        self.call_json("scale_deployment", || {
            self.authorized(self.client.patch(&url))
                .query(&[("updateMask", "minReplicaCount,maxReplicaCount")])
                .json(&body)
        })
        .await
    }

    async fn push_hotload(
        &self,
        deployment_id: &str,
        model: &str,
        request: &HotloadRequest,
    ) -> ControlResult<HotloadAck> {
        debug!(deployment_id, model, snapshot = %request.identity, "Pushing hotload request");
        let url = self.hotload_url();
        let body = self
            .call("push_hotload", || {
                self.hotload_headers(self.client.post(&url), deployment_id, model).json(request)
            })
            .await?;
        if body.trim().is_empty() {
            return Ok(HotloadAck::default());
        }
        parse_body("push_hotload", &body)
    }

    async fn hotload_status(&self, deployment_id: &str, model: &str) -> ControlResult<HotloadStatus> {
        let request = self.hotload_headers(self.client.get(self.hotload_url()), deployment_id, model);
        let body = self.send_once(request).await?;
        parse_body("hotload_status", &body)
    }

    async fn warmup_request(&self, model: &str) -> ControlResult<()> {
        let url = format!("{}{}", self.config.inference_url(), COMPLETIONS_PATH);
        let body = json!({ "model": model, "prompt": "Hello", "max_tokens": 1 });
        self.send_once(self.authorized(self.client.post(&url)).json(&body)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_string_field() {
        assert_eq!(extract_error_message(r#"{"error": "quota exceeded"}"#), "quota exceeded");
    }

    #[test]
    fn test_extract_error_object_field() {
        let body = r#"{"error": {"code": 400, "message": "invalid acceleratorType"}}"#;
        assert_eq!(extract_error_message(body), "invalid acceleratorType");
    }

    #[test]
    fn test_extract_message_field() {
        assert_eq!(extract_error_message(r#"{"message": "not found", "code": 5}"#), "not found");
    }

    #[test]
    fn test_extract_raw_body_truncated() {
        let body = "x".repeat(800);
        assert_eq!(extract_error_message(&body).len(), MAX_ERROR_BODY_CHARS);
        assert_eq!(extract_error_message("<html>Bad Gateway</html>"), "<html>Bad Gateway</html>");
        assert_eq!(extract_error_message("   "), "empty response body");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ControlPlaneConfig::new("", "key");
        assert!(matches!(HttpControlPlane::new(config), Err(ControlError::Config(_))));
    }

    #[test]
    fn test_deployment_name() {
        let plane = HttpControlPlane::new(ControlPlaneConfig::new("acme", "key")).unwrap();
        assert_eq!(plane.deployment_name("serve-1"), "accounts/acme/deployments/serve-1");
        assert_eq!(plane.account_url("trainerJobs"), "http://localhost:8080/v1/accounts/acme/trainerJobs");
    }
}
