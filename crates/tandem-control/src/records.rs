//! Typed snapshots of control-plane records.
//!
//! Records are observe-only: managers never cache them, they only interpret
//! the most recent fetch. Field fallbacks live in named accessors so callers
//! never poke at optional wire fields directly.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_abstraction::TrainerEndpoint;

const JOB_STATE_PREFIX: &str = "JOB_STATE_";
const DEPLOYMENT_STATE_PREFIX: &str = "DEPLOYMENT_STATE_";

/// Returns the last `/`-separated segment of a resource name.
fn last_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Lifecycle state of a trainer job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Creating,
    Running,
    Failed,
    Cancelled,
    Paused,
    Completed,
    Deleting,
    /// Any state this client does not recognise, kept verbatim.
    Unknown(String),
}

impl JobState {
    /// Parses a wire state, with or without the `JOB_STATE_` prefix.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        match upper.strip_prefix(JOB_STATE_PREFIX).unwrap_or(upper.as_str()) {
            "CREATING" | "PENDING" => Self::Creating,
            "RUNNING" => Self::Running,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            "PAUSED" => Self::Paused,
            "COMPLETED" => Self::Completed,
            "DELETING" => Self::Deleting,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Deleting => "DELETING",
            Self::Unknown(raw) => raw,
        }
    }

    /// States from which a resume call is accepted.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Paused | Self::Completed)
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::Unknown("JOB_STATE_UNSPECIFIED".to_string())
    }
}

impl From<String> for JobState {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Unknown(raw) => raw,
            known => format!("{JOB_STATE_PREFIX}{}", known.as_str()),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an inference deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentState {
    Creating,
    Ready,
    Deleting,
    Failed,
    Deleted,
    Updating,
    Unknown(String),
}

impl DeploymentState {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        match upper.strip_prefix(DEPLOYMENT_STATE_PREFIX).unwrap_or(upper.as_str()) {
            "CREATING" => Self::Creating,
            "READY" => Self::Ready,
            "DELETING" => Self::Deleting,
            "FAILED" => Self::Failed,
            "DELETED" => Self::Deleted,
            "UPDATING" => Self::Updating,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "CREATING",
            Self::Ready => "READY",
            Self::Deleting => "DELETING",
            Self::Failed => "FAILED",
            Self::Deleted => "DELETED",
            Self::Updating => "UPDATING",
            Self::Unknown(raw) => raw,
        }
    }

    /// States an existing deployment cannot be reused from.
    #[must_use]
    pub fn needs_recreate(&self) -> bool {
        matches!(self, Self::Failed | Self::Deleted | Self::Deleting)
    }
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::Unknown("STATE_UNSPECIFIED".to_string())
    }
}

impl From<String> for DeploymentState {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<DeploymentState> for String {
    fn from(state: DeploymentState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status block attached to records (`{code, message}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatus {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Last-fetched snapshot of a trainer job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Resource name, e.g. `accounts/acme/trainerJobs/abc123`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_route_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

impl JobRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, state: JobState) -> Self {
        Self { name: name.into(), state, ..Self::default() }
    }

    #[must_use]
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.status = Some(RecordStatus { code: Some("FAILED".to_string()), message: Some(message.into()) });
        self
    }

    /// Short job id (last segment of the resource name).
    #[must_use]
    pub fn job_id(&self) -> &str {
        last_segment(&self.name)
    }

    /// Reachable base address: the direct route handle, then the endpoint
    /// URL. A bare `host:port` gets an `http://` scheme; trailing slashes are
    /// dropped.
    #[must_use]
    pub fn endpoint_url(&self) -> Option<String> {
        let raw = non_empty(self.direct_route_handle.as_ref())
            .or_else(|| non_empty(self.endpoint_url.as_ref()))?;
        let url = if raw.contains("://") { raw.to_string() } else { format!("http://{raw}") };
        Some(url.trim_end_matches('/').to_string())
    }

    /// Human-readable failure reason: status message, then the error field.
    #[must_use]
    pub fn failure_message(&self) -> String {
        non_empty(self.status.as_ref().and_then(|s| s.message.as_ref()))
            .or_else(|| non_empty(self.error.as_ref()))
            .unwrap_or("no failure message reported")
            .to_string()
    }

    /// Endpoint value for this record, if it reports an address.
    #[must_use]
    pub fn endpoint(&self) -> Option<TrainerEndpoint> {
        self.endpoint_url().map(|url| TrainerEndpoint::new(self.name.clone(), self.job_id(), url))
    }
}

/// Last-fetched snapshot of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Resource name, e.g. `accounts/acme/deployments/rl-serve`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "hotLoadBucket")]
    pub hot_load_bucket_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, state: DeploymentState) -> Self {
        Self { name: name.into(), state, ..Self::default() }
    }

    #[must_use]
    pub fn deployment_id(&self) -> &str {
        last_segment(&self.name)
    }

    /// Model identifier inference requests should use: the explicit field,
    /// else `{base_model}#{name}` when a base model is known.
    #[must_use]
    pub fn inference_model(&self) -> Option<String> {
        if let Some(model) = non_empty(self.inference_model.as_ref()) {
            return Some(model.to_string());
        }
        non_empty(self.base_model.as_ref()).map(|base| format!("{base}#{}", self.name))
    }

    #[must_use]
    pub fn hotload_bucket(&self) -> Option<&str> {
        non_empty(self.hot_load_bucket_url.as_ref())
    }

    #[must_use]
    pub fn failure_message(&self) -> String {
        non_empty(self.status.as_ref().and_then(|s| s.message.as_ref()))
            .unwrap_or("no failure message reported")
            .to_string()
    }
}
