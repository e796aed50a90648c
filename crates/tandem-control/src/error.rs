//! Error types for control-plane operations.

use std::time::Duration;

use thiserror::Error;

use crate::records::JobState;

/// Result type for control-plane operations.
pub type ControlResult<T> = std::result::Result<T, ControlError>;

/// Errors raised by the trainer-job and deployment managers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The trainer job reached `FAILED` before becoming ready.
    #[error("Trainer job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// The trainer job did not become ready within its deadline.
    #[error("Trainer job {job_id} not ready after {waited:?}")]
    JobTimeout { job_id: String, waited: Duration },

    /// The trainer job never left a transitional state while reconnecting.
    #[error("Trainer job {job_id} stuck in {state} for {waited:?}")]
    StuckJob { job_id: String, state: JobState, waited: Duration },

    /// The deployment reached `FAILED` before becoming ready.
    #[error("Deployment {deployment_id} failed: {message}")]
    DeploymentFailed { deployment_id: String, message: String },

    /// The deployment did not become ready (or go away) within its deadline.
    #[error("Deployment {deployment_id} not ready after {waited:?}")]
    DeploymentTimeout { deployment_id: String, waited: Duration },

    /// A replica reported an error stage while loading a snapshot.
    #[error("Hotload of {snapshot} on {deployment_id} failed: {message}")]
    HotloadFailed { deployment_id: String, snapshot: String, message: String },

    /// The deployment never reported the snapshot as loaded and ready.
    #[error("Hotload of {snapshot} on {deployment_id} not confirmed after {waited:?}")]
    HotloadTimeout { deployment_id: String, snapshot: String, waited: Duration },

    /// Network failure, 5xx, 408, 409 or 429. Retried until the wait budget runs out.
    #[error("Transient Error: {0}")]
    Transient(String),

    /// Non-retryable API response.
    #[error("API Error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A request or response body could not be (de)serialized.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// Invalid or missing configuration.
    #[error("Configuration Error: {0}")]
    Config(String),
}

impl ControlError {
    /// Whether the failure is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the control plane answered 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Whether the error is one of the deadline-expiry kinds.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::JobTimeout { .. }
                | Self::DeploymentTimeout { .. }
                | Self::HotloadTimeout { .. }
                | Self::StuckJob { .. }
        )
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
