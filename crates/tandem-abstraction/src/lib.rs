//! Trainer compute abstraction layer for Tandem.
//!
//! This module defines the core traits and types shared by the control-plane
//! managers and the training-side wrappers: the trainer endpoint value, the
//! checkpoint kinds, and the opaque compute surface a running trainer job
//! exposes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Represents an error returned by a trainer's compute surface.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeError {
    /// The trainer could not be reached (connection refused, reset, timed out).
    #[error("Connection Error: {0}")]
    Connection(String),

    /// The trainer answered but no longer knows the session (typically after a preemption).
    #[error("Not Found: {0}")]
    NotFound(String),

    /// The trainer rejected the request as malformed.
    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// The trainer failed while executing an otherwise valid request.
    #[error("Trainer Error: {0}")]
    Trainer(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// Other unexpected errors.
    #[error("Other Compute Error: {0}")]
    Other(String),
}

impl ComputeError {
    /// Whether this failure means the trainer connection is gone and a
    /// reconnect (rather than a plain retry or a hard stop) is the remedy.
    #[must_use]
    pub fn is_reconnectable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotFound(_))
    }
}

/// Kind of weight snapshot requested from a trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointType {
    /// Self-contained snapshot, loadable without reference to any other.
    #[default]
    Base,
    /// Diff against the previously hotloaded snapshot.
    Delta,
}

impl CheckpointType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Delta => "delta",
        }
    }
}

impl fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reachable trainer job.
///
/// Produced once a job is both running and answering its liveness probe.
/// Never mutated: a reconnect produces a fresh value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerEndpoint {
    job_name: String,
    job_id: String,
    base_url: String,
}

impl TrainerEndpoint {
    #[must_use]
    pub fn new(job_name: impl Into<String>, job_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self { job_name: job_name.into(), job_id: job_id.into(), base_url: base_url.into() }
    }

    /// Fully-qualified resource name (e.g. `accounts/acme/trainerJobs/abc123`).
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Short job identifier (last segment of the resource name).
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Base address of the trainer's compute API, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Optimizer step parameters (Adam).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamParams {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    #[serde(default)]
    pub weight_decay: f64,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self { learning_rate: 1e-5, beta1: 0.9, beta2: 0.95, eps: 1e-8, weight_decay: 0.0 }
    }
}

/// Result of a save-for-sampler call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedWeights {
    /// Snapshot identity a deployment can be asked to hotload.
    pub snapshot_name: String,
    /// Storage location reported by the trainer, if any.
    #[serde(default)]
    pub path: Option<String>,
    pub checkpoint_type: CheckpointType,
}

/// The compute surface of a running trainer job.
///
/// Batches and outputs are opaque JSON: the wire protocol belongs to the
/// trainer, not to this crate. Implementations must be `Send + Sync` so one
/// client can be shared across tasks.
#[async_trait]
pub trait TrainerCompute: Send + Sync {
    /// Runs a forward pass and returns the trainer's outputs.
    async fn forward(&self, batch: &Value) -> Result<Value, ComputeError>;

    /// Runs forward and backward with a named custom loss.
    async fn forward_backward_custom(&self, batch: &Value, loss_fn: &str) -> Result<Value, ComputeError>;

    /// Applies one optimizer step with the accumulated gradients.
    async fn optim_step(&self, params: &AdamParams) -> Result<Value, ComputeError>;

    /// Saves a resumption checkpoint (weights + optimizer state) and returns its path.
    async fn save_state(&self, name: &str) -> Result<String, ComputeError>;

    /// Saves a servable weight snapshot of the requested kind.
    async fn save_weights_for_sampler(
        &self,
        name: &str,
        checkpoint_type: CheckpointType,
    ) -> Result<SavedWeights, ComputeError>;

    /// Restores weights and optimizer state from a resolved checkpoint path.
    async fn load_state_with_optimizer(&self, path: &str) -> Result<(), ComputeError>;

    /// Lists resumption checkpoints the trainer holds.
    async fn list_checkpoints(&self) -> Result<Vec<String>, ComputeError>;
}

/// Builds a compute client bound to a trainer endpoint.
#[async_trait]
pub trait TrainerConnector: Send + Sync {
    /// Connects to `endpoint` and returns a client for its compute surface.
    ///
    /// # Errors
    /// Returns a `ComputeError` if the endpoint cannot be reached.
    async fn connect(&self, endpoint: &TrainerEndpoint) -> Result<Arc<dyn TrainerCompute>, ComputeError>;
}
