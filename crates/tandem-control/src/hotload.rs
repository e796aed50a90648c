//! Hotload protocol: push a weight snapshot to a deployment and wait until
//! every replica serves it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::deployments::DeploymentManager;
use crate::error::{ControlError, ControlResult};

pub const DEFAULT_COMPRESSION_FORMAT: &str = "arc_v2";
pub const DEFAULT_CHECKSUM_FORMAT: &str = "alder32";

/// The only loading stage with a defined meaning.
pub const ERROR_STAGE: &str = "error";

/// Reference data a delta snapshot needs to be applied.
///
/// All three fields are always present together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalMetadata {
    pub previous_snapshot_identity: String,
    pub compression_format: String,
    pub checksum_format: String,
}

impl IncrementalMetadata {
    #[must_use]
    pub fn new(
        previous_snapshot_identity: impl Into<String>,
        compression_format: impl Into<String>,
        checksum_format: impl Into<String>,
    ) -> Self {
        Self {
            previous_snapshot_identity: previous_snapshot_identity.into(),
            compression_format: compression_format.into(),
            checksum_format: checksum_format.into(),
        }
    }

    /// Metadata with the default compression and checksum formats.
    #[must_use]
    pub fn with_defaults(previous_snapshot_identity: impl Into<String>) -> Self {
        Self::new(previous_snapshot_identity, DEFAULT_COMPRESSION_FORMAT, DEFAULT_CHECKSUM_FORMAT)
    }
}

/// Body of a hotload push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotloadRequest {
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_snapshot_metadata: Option<IncrementalMetadata>,
}

impl HotloadRequest {
    #[must_use]
    pub fn new(identity: impl Into<String>, incremental: Option<IncrementalMetadata>) -> Self {
        Self { identity: identity.into(), incremental_snapshot_metadata: incremental }
    }

    #[must_use]
    pub fn is_delta(&self) -> bool {
        self.incremental_snapshot_metadata.is_some()
    }
}

/// Acknowledgement of a hotload push. Fields are informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotloadAck {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingState {
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Hotload view of one replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    #[serde(default)]
    pub current_snapshot_identity: Option<String>,
    #[serde(default)]
    pub loading_state: Option<LoadingState>,
    #[serde(default)]
    pub readiness: bool,
}

impl ReplicaStatus {
    /// A ready replica serving `identity`.
    #[must_use]
    pub fn serving(identity: impl Into<String>) -> Self {
        Self { current_snapshot_identity: Some(identity.into()), loading_state: None, readiness: true }
    }

    #[must_use]
    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            current_snapshot_identity: None,
            loading_state: Some(LoadingState { stage: Some(ERROR_STAGE.to_string()), message: Some(message.into()) }),
            readiness: false,
        }
    }

    #[must_use]
    pub fn is_errored(&self) -> bool {
        self.loading_state.as_ref().and_then(|s| s.stage.as_deref()) == Some(ERROR_STAGE)
    }

    #[must_use]
    pub fn serves(&self, identity: &str) -> bool {
        self.readiness && self.current_snapshot_identity.as_deref() == Some(identity)
    }
}

/// Per-replica hotload status of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotloadStatus {
    #[serde(default)]
    pub replicas: Vec<ReplicaStatus>,
}

impl HotloadStatus {
    /// No replicas yet: capacity is still being provisioned.
    #[must_use]
    pub fn is_scaling_up(&self) -> bool {
        self.replicas.is_empty()
    }

    #[must_use]
    pub fn errored_replica(&self) -> Option<&ReplicaStatus> {
        self.replicas.iter().find(|r| r.is_errored())
    }

    /// True when there is at least one replica and every replica is ready
    /// and serving `identity`.
    #[must_use]
    pub fn is_serving(&self, identity: &str) -> bool {
        !self.replicas.is_empty() && self.replicas.iter().all(|r| r.serves(identity))
    }

    /// Snapshot identity reported by the first replica that has one.
    #[must_use]
    pub fn current_identity(&self) -> Option<&str> {
        self.replicas.iter().find_map(|r| r.current_snapshot_identity.as_deref())
    }
}

/// How a hotload wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HotloadOutcome {
    Loaded,
    Errored(String),
    TimedOut(Duration),
}

impl DeploymentManager {
    /// Pushes a snapshot to a deployment.
    ///
    /// `model` is the deployment's base model; it and the deployment id
    /// address the request.
    pub async fn hotload(
        &self,
        deployment_id: &str,
        model: &str,
        snapshot_identity: &str,
        incremental: Option<IncrementalMetadata>,
    ) -> ControlResult<HotloadAck> {
        let request = HotloadRequest::new(snapshot_identity, incremental);
        info!(
            deployment_id,
            snapshot = snapshot_identity,
            delta = request.is_delta(),
            previous = ?request.incremental_snapshot_metadata.as_ref().map(|m| &m.previous_snapshot_identity),
            "Pushing hotload"
        );
        self.plane.push_hotload(deployment_id, model, &request).await
    }

    pub async fn hotload_check_status(&self, deployment_id: &str, model: &str) -> ControlResult<HotloadStatus> {
        self.plane.hotload_status(deployment_id, model).await
    }

    /// Snapshot identity the deployment currently reports, if any.
    pub async fn current_snapshot_identity(&self, deployment_id: &str, model: &str) -> ControlResult<Option<String>> {
        let status = self.hotload_check_status(deployment_id, model).await?;
        Ok(status.current_identity().map(str::to_string))
    }

    /// Polls until the deployment serves `expected_identity`.
    ///
    /// Returns false immediately when a replica reports the error stage, and
    /// false once `timeout` has elapsed. Poll failures are logged and retried.
    pub async fn wait_for_hotload(
        &self,
        deployment_id: &str,
        model: &str,
        expected_identity: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> bool {
        self.await_hotload(deployment_id, model, expected_identity, timeout, poll_interval).await
            == HotloadOutcome::Loaded
    }

    async fn await_hotload(
        &self,
        deployment_id: &str,
        model: &str,
        expected_identity: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> HotloadOutcome {
        let started = Instant::now();

        loop {
            match self.plane.hotload_status(deployment_id, model).await {
                Ok(status) => {
                    if let Some(replica) = status.errored_replica() {
                        let message = replica
                            .loading_state
                            .as_ref()
                            .and_then(|s| s.message.clone())
                            .unwrap_or_else(|| "replica reported error stage".to_string());
                        error!(deployment_id, snapshot = expected_identity, error = %message, "Hotload failed");
                        return HotloadOutcome::Errored(message);
                    }
                    if status.is_serving(expected_identity) {
                        info!(
                            deployment_id,
                            snapshot = expected_identity,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "Hotload complete"
                        );
                        return HotloadOutcome::Loaded;
                    }
                    if status.is_scaling_up() {
                        debug!(deployment_id, "No replicas reported yet");
                    } else {
                        debug!(
                            deployment_id,
                            expected = expected_identity,
                            current = ?status.current_identity(),
                            "Waiting for hotload"
                        );
                    }
                }
                Err(e) => warn!(deployment_id, error = %e, "Failed to poll hotload status, retrying"),
            }

            let waited = started.elapsed();
            if waited >= timeout {
                warn!(deployment_id, snapshot = expected_identity, waited_secs = waited.as_secs(), "Hotload timed out");
                return HotloadOutcome::TimedOut(waited);
            }
            sleep(poll_interval).await;
        }
    }

    /// Pushes a snapshot and waits for it to be served.
    ///
    /// # Errors
    /// Propagates push failures; `HotloadFailed` on a replica error stage and
    /// `HotloadTimeout` when the deadline passes.
    pub async fn hotload_and_wait(
        &self,
        deployment_id: &str,
        model: &str,
        snapshot_identity: &str,
        incremental: Option<IncrementalMetadata>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> ControlResult<()> {
        self.hotload(deployment_id, model, snapshot_identity, incremental).await?;
        match self.await_hotload(deployment_id, model, snapshot_identity, timeout, poll_interval).await {
            HotloadOutcome::Loaded => Ok(()),
            HotloadOutcome::Errored(message) => Err(ControlError::HotloadFailed {
                deployment_id: deployment_id.to_string(),
                snapshot: snapshot_identity.to_string(),
                message,
            }),
            HotloadOutcome::TimedOut(waited) => Err(ControlError::HotloadTimeout {
                deployment_id: deployment_id.to_string(),
                snapshot: snapshot_identity.to_string(),
                waited,
            }),
        }
    }

    /// Sends a minimal inference request until one succeeds.
    ///
    /// Best effort: returns false after `max_retries` failed attempts.
    pub async fn warmup(&self, model: &str, max_retries: u32, retry_interval: Duration) -> bool {
        for attempt in 1..=max_retries.max(1) {
            match self.plane.warmup_request(model).await {
                Ok(()) => {
                    debug!(model, attempt, "Warmup request succeeded");
                    return true;
                }
                Err(e) => {
                    debug!(model, attempt, error = %e, "Warmup request failed");
                    if attempt < max_retries {
                        sleep(retry_interval).await;
                    }
                }
            }
        }
        warn!(model, attempts = max_retries.max(1), "Deployment warmup failed");
        false
    }
}
