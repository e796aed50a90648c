//! The control-plane seam every manager consumes.

use async_trait::async_trait;

use crate::deployments::DeploymentConfig;
use crate::error::ControlResult;
use crate::hotload::{HotloadAck, HotloadRequest, HotloadStatus};
use crate::records::{DeploymentRecord, JobRecord};
use crate::trainer_jobs::TrainerJobConfig;

/// Raw control-plane operations.
///
/// Implementations perform a single logical call each (retrying transient
/// failures internally if they choose); the managers layer polling and state
/// interpretation on top.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Creates a trainer job and returns its initial record.
    async fn create_trainer_job(&self, config: &TrainerJobConfig) -> ControlResult<JobRecord>;

    /// Fetches the current record of a trainer job.
    async fn get_trainer_job(&self, job_id: &str) -> ControlResult<JobRecord>;

    /// Asks the control plane to resume a stopped trainer job.
    async fn resume_trainer_job(&self, job_id: &str) -> ControlResult<JobRecord>;

    async fn delete_trainer_job(&self, job_id: &str) -> ControlResult<()>;

    /// Liveness probe against a trainer's base address. True only for HTTP 200.
    async fn probe_endpoint(&self, base_url: &str) -> bool;

    async fn create_deployment(&self, config: &DeploymentConfig) -> ControlResult<DeploymentRecord>;

    async fn get_deployment(&self, deployment_id: &str) -> ControlResult<DeploymentRecord>;

    async fn delete_deployment(&self, deployment_id: &str) -> ControlResult<()>;

    /// Pins a deployment's replica count (min = max = `replicas`).
    async fn scale_deployment(&self, deployment_id: &str, replicas: u32) -> ControlResult<DeploymentRecord>;

    /// Asks a deployment to load a weight snapshot.
    async fn push_hotload(
        &self,
        deployment_id: &str,
        model: &str,
        request: &HotloadRequest,
    ) -> ControlResult<HotloadAck>;

    /// Fetches per-replica hotload status.
    async fn hotload_status(&self, deployment_id: &str, model: &str) -> ControlResult<HotloadStatus>;

    /// Sends one minimal inference request to `model`.
    async fn warmup_request(&self, model: &str) -> ControlResult<()>;
}
