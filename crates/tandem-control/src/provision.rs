//! Concurrent bring-up of the resources a training run needs.

use serde::Serialize;
use tandem_abstraction::TrainerEndpoint;
use tracing::info;

use crate::deployments::{DeploymentConfig, DeploymentInfo, DeploymentManager};
use crate::error::ControlResult;
use crate::trainer_jobs::{TrainerJobConfig, TrainerJobManager};

/// What to bring up.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub policy: TrainerJobConfig,
    /// Frozen reference model trainer (e.g. for KL penalties).
    pub reference: Option<TrainerJobConfig>,
    pub deployment: Option<DeploymentConfig>,
    pub force_recreate_deployment: bool,
}

impl ProvisionRequest {
    #[must_use]
    pub fn new(policy: TrainerJobConfig) -> Self {
        Self { policy, reference: None, deployment: None, force_recreate_deployment: false }
    }
}

/// Everything that came up.
#[derive(Debug, Clone, Serialize)]
pub struct Provisioned {
    pub policy: TrainerEndpoint,
    pub reference: Option<TrainerEndpoint>,
    pub deployment: Option<DeploymentInfo>,
}

/// Creates the policy trainer, the optional reference trainer and the
/// optional deployment concurrently and waits for all of them.
///
/// # Errors
/// The first failure aborts the remaining waits and is returned. Resources
/// already created are left in place.
pub async fn provision(
    jobs: &TrainerJobManager,
    deployments: &DeploymentManager,
    request: &ProvisionRequest,
) -> ControlResult<Provisioned> {
    let policy = jobs.create_and_wait(&request.policy);
    let reference = async {
        match &request.reference {
            Some(config) => jobs.create_and_wait(config).await.map(Some),
            None => Ok(None),
        }
    };
    let deployment = async {
        match &request.deployment {
            Some(config) => deployments.ensure_ready(config, request.force_recreate_deployment).await.map(Some),
            None => Ok(None),
        }
    };

    let (policy, reference, deployment) = tokio::try_join!(policy, reference, deployment)?;
    info!(
        policy_job = %policy.job_id(),
        reference_job = ?reference.as_ref().map(TrainerEndpoint::job_id),
        deployment_id = ?deployment.as_ref().map(|d| d.deployment_id.as_str()),
        "Provisioning complete"
    );
    Ok(Provisioned { policy, reference, deployment })
}
