//! Shared state for one CLI invocation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tandem_control::{
    ControlPlane, DeploymentManager, DeploymentWaitSettings, HttpControlPlane, JobWaitSettings, MockControlPlane,
    TrainerJobManager,
};
use tracing::debug;

use crate::config::{CliConfig, Overrides};

/// Poll cadence against the in-memory control plane.
const MOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct AppContext {
    pub plane: Arc<dyn ControlPlane>,
    pub jobs: TrainerJobManager,
    pub deployments: DeploymentManager,
    pub config: CliConfig,
    /// `[output] json = true` in the config file.
    pub json: bool,
}

impl AppContext {
    /// Connects to the control plane described by `config`, or to an
    /// in-memory one when `mock` is set.
    pub fn build(config: CliConfig, overrides: &Overrides, mock: bool) -> anyhow::Result<Self> {
        let json = config.output.json;

        if mock {
            debug!("Using in-memory control plane");
            let plane: Arc<dyn ControlPlane> = Arc::new(MockControlPlane::new());
            let jobs = TrainerJobManager::with_settings(
                plane.clone(),
                JobWaitSettings { poll_interval: MOCK_POLL_INTERVAL, ..Default::default() },
            );
            let deployments = DeploymentManager::with_settings(
                plane.clone(),
                DeploymentWaitSettings { poll_interval: MOCK_POLL_INTERVAL, ..Default::default() },
            );
            return Ok(Self { plane, jobs, deployments, config, json });
        }

        let plane_config = config.control_plane_config(overrides)?;
        debug!(base_url = %plane_config.base_url(), account_id = %plane_config.account_id, "Using control plane");
        let plane: Arc<dyn ControlPlane> =
            Arc::new(HttpControlPlane::new(plane_config).context("Failed to build control-plane client")?);
        Ok(Self {
            jobs: TrainerJobManager::new(plane.clone()),
            deployments: DeploymentManager::new(plane.clone()),
            plane,
            config,
            json,
        })
    }

    /// `explicit`, else the configured default base model.
    pub fn base_model(&self, explicit: Option<String>) -> anyhow::Result<String> {
        explicit
            .or_else(|| self.config.base_model.clone())
            .context("No base model given (pass --base-model or set base_model in the config file)")
    }
}
