//! Deployment lifecycle: create-or-get, poll to ready, delete, scale-to-zero.
//!
//! The hotload protocol lives in [`crate::hotload`] as a second `impl` block
//! on [`DeploymentManager`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::plane::ControlPlane;
use crate::records::{DeploymentRecord, DeploymentState};

/// Request body for creating a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Sent as the `deploymentId` query parameter, not in the body.
    #[serde(skip_serializing)]
    pub deployment_id: String,
    pub base_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_count: Option<u32>,
    #[serde(default = "default_replicas")]
    pub min_replica_count: u32,
    #[serde(default = "default_replicas")]
    pub max_replica_count: u32,
    #[serde(default = "default_true")]
    pub enable_hot_load: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_load_bucket_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

const fn default_replicas() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

impl DeploymentConfig {
    #[must_use]
    pub fn new(deployment_id: impl Into<String>, base_model: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            base_model: base_model.into(),
            display_name: None,
            accelerator_type: None,
            accelerator_count: None,
            min_replica_count: default_replicas(),
            max_replica_count: default_replicas(),
            enable_hot_load: true,
            hot_load_bucket_url: None,
            region: None,
        }
    }

    pub fn validate(&self) -> ControlResult<()> {
        if self.deployment_id.trim().is_empty() {
            return Err(ControlError::Config("deployment id must not be empty".to_string()));
        }
        if self.base_model.trim().is_empty() {
            return Err(ControlError::Config("deployment base model must not be empty".to_string()));
        }
        if self.min_replica_count > self.max_replica_count {
            return Err(ControlError::Config(format!(
                "min replica count {} exceeds max replica count {}",
                self.min_replica_count, self.max_replica_count
            )));
        }
        Ok(())
    }
}

/// Summary of a ready deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentInfo {
    pub deployment_id: String,
    pub name: String,
    pub state: DeploymentState,
    pub inference_model: Option<String>,
    pub hotload_bucket: Option<String>,
}

impl From<&DeploymentRecord> for DeploymentInfo {
    fn from(record: &DeploymentRecord) -> Self {
        Self {
            deployment_id: record.deployment_id().to_string(),
            name: record.name.clone(),
            state: record.state.clone(),
            inference_model: record.inference_model(),
            hotload_bucket: record.hotload_bucket().map(str::to_string),
        }
    }
}

/// Polling cadence and deadlines for deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentWaitSettings {
    pub poll_interval: Duration,
    pub ready_timeout: Duration,
    /// Deadline for a deployment being replaced to disappear.
    pub delete_timeout: Duration,
}

impl Default for DeploymentWaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            ready_timeout: Duration::from_secs(30 * 60),
            delete_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Owns the life cycle of deployment records and the hotload protocol.
#[derive(Clone)]
pub struct DeploymentManager {
    pub(crate) plane: Arc<dyn ControlPlane>,
    settings: DeploymentWaitSettings,
}

impl DeploymentManager {
    #[must_use]
    pub fn new(plane: Arc<dyn ControlPlane>) -> Self {
        Self::with_settings(plane, DeploymentWaitSettings::default())
    }

    #[must_use]
    pub fn with_settings(plane: Arc<dyn ControlPlane>, settings: DeploymentWaitSettings) -> Self {
        Self { plane, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &DeploymentWaitSettings {
        &self.settings
    }

    /// Fetches a deployment; `None` when the control plane answers 404.
    pub async fn get(&self, deployment_id: &str) -> ControlResult<Option<DeploymentRecord>> {
        match self.plane.get_deployment(deployment_id).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns the existing deployment, or creates it.
    ///
    /// An existing deployment that is failed, deleted or being deleted, or any
    /// existing deployment when `force_recreate` is set, is deleted first; the
    /// call blocks until it is gone before creating the replacement.
    pub async fn create_or_get(
        &self,
        config: &DeploymentConfig,
        force_recreate: bool,
    ) -> ControlResult<DeploymentRecord> {
        config.validate()?;
        let deployment_id = config.deployment_id.as_str();

        match self.get(deployment_id).await? {
            Some(existing) if force_recreate || existing.state.needs_recreate() => {
                info!(deployment_id, state = %existing.state, force_recreate, "Replacing existing deployment");
                if existing.state != DeploymentState::Deleting && existing.state != DeploymentState::Deleted {
                    match self.plane.delete_deployment(deployment_id).await {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                }
                self.wait_until_gone(deployment_id).await?;
                self.create(config).await
            }
            Some(existing) => {
                info!(deployment_id, state = %existing.state, "Reusing existing deployment");
                Ok(existing)
            }
            None => self.create(config).await,
        }
    }

    async fn create(&self, config: &DeploymentConfig) -> ControlResult<DeploymentRecord> {
        let record = self.plane.create_deployment(config).await?;
        info!(deployment_id = %config.deployment_id, base_model = %config.base_model, "Deployment created");
        Ok(record)
    }

    /// `create_or_get` followed by `wait_for_ready`.
    pub async fn ensure_ready(&self, config: &DeploymentConfig, force_recreate: bool) -> ControlResult<DeploymentInfo> {
        let record = self.create_or_get(config, force_recreate).await?;
        if record.state == DeploymentState::Ready {
            return Ok(DeploymentInfo::from(&record));
        }
        self.wait_for_ready(&config.deployment_id).await
    }

    /// Polls until the deployment is `READY`.
    ///
    /// # Errors
    /// `DeploymentFailed` if it fails or is deleted, `DeploymentTimeout` past
    /// the ready deadline.
    pub async fn wait_for_ready(&self, deployment_id: &str) -> ControlResult<DeploymentInfo> {
        let started = Instant::now();

        loop {
            match self.plane.get_deployment(deployment_id).await {
                Ok(record) => match &record.state {
                    DeploymentState::Ready => {
                        info!(deployment_id, waited_secs = started.elapsed().as_secs(), "Deployment ready");
                        return Ok(DeploymentInfo::from(&record));
                    }
                    DeploymentState::Failed | DeploymentState::Deleted => {
                        let message = if record.state == DeploymentState::Deleted {
                            "deployment was deleted while waiting for it".to_string()
                        } else {
                            record.failure_message()
                        };
                        error!(deployment_id, error = %message, "Deployment failed");
                        return Err(ControlError::DeploymentFailed { deployment_id: deployment_id.to_string(), message });
                    }
                    state => debug!(deployment_id, state = %state, "Waiting for deployment"),
                },
                Err(e) if e.is_transient() || e.is_not_found() => {
                    warn!(deployment_id, error = %e, "Failed to poll deployment, retrying");
                }
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if waited >= self.settings.ready_timeout {
                error!(deployment_id, waited_secs = waited.as_secs(), "Deployment not ready before deadline");
                return Err(ControlError::DeploymentTimeout { deployment_id: deployment_id.to_string(), waited });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Polls until the deployment answers 404 or reports `DELETED`.
    async fn wait_until_gone(&self, deployment_id: &str) -> ControlResult<()> {
        let started = Instant::now();

        loop {
            match self.get(deployment_id).await {
                Ok(None) => return Ok(()),
                Ok(Some(record)) if record.state == DeploymentState::Deleted => return Ok(()),
                Ok(Some(record)) => debug!(deployment_id, state = %record.state, "Waiting for deployment deletion"),
                Err(e) if e.is_transient() => warn!(deployment_id, error = %e, "Failed to poll deployment deletion"),
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if waited >= self.settings.delete_timeout {
                return Err(ControlError::DeploymentTimeout { deployment_id: deployment_id.to_string(), waited });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Deletes a deployment. Best effort: failures are logged.
    pub async fn delete(&self, deployment_id: &str) {
        match self.plane.delete_deployment(deployment_id).await {
            Ok(()) => info!(deployment_id, "Deployment deleted"),
            Err(e) => warn!(deployment_id, error = %e, "Failed to delete deployment"),
        }
    }

    /// Scales a deployment to zero replicas. Best effort: failures are logged.
    pub async fn scale_to_zero(&self, deployment_id: &str) {
        match self.plane.scale_deployment(deployment_id, 0).await {
            Ok(_) => info!(deployment_id, "Deployment scaled to zero"),
            Err(e) => warn!(deployment_id, error = %e, "Failed to scale deployment to zero"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockControlPlane;

    fn deployment(id: &str, state: DeploymentState) -> DeploymentRecord {
        MockControlPlane::deployment_record(id, state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_wait_for_ready() {
        let plane = Arc::new(MockControlPlane::new());
        let manager = DeploymentManager::new(plane.clone());

        let info = manager.ensure_ready(&DeploymentConfig::new("serve-1", "base"), false).await.unwrap();

        assert_eq!(info.deployment_id, "serve-1");
        assert_eq!(info.state, DeploymentState::Ready);
        assert_eq!(plane.calls("create_deployment"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_ready_deployment_is_reused() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_deployment("serve-1", vec![deployment("serve-1", DeploymentState::Ready)]);
        let manager = DeploymentManager::new(plane.clone());

        let record = manager.create_or_get(&DeploymentConfig::new("serve-1", "base"), false).await.unwrap();

        assert_eq!(record.state, DeploymentState::Ready);
        assert_eq!(plane.calls("create_deployment"), 0);
        assert_eq!(plane.calls("delete_deployment"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_deployment_is_recreated() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_deployment("serve-1", vec![deployment("serve-1", DeploymentState::Failed)]);
        plane.script_after_delete(
            "serve-1",
            vec![deployment("serve-1", DeploymentState::Deleting), deployment("serve-1", DeploymentState::Deleted)],
        );
        let manager = DeploymentManager::new(plane.clone());

        let info = manager.ensure_ready(&DeploymentConfig::new("serve-1", "base"), false).await.unwrap();

        assert_eq!(info.state, DeploymentState::Ready);
        assert_eq!(plane.calls("delete_deployment"), 1);
        assert_eq!(plane.calls("create_deployment"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_recreate_waits_for_404() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_deployment("serve-1", vec![deployment("serve-1", DeploymentState::Ready)]);
        let manager = DeploymentManager::new(plane.clone());

        manager.create_or_get(&DeploymentConfig::new("serve-1", "base"), true).await.unwrap();

        assert_eq!(plane.calls("delete_deployment"), 1);
        assert_eq!(plane.calls("create_deployment"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_failed() {
        let plane = Arc::new(MockControlPlane::new());
        let mut failed = deployment("serve-1", DeploymentState::Failed);
        failed.status = Some(crate::records::RecordStatus { code: None, message: Some("no capacity".to_string()) });
        plane.script_deployment("serve-1", vec![deployment("serve-1", DeploymentState::Creating), failed]);

        let err = DeploymentManager::new(plane.clone()).wait_for_ready("serve-1").await.unwrap_err();
        assert_eq!(
            err,
            ControlError::DeploymentFailed { deployment_id: "serve-1".to_string(), message: "no capacity".to_string() }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_timeout() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_deployment("serve-1", vec![deployment("serve-1", DeploymentState::Updating)]);
        let settings = DeploymentWaitSettings { ready_timeout: Duration::from_secs(60), ..Default::default() };

        let err = DeploymentManager::with_settings(plane.clone(), settings).wait_for_ready("serve-1").await.unwrap_err();
        assert!(matches!(err, ControlError::DeploymentTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_maps_404_to_none() {
        let plane = Arc::new(MockControlPlane::new());
        assert!(DeploymentManager::new(plane).get("nope").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_operations() {
        let plane = Arc::new(MockControlPlane::new());
        let manager = DeploymentManager::new(plane.clone());
        manager.scale_to_zero("missing").await;
        manager.delete("missing").await;

        plane.script_deployment("serve-1", vec![deployment("serve-1", DeploymentState::Ready)]);
        manager.scale_to_zero("serve-1").await;
        assert_eq!(plane.scaled(), vec![("serve-1".to_string(), 0)]);
    }

    #[test]
    fn test_config_validation_and_body() {
        let mut config = DeploymentConfig::new("serve-1", "accounts/fw/models/qwen3-8b");
        assert!(config.validate().is_ok());
        let body = serde_json::to_value(&config).unwrap();
        assert!(body.get("deploymentId").is_none());
        assert_eq!(body["enableHotLoad"], true);
        assert_eq!(body["minReplicaCount"], 1);

        config.min_replica_count = 3;
        assert!(config.validate().is_err());
    }
}
