//! Keeps a deployment's serving weights in step with a trainer.
//!
//! The syncer tracks the delta chain: after the first base snapshot it asks
//! the trainer for incremental snapshots, each hotloaded with a reference to
//! the snapshot the deployment was last confirmed to hold. Anything that
//! breaks the chain (a foreign snapshot on the deployment, a save that was
//! never hotloaded) falls back to a full base snapshot.

use std::sync::Arc;
use std::time::Duration;

use tandem_abstraction::{CheckpointType, SavedWeights, TrainerCompute};
use tandem_control::{
    DEFAULT_CHECKSUM_FORMAT, DEFAULT_COMPRESSION_FORMAT, DeploymentManager, IncrementalMetadata,
};
use tracing::{debug, error, info, warn};

use crate::checkpoint::SessionId;
use crate::error::{SyncError, SyncResult};

/// Weight-sync settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncerConfig {
    /// Deployment to hotload into. `None` disables hotloading.
    pub deployment_id: Option<String>,
    /// Base model of the deployment; addresses hotload requests.
    pub base_model: String,
    /// Kind of the first snapshot this syncer saves. `Delta` means the base
    /// was saved by an earlier session on the same trainer.
    pub first_checkpoint_type: CheckpointType,
    pub hotload_timeout: Duration,
    pub hotload_poll_interval: Duration,
    pub compression_format: String,
    pub checksum_format: String,
    pub warmup_after_hotload: bool,
    /// Model name for warmup requests. Without it, warmups go to the
    /// deployment's inference model, falling back to `base_model`.
    pub warmup_model: Option<String>,
    pub warmup_max_retries: u32,
    pub warmup_retry_interval: Duration,
}

impl SyncerConfig {
    #[must_use]
    pub fn new(base_model: impl Into<String>) -> Self {
        Self {
            deployment_id: None,
            base_model: base_model.into(),
            first_checkpoint_type: CheckpointType::Base,
            hotload_timeout: Duration::from_secs(10 * 60),
            hotload_poll_interval: Duration::from_secs(2),
            compression_format: DEFAULT_COMPRESSION_FORMAT.to_string(),
            checksum_format: DEFAULT_CHECKSUM_FORMAT.to_string(),
            warmup_after_hotload: true,
            warmup_model: None,
            warmup_max_retries: 10,
            warmup_retry_interval: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    #[must_use]
    pub fn hotload_enabled(&self) -> bool {
        self.deployment_id.is_some()
    }
}

/// Delta chain bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaChainState {
    /// A base snapshot exists on the trainer, so deltas can be computed.
    pub base_saved: bool,
    /// Snapshot the deployment was last confirmed to serve. Set only after a
    /// successful hotload.
    pub base_identity: Option<String>,
    /// The deployment's pre-existing snapshot has been checked (and distrusted).
    pub deployment_checked: bool,
}

/// Saves weight snapshots on a trainer and hotloads them into a deployment.
///
/// Mutating operations take `&mut self`, so pushes on one syncer never
/// interleave.
pub struct WeightSyncer {
    compute: Arc<dyn TrainerCompute>,
    deployments: DeploymentManager,
    config: SyncerConfig,
    session: SessionId,
    state: DeltaChainState,
    /// Most recent save; only it can be hotloaded as a delta.
    last_saved: Option<SavedWeights>,
    /// Inference model of the deployment, resolved with the deployment check.
    inference_model: Option<String>,
}

impl WeightSyncer {
    #[must_use]
    pub fn new(
        compute: Arc<dyn TrainerCompute>,
        deployments: DeploymentManager,
        config: SyncerConfig,
        session: SessionId,
    ) -> Self {
        let state = DeltaChainState {
            base_saved: config.first_checkpoint_type == CheckpointType::Delta,
            ..DeltaChainState::default()
        };
        Self { compute, deployments, config, session, state, last_saved: None, inference_model: None }
    }

    #[must_use]
    pub fn state(&self) -> &DeltaChainState {
        &self.state
    }

    #[must_use]
    pub fn config(&self) -> &SyncerConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Model that post-hotload warmup requests target.
    #[must_use]
    pub fn warmup_model(&self) -> &str {
        self.config
            .warmup_model
            .as_deref()
            .or(self.inference_model.as_deref())
            .unwrap_or(&self.config.base_model)
    }

    fn last_saved_name(&self) -> Option<&str> {
        self.last_saved.as_ref().map(|saved| saved.snapshot_name.as_str())
    }

    /// Kind the next save asks for when the caller does not choose.
    #[must_use]
    pub fn next_checkpoint_type(&self) -> CheckpointType {
        if self.state.base_saved { CheckpointType::Delta } else { self.config.first_checkpoint_type }
    }

    /// Downgrades a delta request to a base when the chain cannot support it.
    fn resolve_checkpoint_type(&self, requested: Option<CheckpointType>) -> CheckpointType {
        let wanted = requested.unwrap_or_else(|| self.next_checkpoint_type());
        if wanted == CheckpointType::Base {
            return wanted;
        }
        if !self.state.base_saved {
            debug!("No base snapshot saved yet, saving base instead of delta");
            return CheckpointType::Base;
        }
        if self.config.hotload_enabled() {
            let Some(base) = self.state.base_identity.as_deref() else {
                debug!("Deployment holds no known snapshot, saving base instead of delta");
                return CheckpointType::Base;
            };
            if self.last_saved_name().is_some_and(|last| last != base) {
                debug!(base, last_saved = ?self.last_saved_name(), "Last save was never hotloaded, saving base instead of delta");
                return CheckpointType::Base;
            }
        }
        wanted
    }

    /// Distrusts whatever the deployment was serving before this session and
    /// resolves the model name inference traffic to it must use.
    ///
    /// Runs once per syncer, before the first hotload.
    pub async fn ensure_deployment_checked(&mut self) {
        if self.state.deployment_checked {
            return;
        }
        let Some(deployment_id) = self.config.deployment_id.as_deref() else { return };
        self.state.deployment_checked = true;

        match self.deployments.current_snapshot_identity(deployment_id, &self.config.base_model).await {
            Ok(Some(identity)) => info!(
                deployment_id,
                snapshot = %identity,
                "Deployment already serves a snapshot from outside this session, next hotload will be a base"
            ),
            Ok(None) => debug!(deployment_id, "Deployment serves no snapshot yet"),
            Err(e) => warn!(deployment_id, error = %e, "Failed to query deployment snapshot, assuming none"),
        }
        self.state.base_identity = None;

        match self.deployments.get(deployment_id).await {
            Ok(Some(record)) => {
                self.inference_model = record.inference_model();
                debug!(deployment_id, inference_model = ?self.inference_model, "Resolved deployment inference model");
            }
            Ok(None) => debug!(deployment_id, "Deployment record not found, warming up the base model"),
            Err(e) => warn!(deployment_id, error = %e, "Failed to fetch deployment, warming up the base model"),
        }
    }

    /// Saves a servable snapshot and returns it.
    pub async fn try_save(&mut self, name: &str, checkpoint_type: Option<CheckpointType>) -> SyncResult<SavedWeights> {
        let checkpoint_type = self.resolve_checkpoint_type(checkpoint_type);
        let snapshot = self.session.snapshot_name(name);
        info!(snapshot = %snapshot, checkpoint_type = %checkpoint_type, "Saving weights for sampler");

        let mut saved = self
            .compute
            .save_weights_for_sampler(&snapshot, checkpoint_type)
            .await
            .map_err(|source| SyncError::Save { snapshot: snapshot.clone(), source })?;
        if saved.snapshot_name.is_empty() {
            saved.snapshot_name = snapshot;
        }

        self.state.base_saved = true;
        self.last_saved = Some(saved.clone());
        Ok(saved)
    }

    /// Hotloads a snapshot saved by this syncer and waits until it is served.
    ///
    /// A delta snapshot carries incremental metadata referencing the last
    /// confirmed snapshot. Anything but the most recent save (including
    /// snapshots this syncer did not save) is pushed as a base.
    pub async fn try_hotload(&mut self, snapshot: &str) -> SyncResult<()> {
        let Some(deployment_id) = self.config.deployment_id.clone() else {
            return Err(SyncError::InvalidState("hotload requested without a deployment".to_string()));
        };
        self.ensure_deployment_checked().await;

        let kind = self
            .last_saved
            .as_ref()
            .filter(|saved| saved.snapshot_name == snapshot)
            .map_or(CheckpointType::Base, |saved| saved.checkpoint_type);
        let incremental = match (kind, self.state.base_identity.as_deref()) {
            (CheckpointType::Base, _) => None,
            (CheckpointType::Delta, Some(previous)) => Some(IncrementalMetadata::new(
                previous,
                self.config.compression_format.clone(),
                self.config.checksum_format.clone(),
            )),
            (CheckpointType::Delta, None) => {
                return Err(SyncError::InvalidState(format!(
                    "delta snapshot {snapshot} has no base on deployment {deployment_id}"
                )));
            }
        };

        self.deployments
            .hotload_and_wait(
                &deployment_id,
                &self.config.base_model,
                snapshot,
                incremental,
                self.config.hotload_timeout,
                self.config.hotload_poll_interval,
            )
            .await
            .map_err(|source| SyncError::Hotload { snapshot: snapshot.to_string(), source })?;

        self.state.base_identity = Some(snapshot.to_string());
        if self.config.warmup_after_hotload {
            self.deployments
                .warmup(self.warmup_model(), self.config.warmup_max_retries, self.config.warmup_retry_interval)
                .await;
        }
        Ok(())
    }

    /// Saves a snapshot without hotloading it. `None` on failure (logged).
    pub async fn save_only(&mut self, name: &str, checkpoint_type: Option<CheckpointType>) -> Option<String> {
        match self.try_save(name, checkpoint_type).await {
            Ok(saved) => Some(saved.snapshot_name),
            Err(e) => {
                warn!(name, error = %e, "Weight save failed");
                None
            }
        }
    }

    /// Hotloads a snapshot. False on failure (logged).
    pub async fn hotload(&mut self, snapshot: &str) -> bool {
        match self.try_hotload(snapshot).await {
            Ok(()) => true,
            Err(e) => {
                error!(snapshot, error = %e, "Hotload failed");
                false
            }
        }
    }

    /// Saves a snapshot and, when a deployment is configured, hotloads it.
    ///
    /// # Errors
    /// Fails if either the save or the hotload fails.
    pub async fn save_and_hotload(&mut self, name: &str, checkpoint_type: Option<CheckpointType>) -> SyncResult<String> {
        if self.config.hotload_enabled() {
            self.ensure_deployment_checked().await;
        }
        let saved = self.try_save(name, checkpoint_type).await?;
        if self.config.hotload_enabled() {
            self.try_hotload(&saved.snapshot_name).await?;
        }
        Ok(saved.snapshot_name)
    }

    /// Saves a resumption checkpoint (weights and optimizer state) under the
    /// logical name. False on failure (logged).
    pub async fn save_dcp(&self, name: &str) -> bool {
        match self.compute.save_state(name).await {
            Ok(path) => {
                info!(name, path = %path, "Resumption checkpoint saved");
                true
            }
            Err(e) => {
                warn!(name, error = %e, "Resumption checkpoint save failed");
                false
            }
        }
    }
}
