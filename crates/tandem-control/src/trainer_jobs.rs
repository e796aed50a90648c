//! Trainer job lifecycle: create, poll to ready, resume, reconnect, delete.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_abstraction::TrainerEndpoint;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::plane::ControlPlane;
use crate::records::{JobRecord, JobState};

/// Request body for creating a trainer job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerJobConfig {
    /// Requested job id; the control plane generates one when absent.
    #[serde(default, skip_serializing)]
    pub job_id: Option<String>,
    pub base_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Deployment the trainer writes servable snapshots for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_load_deployment_id: Option<String>,
}

impl TrainerJobConfig {
    #[must_use]
    pub fn new(base_model: impl Into<String>) -> Self {
        Self {
            job_id: None,
            base_model: base_model.into(),
            display_name: None,
            accelerator_type: None,
            accelerator_count: None,
            lora_rank: None,
            max_context_length: None,
            region: None,
            hot_load_deployment_id: None,
        }
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_hot_load_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.hot_load_deployment_id = Some(deployment_id.into());
        self
    }

    pub fn validate(&self) -> ControlResult<()> {
        if self.base_model.trim().is_empty() {
            return Err(ControlError::Config("trainer job base model must not be empty".to_string()));
        }
        if self.accelerator_count == Some(0) {
            return Err(ControlError::Config("accelerator count must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Polling cadence and deadlines for trainer jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobWaitSettings {
    pub poll_interval: Duration,
    /// Deadline for a job to become ready after create, attach or resume.
    pub ready_timeout: Duration,
    /// Probe an endpoint reported before `RUNNING` and accept it if it answers.
    pub early_probe: bool,
}

impl Default for JobWaitSettings {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(5), ready_timeout: Duration::from_secs(30 * 60), early_probe: true }
    }
}

/// Owns the life cycle of trainer job records.
///
/// Holds no job state of its own: every decision is taken from the most
/// recent fetch.
#[derive(Clone)]
pub struct TrainerJobManager {
    plane: Arc<dyn ControlPlane>,
    settings: JobWaitSettings,
}

impl TrainerJobManager {
    #[must_use]
    pub fn new(plane: Arc<dyn ControlPlane>) -> Self {
        Self::with_settings(plane, JobWaitSettings::default())
    }

    #[must_use]
    pub fn with_settings(plane: Arc<dyn ControlPlane>, settings: JobWaitSettings) -> Self {
        Self { plane, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &JobWaitSettings {
        &self.settings
    }

    /// Creates a job without waiting for it.
    pub async fn create(&self, config: &TrainerJobConfig) -> ControlResult<JobRecord> {
        config.validate()?;
        let record = self.plane.create_trainer_job(config).await?;
        info!(job_id = %record.job_id(), base_model = %config.base_model, "Trainer job created");
        Ok(record)
    }

    pub async fn get(&self, job_id: &str) -> ControlResult<JobRecord> {
        self.plane.get_trainer_job(job_id).await
    }

    /// Creates a job and waits until it is running and answering its probe.
    ///
    /// # Errors
    /// `JobFailed` if the job fails first, `JobTimeout` past the ready deadline.
    pub async fn create_and_wait(&self, config: &TrainerJobConfig) -> ControlResult<TrainerEndpoint> {
        let record = self.create(config).await?;
        self.poll_until_ready(record.job_id()).await
    }

    /// Waits for an already-created job to become ready.
    pub async fn wait_for_existing(&self, job_id: &str) -> ControlResult<TrainerEndpoint> {
        self.poll_until_ready(job_id).await
    }

    /// Resumes a stopped job and waits for it to become ready.
    pub async fn resume_and_wait(&self, job_id: &str) -> ControlResult<TrainerEndpoint> {
        self.plane.resume_trainer_job(job_id).await?;
        info!(job_id, "Trainer job resume requested");
        self.wait_for_existing(job_id).await
    }

    /// Brings a job back after its connection was lost.
    ///
    /// A running job is reattached, a stopped job is resumed, and a job in a
    /// transitional state is polled until it settles. Past
    /// `max_wait_for_resumable` the job is reported stuck.
    pub async fn reconnect_and_wait(
        &self,
        job_id: &str,
        max_wait_for_resumable: Duration,
    ) -> ControlResult<TrainerEndpoint> {
        let started = Instant::now();
        let mut last_state: Option<JobState> = None;
        let mut last_error: Option<ControlError> = None;

        loop {
            match self.plane.get_trainer_job(job_id).await {
                Ok(record) if record.state == JobState::Running => {
                    info!(job_id, "Trainer job still running, reattaching");
                    return self.wait_for_existing(job_id).await;
                }
                Ok(record) if record.state.is_resumable() => {
                    info!(job_id, state = %record.state, "Trainer job stopped, resuming");
                    return self.resume_and_wait(job_id).await;
                }
                Ok(record) => {
                    debug!(job_id, state = %record.state, "Trainer job in transitional state, waiting");
                    last_state = Some(record.state);
                    last_error = None;
                }
                Err(e) if e.is_transient() => {
                    warn!(job_id, error = %e, "Failed to fetch trainer job while reconnecting");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if waited >= max_wait_for_resumable {
                if let Some(e) = last_error {
                    return Err(e);
                }
                let state = last_state.unwrap_or_default();
                error!(job_id, state = %state, waited_secs = waited.as_secs(), "Trainer job stuck");
                return Err(ControlError::StuckJob { job_id: job_id.to_string(), state, waited });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Deletes a job. Best effort: failures are logged.
    pub async fn delete(&self, job_id: &str) {
        match self.plane.delete_trainer_job(job_id).await {
            Ok(()) => info!(job_id, "Trainer job deleted"),
            Err(e) => warn!(job_id, error = %e, "Failed to delete trainer job"),
        }
    }

    async fn poll_until_ready(&self, job_id: &str) -> ControlResult<TrainerEndpoint> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.plane.get_trainer_job(job_id).await {
                Ok(record) => {
                    if let Some(endpoint) = self.check_ready(&record, attempt).await? {
                        info!(
                            job_id,
                            endpoint = %endpoint.base_url(),
                            waited_secs = started.elapsed().as_secs(),
                            "Trainer job ready"
                        );
                        return Ok(endpoint);
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(job_id, attempt, error = %e, "Failed to poll trainer job, retrying");
                }
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if waited >= self.settings.ready_timeout {
                error!(job_id, waited_secs = waited.as_secs(), "Trainer job not ready before deadline");
                return Err(ControlError::JobTimeout { job_id: job_id.to_string(), waited });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Interprets one fetched record: `Some` when ready, `Err` when failed.
    async fn check_ready(&self, record: &JobRecord, attempt: u32) -> ControlResult<Option<TrainerEndpoint>> {
        let job_id = record.job_id();
        match &record.state {
            JobState::Failed => {
                let message = record.failure_message();
                error!(job_id, error = %message, "Trainer job failed");
                Err(ControlError::JobFailed { job_id: job_id.to_string(), message })
            }
            JobState::Running => {
                let Some(endpoint) = record.endpoint() else {
                    debug!(job_id, attempt, "Trainer job running without an endpoint yet");
                    return Ok(None);
                };
                if self.plane.probe_endpoint(endpoint.base_url()).await {
                    return Ok(Some(endpoint));
                }
                debug!(job_id, attempt, endpoint = %endpoint.base_url(), "Trainer endpoint not answering yet");
                Ok(None)
            }
            state => {
                debug!(job_id, attempt, state = %state, "Waiting for trainer job");
                if !self.settings.early_probe {
                    return Ok(None);
                }
                // Non-authoritative: the control plane may lag the pod.
                let Some(endpoint) = record.endpoint() else { return Ok(None) };
                if self.plane.probe_endpoint(endpoint.base_url()).await {
                    info!(job_id, state = %state, "Trainer endpoint answered before RUNNING");
                    return Ok(Some(endpoint));
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockControlPlane;

    const ENDPOINT: &str = "http://10.0.0.7:8080";

    fn manager(plane: &Arc<MockControlPlane>) -> TrainerJobManager {
        TrainerJobManager::new(plane.clone())
    }

    fn job(id: &str, state: JobState) -> JobRecord {
        MockControlPlane::job_record(id, state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_wait_probes_once_when_running() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job(
            "j1",
            vec![
                job("j1", JobState::Creating),
                job("j1", JobState::Creating),
                job("j1", JobState::Running).with_endpoint(ENDPOINT),
            ],
        );
        plane.set_endpoint_health(ENDPOINT, true);

        let endpoint = manager(&plane).create_and_wait(&TrainerJobConfig::new("m").with_job_id("j1")).await.unwrap();

        assert_eq!(endpoint.job_id(), "j1");
        assert_eq!(endpoint.base_url(), ENDPOINT);
        assert_eq!(plane.probe_count(ENDPOINT), 1);
        assert_eq!(plane.probe_successes(ENDPOINT), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_but_unreachable_keeps_polling() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job("j1", vec![job("j1", JobState::Running).with_endpoint(ENDPOINT)]);

        let settings = JobWaitSettings { ready_timeout: Duration::from_secs(60), ..Default::default() };
        let result = TrainerJobManager::with_settings(plane.clone(), settings).wait_for_existing("j1").await;

        assert!(matches!(result, Err(ControlError::JobTimeout { .. })));
        assert!(plane.probe_count(ENDPOINT) > 1);
        assert_eq!(plane.probe_successes(ENDPOINT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_carries_message() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job(
            "j1",
            vec![job("j1", JobState::Creating), job("j1", JobState::Failed).with_failure("CUDA out of memory")],
        );

        let err = manager(&plane).wait_for_existing("j1").await.unwrap_err();
        assert_eq!(
            err,
            ControlError::JobFailed { job_id: "j1".to_string(), message: "CUDA out of memory".to_string() }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_endpoint_is_accepted() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job("j1", vec![job("j1", JobState::Creating).with_endpoint(ENDPOINT)]);
        plane.set_endpoint_health(ENDPOINT, true);

        let endpoint = manager(&plane).wait_for_existing("j1").await.unwrap();
        assert_eq!(endpoint.base_url(), ENDPOINT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_probe_disabled_waits_for_running() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job(
            "j1",
            vec![
                job("j1", JobState::Creating).with_endpoint(ENDPOINT),
                job("j1", JobState::Running).with_endpoint(ENDPOINT),
            ],
        );
        plane.set_endpoint_health(ENDPOINT, true);

        let settings = JobWaitSettings { early_probe: false, ..Default::default() };
        TrainerJobManager::with_settings(plane.clone(), settings).wait_for_existing("j1").await.unwrap();

        assert_eq!(plane.calls("get_trainer_job"), 2);
        assert_eq!(plane.probe_count(ENDPOINT), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_tolerated() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job_results(
            "j1",
            vec![
                Err(ControlError::Transient("HTTP 503: unavailable".to_string())),
                Ok(job("j1", JobState::Running).with_endpoint(ENDPOINT)),
            ],
        );
        plane.set_endpoint_health(ENDPOINT, true);

        assert!(manager(&plane).wait_for_existing("j1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_error_aborts_poll() {
        let plane = Arc::new(MockControlPlane::new());
        let err = manager(&plane).wait_for_existing("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resumes_stopped_job() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job("j1", vec![job("j1", JobState::Paused)]);
        plane.script_resume(
            "j1",
            vec![job("j1", JobState::Creating), job("j1", JobState::Running).with_endpoint(ENDPOINT)],
        );
        plane.set_endpoint_health(ENDPOINT, true);

        let endpoint = manager(&plane).reconnect_and_wait("j1", Duration::from_secs(600)).await.unwrap();
        assert_eq!(endpoint.job_id(), "j1");
        assert_eq!(plane.calls("resume_trainer_job"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_reattaches_running_job() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job("j1", vec![job("j1", JobState::Running).with_endpoint(ENDPOINT)]);
        plane.set_endpoint_health(ENDPOINT, true);

        manager(&plane).reconnect_and_wait("j1", Duration::from_secs(600)).await.unwrap();
        assert_eq!(plane.calls("resume_trainer_job"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_out_transitional_states() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job(
            "j1",
            vec![
                job("j1", JobState::Deleting),
                job("j1", JobState::Unknown("JOB_STATE_PREEMPTING".to_string())),
                job("j1", JobState::Failed),
            ],
        );
        plane.script_resume("j1", vec![job("j1", JobState::Running).with_endpoint(ENDPOINT)]);
        plane.set_endpoint_health(ENDPOINT, true);

        manager(&plane).reconnect_and_wait("j1", Duration::from_secs(600)).await.unwrap();
        assert_eq!(plane.calls("resume_trainer_job"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_stuck_job() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job("j1", vec![job("j1", JobState::Creating)]);

        let err = manager(&plane).reconnect_and_wait("j1", Duration::from_secs(30)).await.unwrap_err();
        match err {
            ControlError::StuckJob { job_id, state, .. } => {
                assert_eq!(job_id, "j1");
                assert_eq!(state, JobState::Creating);
            }
            other => panic!("expected StuckJob, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_rides_out_transient_fetch_errors() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job_results(
            "j1",
            vec![
                Err(ControlError::Transient("HTTP 502: bad gateway".to_string())),
                Err(ControlError::Transient("HTTP 503: unavailable".to_string())),
                Ok(job("j1", JobState::Paused)),
            ],
        );
        plane.script_resume("j1", vec![job("j1", JobState::Running).with_endpoint(ENDPOINT)]);
        plane.set_endpoint_health(ENDPOINT, true);

        let endpoint = manager(&plane).reconnect_and_wait("j1", Duration::from_secs(600)).await.unwrap();

        assert_eq!(endpoint.base_url(), ENDPOINT);
        assert_eq!(plane.calls("resume_trainer_job"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_surfaces_persistent_transient_error() {
        let plane = Arc::new(MockControlPlane::new());
        plane.script_job_results("j1", vec![Err(ControlError::Transient("503".to_string()))]);

        let err = manager(&plane).reconnect_and_wait("j1", Duration::from_secs(30)).await.unwrap_err();

        assert_eq!(err, ControlError::Transient("503".to_string()));
        assert!(plane.calls("get_trainer_job") > 1);
        assert_eq!(plane.calls("resume_trainer_job"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_best_effort() {
        let plane = Arc::new(MockControlPlane::new());
        // Unknown job: the control plane answers 404, which is only logged.
        manager(&plane).delete("missing").await;
        assert_eq!(plane.calls("delete_trainer_job"), 1);
    }

    #[test]
    fn test_config_serialization_skips_job_id() {
        let config = TrainerJobConfig::new("accounts/fw/models/qwen3-8b").with_job_id("j1").with_display_name("policy");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["baseModel"], "accounts/fw/models/qwen3-8b");
        assert_eq!(json["displayName"], "policy");
        assert!(json.get("jobId").is_none());
        assert!(json.get("loraRank").is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(TrainerJobConfig::new(" ").validate().is_err());
        let mut config = TrainerJobConfig::new("m");
        config.accelerator_count = Some(0);
        assert!(config.validate().is_err());
    }
}
