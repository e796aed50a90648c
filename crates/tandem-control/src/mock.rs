//! In-memory control plane for tests and dry runs.
//!
//! Responses are scripted per id as queues: each fetch pops the next entry
//! and the last entry repeats forever. Unknown ids answer 404, like the real
//! control plane.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::deployments::DeploymentConfig;
use crate::error::{ControlError, ControlResult};
use crate::hotload::{HotloadAck, HotloadRequest, HotloadStatus, ReplicaStatus};
use crate::plane::ControlPlane;
use crate::records::{DeploymentRecord, DeploymentState, JobRecord, JobState};
use crate::trainer_jobs::TrainerJobConfig;

/// Account used in mock resource names.
pub const MOCK_ACCOUNT: &str = "mock";

/// A scripted response queue whose last entry is sticky.
struct Script<T> {
    queue: VecDeque<ControlResult<T>>,
}

impl<T: Clone> Script<T> {
    fn new(entries: Vec<ControlResult<T>>) -> Self {
        Self { queue: entries.into() }
    }

    fn next(&mut self) -> Option<ControlResult<T>> {
        if self.queue.len() > 1 { self.queue.pop_front() } else { self.queue.front().cloned() }
    }

    fn peek(&self) -> Option<&ControlResult<T>> {
        self.queue.front()
    }
}

/// A hotload push as the mock received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedHotload {
    pub deployment_id: String,
    pub model: String,
    pub request: HotloadRequest,
}

#[derive(Default)]
struct MockState {
    jobs: HashMap<String, Script<JobRecord>>,
    resume_scripts: HashMap<String, Vec<ControlResult<JobRecord>>>,
    deployments: HashMap<String, Script<DeploymentRecord>>,
    after_delete_scripts: HashMap<String, Vec<ControlResult<DeploymentRecord>>>,
    healthy: HashSet<String>,
    probes: HashMap<String, usize>,
    probe_successes: HashMap<String, usize>,
    hotload_status: Option<Script<HotloadStatus>>,
    serving: Option<String>,
    hotloads: Vec<RecordedHotload>,
    scaled: Vec<(String, u32)>,
    warmup_failures: u32,
    warmup_models: Vec<String>,
    injected: HashMap<&'static str, VecDeque<ControlError>>,
    calls: HashMap<&'static str, usize>,
    next_job: u32,
}

/// Scripted, in-memory [`ControlPlane`].
///
/// Without a script, a created job goes `CREATING` then `RUNNING` with a
/// healthy endpoint, a created deployment goes `CREATING` then `READY`, and a
/// hotload push is served as soon as it is accepted.
pub struct MockControlPlane {
    state: Mutex<MockState>,
    auto_serve: bool,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(MockState::default()), auto_serve: true }
    }

    /// Hotload pushes are recorded but never reported as served.
    #[must_use]
    pub fn without_auto_serve(mut self) -> Self {
        self.auto_serve = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts a call and returns an injected error for it, if one is queued.
    fn enter(&self, operation: &'static str) -> ControlResult<()> {
        let mut state = self.state();
        *state.calls.entry(operation).or_default() += 1;
        match state.injected.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found(kind: &str, id: &str) -> ControlError {
        ControlError::Api { status: 404, message: format!("{kind} {id} not found") }
    }

    #[must_use]
    pub fn job_name(job_id: &str) -> String {
        format!("accounts/{MOCK_ACCOUNT}/trainerJobs/{job_id}")
    }

    #[must_use]
    pub fn deployment_name(deployment_id: &str) -> String {
        format!("accounts/{MOCK_ACCOUNT}/deployments/{deployment_id}")
    }

    /// Endpoint the mock assigns to jobs it creates without a script.
    #[must_use]
    pub fn default_endpoint(job_id: &str) -> String {
        format!("http://{job_id}.trainer.mock:8080")
    }

    #[must_use]
    pub fn job_record(job_id: &str, state: JobState) -> JobRecord {
        JobRecord::new(Self::job_name(job_id), state)
    }

    #[must_use]
    pub fn deployment_record(deployment_id: &str, state: DeploymentState) -> DeploymentRecord {
        DeploymentRecord::new(Self::deployment_name(deployment_id), state)
    }

    /// Records returned by successive fetches of `job_id`.
    pub fn script_job(&self, job_id: &str, records: Vec<JobRecord>) {
        self.script_job_results(job_id, records.into_iter().map(Ok).collect());
    }

    pub fn script_job_results(&self, job_id: &str, results: Vec<ControlResult<JobRecord>>) {
        self.state().jobs.insert(job_id.to_string(), Script::new(results));
    }

    /// Replaces the job's script once a resume is requested.
    pub fn script_resume(&self, job_id: &str, records: Vec<JobRecord>) {
        self.state().resume_scripts.insert(job_id.to_string(), records.into_iter().map(Ok).collect());
    }

    pub fn script_deployment(&self, deployment_id: &str, records: Vec<DeploymentRecord>) {
        self.state()
            .deployments
            .insert(deployment_id.to_string(), Script::new(records.into_iter().map(Ok).collect()));
    }

    /// Replaces the deployment's script once a delete is requested. Without
    /// one, a deleted deployment answers 404.
    pub fn script_after_delete(&self, deployment_id: &str, records: Vec<DeploymentRecord>) {
        self.state().after_delete_scripts.insert(deployment_id.to_string(), records.into_iter().map(Ok).collect());
    }

    /// Hotload status responses; takes precedence over auto-serving.
    pub fn script_hotload_status(&self, results: Vec<ControlResult<HotloadStatus>>) {
        self.state().hotload_status = Some(Script::new(results));
    }

    /// Makes the deployment report `identity` as already loaded.
    pub fn set_serving(&self, identity: impl Into<String>) {
        self.state().serving = Some(identity.into());
    }

    pub fn set_endpoint_health(&self, base_url: &str, healthy: bool) {
        let mut state = self.state();
        if healthy {
            state.healthy.insert(base_url.to_string());
        } else {
            state.healthy.remove(base_url);
        }
    }

    /// Fails the next `count` warmup requests.
    pub fn fail_warmups(&self, count: u32) {
        self.state().warmup_failures = count;
    }

    /// Queues an error for the next call of `operation` (a `ControlPlane` method name).
    pub fn inject_error(&self, operation: &'static str, error: ControlError) {
        self.state().injected.entry(operation).or_default().push_back(error);
    }

    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn probe_count(&self, base_url: &str) -> usize {
        self.state().probes.get(base_url).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn probe_successes(&self, base_url: &str) -> usize {
        self.state().probe_successes.get(base_url).copied().unwrap_or(0)
    }

    /// Models named by warmup requests, in order.
    #[must_use]
    pub fn warmup_models(&self) -> Vec<String> {
        self.state().warmup_models.clone()
    }

    #[must_use]
    pub fn hotload_requests(&self) -> Vec<RecordedHotload> {
        self.state().hotloads.clone()
    }

    #[must_use]
    pub fn scaled(&self) -> Vec<(String, u32)> {
        self.state().scaled.clone()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn create_trainer_job(&self, config: &TrainerJobConfig) -> ControlResult<JobRecord> {
        self.enter("create_trainer_job")?;
        let mut state = self.state();
        state.next_job += 1;
        let job_id = config.job_id.clone().unwrap_or_else(|| format!("job-{}", state.next_job));

        if !state.jobs.contains_key(&job_id) {
            let endpoint = Self::default_endpoint(&job_id);
            state.healthy.insert(endpoint.clone());
            let script = vec![
                Ok(Self::job_record(&job_id, JobState::Creating)),
                Ok(Self::job_record(&job_id, JobState::Running).with_endpoint(endpoint)),
            ];
            state.jobs.insert(job_id.clone(), Script::new(script));
        }

        let mut record = Self::job_record(&job_id, JobState::Creating);
        record.display_name.clone_from(&config.display_name);
        Ok(record)
    }

    async fn get_trainer_job(&self, job_id: &str) -> ControlResult<JobRecord> {
        self.enter("get_trainer_job")?;
        self.state()
            .jobs
            .get_mut(job_id)
            .and_then(Script::next)
            .unwrap_or_else(|| Err(Self::not_found("trainer job", job_id)))
    }

    async fn resume_trainer_job(&self, job_id: &str) -> ControlResult<JobRecord> {
        self.enter("resume_trainer_job")?;
        let mut state = self.state();
        if !state.jobs.contains_key(job_id) {
            return Err(Self::not_found("trainer job", job_id));
        }
        if let Some(script) = state.resume_scripts.remove(job_id) {
            state.jobs.insert(job_id.to_string(), Script::new(script));
        }
        Ok(Self::job_record(job_id, JobState::Creating))
    }

    async fn delete_trainer_job(&self, job_id: &str) -> ControlResult<()> {
        self.enter("delete_trainer_job")?;
        match self.state().jobs.remove(job_id) {
            Some(_) => Ok(()),
            None => Err(Self::not_found("trainer job", job_id)),
        }
    }

    async fn probe_endpoint(&self, base_url: &str) -> bool {
        let mut state = self.state();
        *state.calls.entry("probe_endpoint").or_default() += 1;
        *state.probes.entry(base_url.to_string()).or_default() += 1;
        let healthy = state.healthy.contains(base_url);
        if healthy {
            *state.probe_successes.entry(base_url.to_string()).or_default() += 1;
        }
        healthy
    }

    async fn create_deployment(&self, config: &DeploymentConfig) -> ControlResult<DeploymentRecord> {
        self.enter("create_deployment")?;
        let id = config.deployment_id.as_str();
        let with_model = |state: DeploymentState| {
            let mut record = Self::deployment_record(id, state);
            record.base_model = Some(config.base_model.clone());
            record.hot_load_bucket_url.clone_from(&config.hot_load_bucket_url);
            record
        };
        let script = vec![Ok(with_model(DeploymentState::Creating)), Ok(with_model(DeploymentState::Ready))];
        self.state().deployments.insert(id.to_string(), Script::new(script));
        Ok(with_model(DeploymentState::Creating))
    }

    async fn get_deployment(&self, deployment_id: &str) -> ControlResult<DeploymentRecord> {
        self.enter("get_deployment")?;
        self.state()
            .deployments
            .get_mut(deployment_id)
            .and_then(Script::next)
            .unwrap_or_else(|| Err(Self::not_found("deployment", deployment_id)))
    }

    async fn delete_deployment(&self, deployment_id: &str) -> ControlResult<()> {
        self.enter("delete_deployment")?;
        let mut state = self.state();
        if state.deployments.remove(deployment_id).is_none() {
            return Err(Self::not_found("deployment", deployment_id));
        }
        if let Some(script) = state.after_delete_scripts.remove(deployment_id) {
            state.deployments.insert(deployment_id.to_string(), Script::new(script));
        }
        Ok(())
    }

    async fn scale_deployment(&self, deployment_id: &str, replicas: u32) -> ControlResult<DeploymentRecord> {
        self.enter("scale_deployment")?;
        let mut state = self.state();
        let current = match state.deployments.get(deployment_id).and_then(Script::peek) {
            Some(Ok(record)) => record.clone(),
            _ => return Err(Self::not_found("deployment", deployment_id)),
        };
        state.scaled.push((deployment_id.to_string(), replicas));
        Ok(current)
    }

    async fn push_hotload(
        &self,
        deployment_id: &str,
        model: &str,
        request: &HotloadRequest,
    ) -> ControlResult<HotloadAck> {
        self.enter("push_hotload")?;
        let mut state = self.state();
        state.hotloads.push(RecordedHotload {
            deployment_id: deployment_id.to_string(),
            model: model.to_string(),
            request: request.clone(),
        });
        if self.auto_serve {
            state.serving = Some(request.identity.clone());
        }
        Ok(HotloadAck { identity: Some(request.identity.clone()), message: None })
    }

    async fn hotload_status(&self, _deployment_id: &str, _model: &str) -> ControlResult<HotloadStatus> {
        self.enter("hotload_status")?;
        let mut state = self.state();
        if let Some(result) = state.hotload_status.as_mut().and_then(Script::next) {
            return result;
        }
        let replicas = state.serving.iter().map(ReplicaStatus::serving).collect();
        Ok(HotloadStatus { replicas })
    }

    async fn warmup_request(&self, model: &str) -> ControlResult<()> {
        self.enter("warmup_request")?;
        let mut state = self.state();
        state.warmup_models.push(model.to_string());
        if state.warmup_failures > 0 {
            state.warmup_failures -= 1;
            return Err(ControlError::Transient(format!("model {model} not ready")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_last_entry_is_sticky() {
        let plane = MockControlPlane::new();
        plane.script_job(
            "j1",
            vec![MockControlPlane::job_record("j1", JobState::Creating), MockControlPlane::job_record("j1", JobState::Running)],
        );

        assert_eq!(plane.get_trainer_job("j1").await.unwrap().state, JobState::Creating);
        assert_eq!(plane.get_trainer_job("j1").await.unwrap().state, JobState::Running);
        assert_eq!(plane.get_trainer_job("j1").await.unwrap().state, JobState::Running);
        assert_eq!(plane.calls("get_trainer_job"), 3);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let plane = MockControlPlane::new();
        assert!(plane.get_trainer_job("nope").await.unwrap_err().is_not_found());
        assert!(plane.get_deployment("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_injected_error_is_one_shot() {
        let plane = MockControlPlane::new();
        plane.inject_error("warmup_request", ControlError::Transient("boom".to_string()));
        assert!(plane.warmup_request("m").await.is_err());
        assert!(plane.warmup_request("m").await.is_ok());
    }

    #[tokio::test]
    async fn test_auto_serve_reflects_last_push() {
        let plane = MockControlPlane::new();
        assert!(plane.hotload_status("d", "m").await.unwrap().is_scaling_up());

        plane.push_hotload("d", "m", &HotloadRequest::new("s1", None)).await.unwrap();
        assert!(plane.hotload_status("d", "m").await.unwrap().is_serving("s1"));
    }
}
