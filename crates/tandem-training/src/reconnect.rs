//! Trainer compute client that survives preemption.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tandem_abstraction::{
    AdamParams, CheckpointType, ComputeError, SavedWeights, TrainerCompute, TrainerConnector, TrainerEndpoint,
};
use tandem_control::TrainerJobManager;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{SessionId, resolve_checkpoint_path};
use crate::error::SyncResult;

/// How hard to try before giving a compute failure back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive connection-class failures tolerated per call.
    pub max_retries: u32,
    /// How long a reconnect waits for the job to leave a transitional state.
    pub max_wait_for_resumable: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 3, max_wait_for_resumable: Duration::from_secs(30 * 60) }
    }
}

struct Connection {
    endpoint: TrainerEndpoint,
    client: Arc<dyn TrainerCompute>,
    generation: u64,
}

/// Wraps a trainer's compute surface with transparent reconnects.
///
/// A call that fails with a connection or not-found error triggers a
/// reconnect through [`TrainerJobManager::reconnect_and_wait`] (resuming the
/// job if it was stopped), a fresh compute client, and a retry. Other errors
/// are returned as-is.
pub struct ReconnectableClient {
    jobs: TrainerJobManager,
    connector: Arc<dyn TrainerConnector>,
    policy: ReconnectPolicy,
    job_id: String,
    session: SessionId,
    connection: RwLock<Connection>,
    reconnect_lock: Mutex<()>,
    reconnects: AtomicU32,
}

impl ReconnectableClient {
    /// Waits for `job_id` to be ready and connects to it.
    ///
    /// # Errors
    /// Fails if the job never becomes ready or the connector cannot reach it.
    pub async fn connect(
        jobs: TrainerJobManager,
        connector: Arc<dyn TrainerConnector>,
        job_id: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> SyncResult<Self> {
        let job_id = job_id.into();
        let endpoint = jobs.wait_for_existing(&job_id).await?;
        let client = connector.connect(&endpoint).await?;
        let session = SessionId::new();
        info!(job_id = %job_id, endpoint = %endpoint.base_url(), session = %session, "Connected to trainer job");

        Ok(Self {
            jobs,
            connector,
            policy,
            job_id,
            session,
            connection: RwLock::new(Connection { endpoint, client, generation: 0 }),
            reconnect_lock: Mutex::new(()),
            reconnects: AtomicU32::new(0),
        })
    }

    /// Carries a session id over from an earlier connection.
    #[must_use]
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    #[must_use]
    pub fn endpoint(&self) -> TrainerEndpoint {
        self.connection.read().unwrap_or_else(PoisonError::into_inner).endpoint.clone()
    }

    /// Number of reconnects performed since construction.
    #[must_use]
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// See [`crate::checkpoint::resolve_checkpoint_path`].
    #[must_use]
    pub fn resolve_checkpoint_path(&self, name: &str, source_job_id: Option<&str>) -> String {
        resolve_checkpoint_path(name, source_job_id)
    }

    fn current(&self) -> (Arc<dyn TrainerCompute>, u64) {
        let connection = self.connection.read().unwrap_or_else(PoisonError::into_inner);
        (connection.client.clone(), connection.generation)
    }

    /// Re-establishes the connection unless another call already did so
    /// since `seen_generation`.
    async fn reconnect(&self, seen_generation: u64) -> SyncResult<()> {
        let _guard = self.reconnect_lock.lock().await;
        if self.current().1 != seen_generation {
            debug!(job_id = %self.job_id, "Connection already re-established by a concurrent call");
            return Ok(());
        }

        let endpoint = self.jobs.reconnect_and_wait(&self.job_id, self.policy.max_wait_for_resumable).await?;
        let client = self.connector.connect(&endpoint).await?;

        info!(job_id = %self.job_id, endpoint = %endpoint.base_url(), "Reconnected to trainer job");
        let mut connection = self.connection.write().unwrap_or_else(PoisonError::into_inner);
        *connection = Connection { endpoint, client, generation: seen_generation + 1 };
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn with_reconnect<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, ComputeError>
    where
        T: Send,
        F: Fn(Arc<dyn TrainerCompute>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ComputeError>> + Send,
    {
        let mut failures = 0u32;
        loop {
            let (client, generation) = self.current();
            match call(client).await {
                Err(e) if e.is_reconnectable() => {
                    failures += 1;
                    if failures >= self.policy.max_retries {
                        error!(job_id = %self.job_id, operation, failures, error = %e, "Trainer call failed after reconnects");
                        return Err(e);
                    }
                    warn!(job_id = %self.job_id, operation, attempt = failures, error = %e, "Trainer connection lost, reconnecting");
                    if let Err(reconnect_err) = self.reconnect(generation).await {
                        error!(job_id = %self.job_id, operation, error = %reconnect_err, "Reconnect to trainer job failed");
                        return Err(e);
                    }
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl TrainerCompute for ReconnectableClient {
    async fn forward(&self, batch: &Value) -> Result<Value, ComputeError> {
        self.with_reconnect("forward", |client| async move { client.forward(batch).await }).await
    }

    async fn forward_backward_custom(&self, batch: &Value, loss_fn: &str) -> Result<Value, ComputeError> {
        self.with_reconnect("forward_backward_custom", |client| async move {
            client.forward_backward_custom(batch, loss_fn).await
        })
        .await
    }

    async fn optim_step(&self, params: &AdamParams) -> Result<Value, ComputeError> {
        self.with_reconnect("optim_step", |client| async move { client.optim_step(params).await }).await
    }

    async fn save_state(&self, name: &str) -> Result<String, ComputeError> {
        self.with_reconnect("save_state", |client| async move { client.save_state(name).await }).await
    }

    async fn save_weights_for_sampler(
        &self,
        name: &str,
        checkpoint_type: CheckpointType,
    ) -> Result<SavedWeights, ComputeError> {
        self.with_reconnect("save_weights_for_sampler", |client| async move {
            client.save_weights_for_sampler(name, checkpoint_type).await
        })
        .await
    }

    async fn load_state_with_optimizer(&self, path: &str) -> Result<(), ComputeError> {
        self.with_reconnect("load_state_with_optimizer", |client| async move {
            client.load_state_with_optimizer(path).await
        })
        .await
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, ComputeError> {
        self.with_reconnect("list_checkpoints", |client| async move { client.list_checkpoints().await }).await
    }
}
