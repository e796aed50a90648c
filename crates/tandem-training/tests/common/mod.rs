//! Shared fakes for the trainer compute surface.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};
use tandem_abstraction::{
    AdamParams, CheckpointType, ComputeError, SavedWeights, TrainerCompute, TrainerConnector, TrainerEndpoint,
};

#[derive(Default)]
pub struct TrainerLog {
    pub saves: Vec<(String, CheckpointType)>,
    pub state_saves: Vec<String>,
    pub loads: Vec<String>,
    pub call_results: VecDeque<Result<Value, ComputeError>>,
    pub calls: u32,
    pub fail_saves: bool,
    pub fail_state_saves: bool,
}

/// In-memory trainer. Clones share one log, so a reconnected client sees
/// the same script as the one it replaced.
#[derive(Clone, Default)]
pub struct FakeTrainer {
    log: Arc<Mutex<TrainerLog>>,
}

impl FakeTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, TrainerLog> {
        self.log.lock().unwrap()
    }

    /// Results for the next forward/backward/optimizer calls, in order.
    pub fn script_calls(&self, results: Vec<Result<Value, ComputeError>>) {
        self.log().call_results = results.into();
    }

    pub fn saves(&self) -> Vec<(String, CheckpointType)> {
        self.log().saves.clone()
    }

    fn next_call(&self) -> Result<Value, ComputeError> {
        let mut log = self.log();
        log.calls += 1;
        log.call_results.pop_front().unwrap_or_else(|| Ok(json!({ "loss": 0.5 })))
    }
}

#[async_trait]
impl TrainerCompute for FakeTrainer {
    async fn forward(&self, _batch: &Value) -> Result<Value, ComputeError> {
        self.next_call()
    }

    async fn forward_backward_custom(&self, _batch: &Value, _loss_fn: &str) -> Result<Value, ComputeError> {
        self.next_call()
    }

    async fn optim_step(&self, _params: &AdamParams) -> Result<Value, ComputeError> {
        self.next_call()
    }

    async fn save_state(&self, name: &str) -> Result<String, ComputeError> {
        let mut log = self.log();
        if log.fail_state_saves {
            return Err(ComputeError::Trainer("checkpoint store unavailable".to_string()));
        }
        log.state_saves.push(name.to_string());
        Ok(format!("gs://checkpoints/{name}"))
    }

    async fn save_weights_for_sampler(
        &self,
        name: &str,
        checkpoint_type: CheckpointType,
    ) -> Result<SavedWeights, ComputeError> {
        let mut log = self.log();
        if log.fail_saves {
            return Err(ComputeError::Trainer("disk full".to_string()));
        }
        log.saves.push((name.to_string(), checkpoint_type));
        Ok(SavedWeights {
            snapshot_name: name.to_string(),
            path: Some(format!("gs://snapshots/{name}")),
            checkpoint_type,
        })
    }

    async fn load_state_with_optimizer(&self, path: &str) -> Result<(), ComputeError> {
        self.log().loads.push(path.to_string());
        Ok(())
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, ComputeError> {
        Ok(self.log().state_saves.clone())
    }
}

/// Hands out clients for one `FakeTrainer` and counts connects.
pub struct FakeConnector {
    trainer: FakeTrainer,
    connects: AtomicU32,
    endpoints: Mutex<Vec<TrainerEndpoint>>,
}

impl FakeConnector {
    pub fn new(trainer: FakeTrainer) -> Self {
        Self { trainer, connects: AtomicU32::new(0), endpoints: Mutex::new(Vec::new()) }
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<TrainerEndpoint> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrainerConnector for FakeConnector {
    async fn connect(&self, endpoint: &TrainerEndpoint) -> Result<Arc<dyn TrainerCompute>, ComputeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.clone());
        Ok(Arc::new(self.trainer.clone()))
    }
}
