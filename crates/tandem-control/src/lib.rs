//! Control-plane orchestration for Tandem.
//!
//! This crate manages the remote resources a training run depends on:
//!
//! - **Trainer jobs**: create, poll to ready, resume, reconnect after preemption
//! - **Deployments**: create-or-get, poll to ready, delete, scale to zero
//! - **Hotload**: push weight snapshots to a deployment and wait until served
//!
//! All managers talk to the control plane through the [`ControlPlane`] trait.
//! [`HttpControlPlane`] is the production implementation;
//! [`MockControlPlane`] is a scripted in-memory one for tests and dry runs.

pub mod config;
pub mod deployments;
pub mod error;
pub mod hotload;
pub mod http;
pub mod mock;
pub mod plane;
pub mod provision;
pub mod records;
pub mod retry;
pub mod trainer_jobs;

pub use config::ControlPlaneConfig;
pub use deployments::{DeploymentConfig, DeploymentInfo, DeploymentManager, DeploymentWaitSettings};
pub use error::{ControlError, ControlResult};
pub use hotload::{
    DEFAULT_CHECKSUM_FORMAT, DEFAULT_COMPRESSION_FORMAT, HotloadAck, HotloadRequest, HotloadStatus,
    IncrementalMetadata, LoadingState, ReplicaStatus,
};
pub use http::HttpControlPlane;
pub use mock::{MockControlPlane, RecordedHotload};
pub use plane::ControlPlane;
pub use provision::{ProvisionRequest, Provisioned, provision};
pub use records::{DeploymentRecord, DeploymentState, JobRecord, JobState, RecordStatus};
pub use retry::RetryPolicy;
pub use trainer_jobs::{JobWaitSettings, TrainerJobConfig, TrainerJobManager};

// Re-exported so callers need only this crate for the common value types.
pub use tandem_abstraction::{CheckpointType, TrainerEndpoint};
