//! Command implementations for the Tandem CLI.

pub mod deployment;
pub mod hotload;
pub mod trainer;
pub mod types;
pub mod up;

pub use types::{DeploymentCommand, HotloadArgs, TrainerCommand, UpArgs};
