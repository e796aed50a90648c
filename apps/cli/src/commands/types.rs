//! Command type definitions shared between main.rs and the command modules.

use clap::{Args, Subcommand};

/// Trainer shape flags shared by `trainer create` and `up`.
#[derive(Args, Debug, Clone, Default)]
pub struct TrainerSpecArgs {
    /// Base model to fine-tune (defaults to base_model from the config file)
    #[arg(long)]
    pub base_model: Option<String>,

    /// Human-readable job name
    #[arg(long)]
    pub display_name: Option<String>,

    /// Accelerator type (e.g. NVIDIA_H100_80GB)
    #[arg(long)]
    pub accelerator_type: Option<String>,

    /// Number of accelerators
    #[arg(long)]
    pub accelerator_count: Option<u32>,

    /// LoRA rank; full fine-tuning when omitted
    #[arg(long)]
    pub lora_rank: Option<u32>,

    /// Maximum context length in tokens
    #[arg(long)]
    pub max_context_length: Option<u32>,

    /// Region to place the job in
    #[arg(long)]
    pub region: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TrainerCommand {
    /// Create a trainer job and wait until it is ready
    Create {
        #[command(flatten)]
        spec: TrainerSpecArgs,

        /// Job id to request (generated by the control plane when omitted)
        #[arg(long)]
        job_id: Option<String>,

        /// Deployment the trainer writes servable snapshots for
        #[arg(long)]
        hot_load_deployment: Option<String>,

        /// Return as soon as the job is created
        #[arg(long)]
        no_wait: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Wait for an existing trainer job to become ready
    Attach {
        job_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resume a stopped trainer job and wait until it is ready
    Resume {
        job_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reattach to a job, resuming it if it was preempted
    Reconnect {
        job_id: String,

        /// Seconds to wait for a job in a transitional state
        #[arg(long, default_value_t = 1800)]
        max_wait_secs: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a trainer job
    Status {
        job_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a trainer job
    Delete {
        job_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Deployment shape flags shared by `deployment up` and `up`.
#[derive(Args, Debug, Clone, Default)]
pub struct DeploymentSpecArgs {
    /// Accelerator type for serving replicas
    #[arg(long = "deployment-accelerator-type", id = "deployment_accelerator_type")]
    pub accelerator_type: Option<String>,

    /// Accelerators per serving replica
    #[arg(long = "deployment-accelerator-count", id = "deployment_accelerator_count")]
    pub accelerator_count: Option<u32>,

    /// Minimum replica count
    #[arg(long, default_value_t = 1)]
    pub min_replicas: u32,

    /// Maximum replica count
    #[arg(long, default_value_t = 1)]
    pub max_replicas: u32,

    /// Bucket the deployment loads hotloaded snapshots from
    #[arg(long)]
    pub hot_load_bucket_url: Option<String>,

    /// Delete and recreate the deployment even if it is healthy
    #[arg(long)]
    pub force_recreate: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DeploymentCommand {
    /// Create (or reuse) a deployment and wait until it is ready
    Up {
        deployment_id: String,

        /// Base model to serve (defaults to base_model from the config file)
        #[arg(long)]
        base_model: Option<String>,

        /// Region to place the deployment in
        #[arg(long)]
        region: Option<String>,

        #[command(flatten)]
        spec: DeploymentSpecArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a deployment and the snapshot it serves
    Status {
        deployment_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a deployment
    Delete {
        deployment_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scale a deployment to zero replicas
    ScaleToZero {
        deployment_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Push a weight snapshot to a deployment, or inspect its hotload status.
#[derive(Args, Debug, Clone)]
#[command(args_conflicts_with_subcommands = true)]
pub struct HotloadArgs {
    #[command(subcommand)]
    pub command: Option<HotloadCommand>,

    #[command(flatten)]
    pub push: HotloadPushArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct HotloadPushArgs {
    /// Deployment to hotload into
    pub deployment_id: Option<String>,

    /// Snapshot identity to load
    pub snapshot: Option<String>,

    /// Snapshot the deployment currently serves; makes this a delta hotload
    #[arg(long)]
    pub previous: Option<String>,

    /// Deployment base model (looked up from the deployment when omitted)
    #[arg(long)]
    pub model: Option<String>,

    /// Seconds to wait for replicas to serve the snapshot
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,

    /// Seconds between status polls
    #[arg(long, default_value_t = 2)]
    pub poll_secs: u64,

    /// Return once the push is accepted
    #[arg(long)]
    pub no_wait: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum HotloadCommand {
    /// Show per-replica hotload status
    Status {
        deployment_id: String,

        /// Deployment base model (looked up from the deployment when omitted)
        #[arg(long)]
        model: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Bring up a policy trainer, an optional reference trainer and an optional
/// deployment concurrently.
#[derive(Args, Debug, Clone)]
pub struct UpArgs {
    #[command(flatten)]
    pub trainer: TrainerSpecArgs,

    /// Also create a reference trainer
    #[arg(long)]
    pub reference: bool,

    /// Base model of the reference trainer (defaults to the policy's)
    #[arg(long)]
    pub reference_model: Option<String>,

    /// Deployment to create or reuse for serving the policy
    #[arg(long)]
    pub deployment: Option<String>,

    #[command(flatten)]
    pub deployment_spec: DeploymentSpecArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
