//! `tandem trainer` subcommands.

use std::time::Duration;

use colored::Colorize;
use serde_json::json;
use tandem_control::{TrainerEndpoint, TrainerJobConfig};

use super::types::{TrainerCommand, TrainerSpecArgs};
use crate::context::AppContext;
use crate::output::{print_endpoint, print_job, print_json};

/// Builds a job request from the shape flags and the configured defaults.
pub fn job_config(ctx: &AppContext, spec: TrainerSpecArgs) -> anyhow::Result<TrainerJobConfig> {
    let mut config = TrainerJobConfig::new(ctx.base_model(spec.base_model)?);
    config.display_name = spec.display_name;
    config.accelerator_type = spec.accelerator_type;
    config.accelerator_count = spec.accelerator_count;
    config.lora_rank = spec.lora_rank;
    config.max_context_length = spec.max_context_length;
    config.region = spec.region;
    Ok(config)
}

fn render_endpoint(json: bool, title: &str, endpoint: &TrainerEndpoint) -> anyhow::Result<()> {
    if json {
        return print_json(endpoint);
    }
    print_endpoint(title, endpoint);
    Ok(())
}

pub async fn execute(ctx: &AppContext, command: TrainerCommand) -> anyhow::Result<()> {
    match command {
        TrainerCommand::Create { spec, job_id, hot_load_deployment, no_wait, json } => {
            let mut config = job_config(ctx, spec)?;
            config.job_id = job_id;
            config.hot_load_deployment_id = hot_load_deployment;

            if no_wait {
                let record = ctx.jobs.create(&config).await?;
                if json || ctx.json {
                    print_json(&record)?;
                } else {
                    println!("{} Trainer job {} created", "✓".green(), record.job_id().cyan());
                }
                return Ok(());
            }

            let endpoint = ctx.jobs.create_and_wait(&config).await?;
            render_endpoint(json || ctx.json, "Trainer ready", &endpoint)
        }
        TrainerCommand::Attach { job_id, json } => {
            let endpoint = ctx.jobs.wait_for_existing(&job_id).await?;
            render_endpoint(json || ctx.json, "Trainer ready", &endpoint)
        }
        TrainerCommand::Resume { job_id, json } => {
            let endpoint = ctx.jobs.resume_and_wait(&job_id).await?;
            render_endpoint(json || ctx.json, "Trainer resumed", &endpoint)
        }
        TrainerCommand::Reconnect { job_id, max_wait_secs, json } => {
            let endpoint = ctx.jobs.reconnect_and_wait(&job_id, Duration::from_secs(max_wait_secs)).await?;
            render_endpoint(json || ctx.json, "Trainer reconnected", &endpoint)
        }
        TrainerCommand::Status { job_id, json } => {
            let record = ctx.jobs.get(&job_id).await?;
            if json || ctx.json {
                return print_json(&record);
            }
            print_job(&record);
            Ok(())
        }
        TrainerCommand::Delete { job_id, json } => {
            ctx.plane.delete_trainer_job(&job_id).await?;
            if json || ctx.json {
                print_json(&json!({ "job_id": job_id, "deleted": true }))
            } else {
                println!("{} Trainer job {} deleted", "✓".green(), job_id.cyan());
                Ok(())
            }
        }
    }
}
