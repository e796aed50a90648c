//! `tandem deployment` subcommands.

use anyhow::bail;
use colored::Colorize;
use serde_json::json;
use tandem_control::DeploymentConfig;

use super::types::{DeploymentCommand, DeploymentSpecArgs};
use crate::context::AppContext;
use crate::output::{print_deployment, print_deployment_info, print_json};

/// Builds a deployment request from the shape flags.
pub fn deployment_config(
    deployment_id: String,
    base_model: String,
    region: Option<String>,
    spec: &DeploymentSpecArgs,
) -> DeploymentConfig {
    let mut config = DeploymentConfig::new(deployment_id, base_model);
    config.accelerator_type.clone_from(&spec.accelerator_type);
    config.accelerator_count = spec.accelerator_count;
    config.min_replica_count = spec.min_replicas;
    config.max_replica_count = spec.max_replicas;
    config.hot_load_bucket_url.clone_from(&spec.hot_load_bucket_url);
    config.region = region;
    config
}

pub async fn execute(ctx: &AppContext, command: DeploymentCommand) -> anyhow::Result<()> {
    match command {
        DeploymentCommand::Up { deployment_id, base_model, region, spec, json } => {
            let config = deployment_config(deployment_id, ctx.base_model(base_model)?, region, &spec);
            let info = ctx.deployments.ensure_ready(&config, spec.force_recreate).await?;
            if json || ctx.json {
                return print_json(&info);
            }
            print_deployment_info("Deployment ready", &info);
            Ok(())
        }
        DeploymentCommand::Status { deployment_id, json } => {
            let Some(record) = ctx.deployments.get(&deployment_id).await? else {
                bail!("Deployment {deployment_id} not found");
            };

            // Replicas answer hotload queries only once the deployment is up.
            let snapshot = match &record.base_model {
                Some(model) => {
                    ctx.deployments.current_snapshot_identity(&deployment_id, model).await.ok().flatten()
                }
                None => None,
            };

            if json || ctx.json {
                return print_json(&json!({ "deployment": record, "current_snapshot": snapshot }));
            }
            print_deployment(&record, snapshot.as_deref());
            Ok(())
        }
        DeploymentCommand::Delete { deployment_id, json } => {
            ctx.plane.delete_deployment(&deployment_id).await?;
            if json || ctx.json {
                return print_json(&json!({ "deployment_id": deployment_id, "deleted": true }));
            }
            println!("{} Deployment {} deletion requested", "✓".green(), deployment_id.cyan());
            Ok(())
        }
        DeploymentCommand::ScaleToZero { deployment_id, json } => {
            let record = ctx.plane.scale_deployment(&deployment_id, 0).await?;
            if json || ctx.json {
                return print_json(&json!({ "deployment_id": deployment_id, "replicas": 0, "state": record.state }));
            }
            println!("{} Deployment {} scaled to zero", "✓".green(), deployment_id.cyan());
            Ok(())
        }
    }
}
