//! `tandem hotload` command.

use std::time::Duration;

use anyhow::{Context, bail};
use colored::Colorize;
use serde_json::json;
use tandem_control::IncrementalMetadata;

use super::types::{HotloadArgs, HotloadCommand, HotloadPushArgs};
use crate::context::AppContext;
use crate::output::{print_hotload_status, print_json};

pub async fn execute(ctx: &AppContext, args: HotloadArgs) -> anyhow::Result<()> {
    match args.command {
        Some(HotloadCommand::Status { deployment_id, model, json }) => {
            let model = resolve_model(ctx, &deployment_id, model).await?;
            let status = ctx.deployments.hotload_check_status(&deployment_id, &model).await?;
            if json || ctx.json {
                return print_json(&status);
            }
            print_hotload_status(&deployment_id, &status);
            Ok(())
        }
        None => push(ctx, args.push).await,
    }
}

async fn push(ctx: &AppContext, args: HotloadPushArgs) -> anyhow::Result<()> {
    let (Some(deployment_id), Some(snapshot)) = (args.deployment_id, args.snapshot) else {
        bail!("Usage: tandem hotload <DEPLOYMENT_ID> <SNAPSHOT> [--previous <ID>]");
    };
    let model = resolve_model(ctx, &deployment_id, args.model).await?;
    let incremental = args.previous.map(IncrementalMetadata::with_defaults);
    let delta = incremental.is_some();

    if args.no_wait {
        let ack = ctx.deployments.hotload(&deployment_id, &model, &snapshot, incremental).await?;
        if args.json || ctx.json {
            return print_json(&ack);
        }
        println!("{} Hotload of {} accepted by {}", "✓".green(), snapshot.cyan(), deployment_id);
        return Ok(());
    }

    ctx.deployments
        .hotload_and_wait(
            &deployment_id,
            &model,
            &snapshot,
            incremental,
            Duration::from_secs(args.timeout_secs),
            Duration::from_secs(args.poll_secs),
        )
        .await?;

    if args.json || ctx.json {
        return print_json(&json!({ "deployment_id": deployment_id, "snapshot": snapshot, "delta": delta, "loaded": true }));
    }
    let kind = if delta { "delta" } else { "base" };
    println!("{} {} snapshot {} is serving on {}", "✓".green(), kind, snapshot.cyan(), deployment_id);
    Ok(())
}

/// The explicit model, else the deployment's base model, else the
/// configured default.
async fn resolve_model(ctx: &AppContext, deployment_id: &str, explicit: Option<String>) -> anyhow::Result<String> {
    if let Some(model) = explicit {
        return Ok(model);
    }
    let from_deployment = ctx
        .deployments
        .get(deployment_id)
        .await
        .with_context(|| format!("Failed to look up deployment {deployment_id}"))?
        .and_then(|record| record.base_model);
    from_deployment
        .or_else(|| ctx.config.base_model.clone())
        .with_context(|| format!("Cannot determine the base model of {deployment_id}; pass --model"))
}
