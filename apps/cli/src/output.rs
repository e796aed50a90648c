//! Human and JSON rendering of command results.

use colored::Colorize;
use serde::Serialize;
use tandem_control::{DeploymentInfo, DeploymentRecord, HotloadStatus, JobRecord, TrainerEndpoint};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_endpoint(title: &str, endpoint: &TrainerEndpoint) {
    println!("{} {}", "✓".green(), title.bold());
    println!("  Job:      {}", endpoint.job_id().cyan());
    println!("  Name:     {}", endpoint.job_name().dimmed());
    println!("  Endpoint: {}", endpoint.base_url().green());
}

pub fn print_job(record: &JobRecord) {
    println!("{}", "Trainer Job".bold().cyan());
    println!("  Job:      {}", record.job_id());
    println!("  Name:     {}", record.name.dimmed());
    println!("  State:    {}", record.state.to_string().yellow());
    match record.endpoint_url() {
        Some(url) => println!("  Endpoint: {}", url.green()),
        None => println!("  Endpoint: {}", "none".dimmed()),
    }
    if let Some(created) = record.create_time {
        println!("  Created:  {}", created.to_rfc3339());
    }
    if record.status.as_ref().and_then(|s| s.message.as_ref()).is_some() || record.error.is_some() {
        println!("  Message:  {}", record.failure_message().red());
    }
}

pub fn print_deployment_info(title: &str, info: &DeploymentInfo) {
    println!("{} {}", "✓".green(), title.bold());
    println!("  Deployment: {}", info.deployment_id.cyan());
    println!("  State:      {}", info.state.to_string().green());
    if let Some(model) = &info.inference_model {
        println!("  Model:      {model}");
    }
    if let Some(bucket) = &info.hotload_bucket {
        println!("  Bucket:     {}", bucket.dimmed());
    }
}

pub fn print_deployment(record: &DeploymentRecord, snapshot: Option<&str>) {
    println!("{}", "Deployment".bold().cyan());
    println!("  Deployment: {}", record.deployment_id());
    println!("  State:      {}", record.state.to_string().yellow());
    if let Some(model) = record.inference_model() {
        println!("  Model:      {model}");
    }
    match snapshot {
        Some(identity) => println!("  Snapshot:   {}", identity.green()),
        None => println!("  Snapshot:   {}", "none".dimmed()),
    }
}

pub fn print_hotload_status(deployment_id: &str, status: &HotloadStatus) {
    println!("{} {}", "Hotload Status:".bold().cyan(), deployment_id);
    if status.is_scaling_up() {
        println!("  {}", "No replicas reported yet".yellow());
        return;
    }
    for (index, replica) in status.replicas.iter().enumerate() {
        let identity = replica.current_snapshot_identity.as_deref().unwrap_or("none");
        let stage = replica.loading_state.as_ref().and_then(|s| s.stage.as_deref()).unwrap_or("-");
        let readiness = if replica.readiness { "ready".green() } else { "not ready".yellow() };
        println!("  [{index}] {identity}  stage={stage}  {readiness}");
        if replica.is_errored() {
            let message = replica.loading_state.as_ref().and_then(|s| s.message.as_deref()).unwrap_or("");
            println!("      {}", message.red());
        }
    }
}
