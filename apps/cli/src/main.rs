//! Tandem CLI - Command-line interface for Tandem training infrastructure
//!
//! This CLI provides a `tandem` command for bringing up trainer jobs and
//! serving deployments, reattaching to preempted trainers, and hotloading
//! weight snapshots.

mod commands;
mod config;
mod context;
mod output;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{DeploymentCommand, HotloadArgs, TrainerCommand, UpArgs, deployment, hotload, trainer, up};
use config::{CliConfig, Overrides};
use context::AppContext;

/// Tandem CLI - trainer and deployment orchestration
#[derive(Parser, Debug)]
#[command(name = "tandem", author, version, about = "Tandem - trainer and deployment orchestration")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Control-plane account (overrides TANDEM_ACCOUNT_ID)
    #[arg(long, global = true)]
    account: Option<String>,

    /// Control-plane URL (overrides TANDEM_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Run against an in-memory control plane (dry run)
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage trainer jobs
    #[command(subcommand)]
    Trainer(TrainerCommand),

    /// Manage serving deployments
    #[command(subcommand)]
    Deployment(DeploymentCommand),

    /// Push a weight snapshot to a deployment and wait until it serves
    Hotload(HotloadArgs),

    /// Bring up trainers and a deployment concurrently
    Up(UpArgs),
}

fn parse_level(raw: &str) -> Level {
    match raw.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cli_config = CliConfig::discover_and_load()?;

    // Logs go to stderr so `--json` output stays parseable.
    let level = parse_level(args.log_level.as_deref().or(cli_config.log_level.as_deref()).unwrap_or("info"));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = Overrides { account_id: args.account, base_url: args.base_url };
    let ctx = AppContext::build(cli_config, &overrides, args.mock)?;

    match args.command {
        Command::Trainer(cmd) => trainer::execute(&ctx, cmd).await?,
        Command::Deployment(cmd) => deployment::execute(&ctx, cmd).await?,
        Command::Hotload(cmd) => hotload::execute(&ctx, cmd).await?,
        Command::Up(cmd) => up::execute(&ctx, cmd).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_hotload_positional_and_status_forms() {
        let args = Args::parse_from(["tandem", "hotload", "serve-1", "snap-2", "--previous", "snap-1"]);
        let Command::Hotload(hotload) = args.command else { panic!("expected hotload") };
        assert!(hotload.command.is_none());
        assert_eq!(hotload.push.snapshot.as_deref(), Some("snap-2"));
        assert_eq!(hotload.push.previous.as_deref(), Some("snap-1"));

        let args = Args::parse_from(["tandem", "hotload", "status", "serve-1"]);
        let Command::Hotload(hotload) = args.command else { panic!("expected hotload") };
        assert!(matches!(hotload.command, Some(commands::types::HotloadCommand::Status { .. })));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }
}
