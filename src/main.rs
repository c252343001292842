//! Outpost Agent - CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use outpost_agent::config::Config;
use outpost_agent::jobs;
use outpost_agent::scheduler::Scheduler;
use outpost_agent::tenant::{TenantClient, AGENT_VERSION};

/// Outpost Agent - persistent maintenance agent
#[derive(Parser)]
#[command(
    name = "outpost-agent",
    about = "Runs scheduled maintenance and telemetry jobs for a remote control-plane",
    version = AGENT_VERSION,
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler in the foreground (default)
    Run,

    /// Test connectivity to the tenant and exit
    Check,
}

fn setup_logging(cli_level: Option<&str>, config_level: &str) {
    // Priority: CLI --log-level > config file > default (info).
    let level = cli_level.unwrap_or(config_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if level.is_empty() { "info" } else { level }));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref())?;
    setup_logging(cli.log_level.as_deref(), &config.logging.level);
    config.validate()?;

    let tenant = TenantClient::new(&config.tenant).wrap_err("failed to build tenant client")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Check => {
            tenant.test_connectivity().await?;
            println!("Connectivity OK.");
            Ok(())
        }
        Command::Run => run_scheduler(config, tenant).await,
    }
}

async fn run_scheduler(config: Config, tenant: TenantClient) -> Result<()> {
    info!(
        version = AGENT_VERSION,
        tenant_url = %config.tenant.url,
        "outpost-agent starting"
    );

    let tenant = Arc::new(tenant);
    let config = Arc::new(config);

    let mut scheduler = Scheduler::new();
    jobs::register(&mut scheduler, tenant, config);

    let handle = scheduler.start();
    info!("scheduler running - press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for shutdown signal")?;

    info!("shutdown signal received, draining in-flight jobs");
    handle.stop().await;
    Ok(())
}
