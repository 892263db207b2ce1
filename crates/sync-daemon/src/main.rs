//! todoist-sync: Mirrors Todoist projects into a vault on a fixed interval.
//!
//! Uses the same todoist-sync-core as the Obsidian plugin, but runs as a
//! native binary against a vault directory.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use todoist_sync_daemon::{
    Args, Config, DeviceGuard, NativeFs, RunOutcome, SyncJob, SyncScheduler, TodoistClient,
};

use todoist_sync_core::fs::FileSystem;
use todoist_sync_core::{Reconciler, Vault};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,todoist_sync_daemon=debug"
    } else {
        "info,todoist_sync_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&args).await?;

    info!("Starting todoist-sync");
    info!("Vault path: {:?}", config.vault_path);
    info!("Project folder: {}", config.settings.project_folder);

    let fs = NativeFs::new(config.vault_path.clone());
    if !fs.exists("").await? {
        anyhow::bail!("Vault directory {:?} does not exist", config.vault_path);
    }

    let client = TodoistClient::with_api_url(config.settings.token.clone(), config.api_url.clone())
        .context("Failed to create Todoist client")?;
    let reconciler = Reconciler::new(Vault::new(fs), config.settings.reconcile_config());
    let device = DeviceGuard::new(
        config.settings.primary_device.clone(),
        config.device_name.clone(),
    );
    let job = Arc::new(SyncJob::new(reconciler, client, device));

    if config.once {
        return match job.run_once().await {
            Ok(RunOutcome::Completed(report)) => {
                info!("Sync complete: {}", report);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Sync failed: {}", e);
                Err(e.into())
            }
        };
    }

    let mut scheduler = SyncScheduler::new(job, config.settings.interval());
    scheduler.start();

    info!("Daemon running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.stop();
    info!("Shutting down");
    Ok(())
}
