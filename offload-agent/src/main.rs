//! Offload Agent - Main entry point
//!
//! Runs one offload job described by a JSON or TOML job file.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use offload_agent::artifacts::RunLayout;
use offload_agent::config::{self, config_id, JobConfig};
use offload_agent::executor::worker::CopyToolLauncher;
use offload_agent::remote::{check_reachability, CopyToolLister};
use offload_agent::shutdown::ShutdownCoordinator;
use offload_agent::{utils, JobOutcome, Orchestrator};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the job file (.json or .toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the job file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Reconcile and write batch files without launching workers
    #[arg(long)]
    dry_run: bool,

    /// Skip the credential and bucket checks
    #[arg(long)]
    skip_preflight: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load and validate configuration
    let mut config = JobConfig::from_file(&args.config)?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config::validate(&config)?;

    // Every artifact of this run shares the job file name and start time
    let layout = RunLayout::new(&config.log_dir, &config_id(&args.config), &Local::now());
    layout.ensure_dir()?;

    // Initialize logging
    utils::logger::init(&config.log_level, Some(&layout.job_log()))?;

    tracing::info!("Starting offload-agent v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_path = %args.config.display(),
        groups = config.destinations.len(),
        "Read config successful"
    );

    let groups = config.groups();
    let lister = CopyToolLister::new(config.tool.clone());
    if args.skip_preflight {
        tracing::warn!("Skipping credential and bucket checks");
    } else {
        check_reachability(&groups, &lister).await?;
    }

    let shutdown = ShutdownCoordinator::new();
    let signal_listener = shutdown.spawn_listener();

    let launcher = CopyToolLauncher::new(config.tool.clone());
    let orchestrator = Orchestrator::new(config, layout, lister, launcher).dry_run(args.dry_run);
    let summary = orchestrator.run(shutdown.token()).await?;
    signal_listener.abort();

    match summary.outcome {
        JobOutcome::Completed => tracing::info!(
            transferred = summary.report.transferred_files,
            pending = summary.report.pending_files,
            "All workers finished"
        ),
        JobOutcome::Interrupted => tracing::info!("Polling interrupted, workers were left running"),
        JobOutcome::Planned => tracing::info!("Dry run complete, no workers launched"),
    }

    Ok(())
}
