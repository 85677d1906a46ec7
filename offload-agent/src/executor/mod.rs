//! Offload job executor - orchestrates a run from reconciliation to the final
//! report.
//!
//! A run captures the source once, then for every destination group computes
//! the delta, partitions it over the group's targets and dispatches one worker
//! per non-empty shard. It then polls until every worker is terminal (or a
//! shutdown is requested), reporting progress on each tick.

pub mod partition;
pub mod schedule;
pub mod supervisor;
pub mod worker;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifacts::RunLayout;
use crate::config::{Group, JobConfig};
use crate::fs::collect_source;
use crate::manifest::{Delta, Manifest};
use crate::remote::listing::{collect_destination, Lister};
use crate::sync::delta::{diff, DeltaSummary};
use crate::transfer::progress::{report_cycle, JobReport};
use crate::utils::errors::{OffloadError, Result};
use partition::{partition, Assignment};
use schedule::{Cycle, PollSchedule};
use supervisor::{dispatch, WorkerTable};
use worker::WorkerLauncher;

/// What one group looked like when the run started, and how its work was split.
#[derive(Debug, Clone)]
pub struct GroupRun {
    pub group: Group,
    /// Objects at the destination before any worker started
    pub initial_destination_files: usize,
    pub initial_delta: Delta,
    pub assignments: Vec<Assignment>,
}

impl GroupRun {
    /// Reconcile the group against `source` and partition what is missing.
    pub async fn plan<L: Lister + ?Sized>(
        group: Group,
        source: &Manifest,
        source_root: &Path,
        lister: &L,
    ) -> Self {
        let destination = collect_destination(&group, lister).await;
        let delta = diff(source, &destination);
        let summary = DeltaSummary::new(source, &delta);

        info!(
            group = %group.name,
            pending_bytes = summary.pending_bytes,
            "Found {} pending files and {} completed files",
            summary.pending_files,
            summary.completed_files
        );

        let assignments = partition(&delta, source_root, &group.targets);
        Self {
            initial_destination_files: destination.len(),
            initial_delta: delta,
            assignments,
            group,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every dispatched worker is terminal.
    Completed,
    /// Polling stopped on a signal; workers may still be running.
    Interrupted,
    /// Dry run: batch files written, nothing launched.
    Planned,
}

/// Result of [`Orchestrator::run`].
#[derive(Debug)]
pub struct JobSummary {
    pub outcome: JobOutcome,
    pub report: JobReport,
}

/// Drives one offload job.
pub struct Orchestrator<L, W> {
    config: JobConfig,
    layout: RunLayout,
    lister: L,
    launcher: W,
    dry_run: bool,
}

impl<L: Lister, W: WorkerLauncher> Orchestrator<L, W> {
    pub fn new(config: JobConfig, layout: RunLayout, lister: L, launcher: W) -> Self {
        Self {
            config,
            layout,
            lister,
            launcher,
            dry_run: false,
        }
    }

    /// Plan and write batch files without launching workers
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<JobSummary> {
        let started = Instant::now();
        self.layout.ensure_dir()?;

        let source_root = resolve_source(&self.config.source)?;
        let source = collect_source(&source_root)?;
        info!(
            source = %source_root.display(),
            files = source.len(),
            bytes = source.total_bytes(),
            "Collected source manifest"
        );
        ensure_unique_keys(&source)?;

        let mut table = WorkerTable::new();
        let mut runs = Vec::new();
        for group in self.config.groups() {
            let run = GroupRun::plan(group, &source, &source_root, &self.lister).await;
            if self.dry_run {
                self.write_plan(&run)?;
            } else {
                self.dispatch_group(&run, &mut table);
            }
            runs.push(run);
        }

        let outcome = if self.dry_run {
            JobOutcome::Planned
        } else if table.is_empty() {
            info!("Nothing to copy, every destination is up to date");
            JobOutcome::Completed
        } else {
            info!(workers = table.len(), "All workers dispatched, polling progress");
            self.poll_until_done(&runs, &source, started, &mut table, &shutdown)
                .await
        };

        let report = report_cycle(&runs, &source, started, &self.lister, &table).await;
        print!("{}", report.render_bars());
        report.log();

        let report_file = self.layout.report_file();
        report.write_json(&report_file)?;
        info!(report = %report_file.display(), outcome = ?outcome, "Offload job finished");

        Ok(JobSummary { outcome, report })
    }

    async fn poll_until_done(
        &self,
        runs: &[GroupRun],
        source: &Manifest,
        started: Instant,
        table: &mut WorkerTable,
        shutdown: &CancellationToken,
    ) -> JobOutcome {
        let period = Duration::from_secs(self.config.reporting_frequency);
        let mut schedule = PollSchedule::new(period);

        loop {
            match schedule.next(table, shutdown).await {
                Cycle::Report => {
                    let report = report_cycle(runs, source, started, &self.lister, table).await;
                    print!("{}", report.render_bars());
                    report.log();
                }
                Cycle::Complete => return JobOutcome::Completed,
                Cycle::Interrupted => {
                    warn!(
                        running = table.running_count(),
                        "Stopped polling; running workers continue in the background"
                    );
                    return JobOutcome::Interrupted;
                }
            }
        }
    }

    fn dispatch_group(&self, run: &GroupRun, table: &mut WorkerTable) {
        for assignment in &run.assignments {
            let dispatched = dispatch(
                &self.launcher,
                &self.layout,
                &run.group.name,
                assignment,
                self.config.num_workers,
                &self.config.log_level,
            );

            match dispatched {
                Ok(Some(handle)) => table.register(&run.group.name, handle),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        group = %run.group.name,
                        target_name = %assignment.target.name,
                        error = %e,
                        "Failed to dispatch worker"
                    );
                    table.record_launch_failure(&run.group.name, &assignment.target.name, e.to_string());
                }
            }
        }
    }

    fn write_plan(&self, run: &GroupRun) -> Result<()> {
        for assignment in run.assignments.iter().filter(|a| !a.shard.is_empty()) {
            let batch_file = self.layout.batch_file(&assignment.target.name);
            assignment.shard.write_batch(&batch_file)?;
            info!(
                group = %run.group.name,
                target_name = %assignment.target.name,
                commands = assignment.shard.len(),
                bytes = assignment.shard.total_bytes(),
                batch_file = %batch_file.display(),
                "Dry run, batch written but not launched"
            );
        }
        Ok(())
    }
}

/// Refuse sources where two files would be uploaded under the same key.
fn ensure_unique_keys(source: &Manifest) -> Result<()> {
    let collisions = source.key_collisions();
    match collisions.iter().next() {
        None => Ok(()),
        Some((key, identities)) => Err(OffloadError::Source(format!(
            "{} files would upload to the same object key ({} in total), e.g. {:?} -> {}",
            identities.len(),
            collisions.len(),
            identities,
            key
        ))),
    }
}

fn resolve_source(source: &Path) -> Result<PathBuf> {
    source.canonicalize().map_err(|e| {
        OffloadError::Source(format!("cannot resolve {}: {}", source.display(), e))
    })
}
