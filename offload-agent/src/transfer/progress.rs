//! Job-wide progress reporting.
//!
//! Every cycle re-lists each group's destination, recomputes what is left to
//! copy against the source captured at startup and combines it with the
//! counters the workers have reported. Throughput is measured in files per
//! second since the job started.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use super::stats::TransferCounters;
use crate::executor::supervisor::{LaunchFailure, WorkerOutcome, WorkerTable};
use crate::executor::GroupRun;
use crate::manifest::Manifest;
use crate::remote::listing::{collect_destination, Lister};
use crate::sync::delta::diff;
use crate::utils::errors::Result;

const BYTES_PER_GB: f64 = 1_000_000_000.0;
const BAR_WIDTH: usize = 50;

/// Progress of one destination group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupProgress {
    pub group: String,
    pub source_files: usize,
    pub source_bytes: u64,
    pub remaining_files: usize,
    pub remaining_bytes: u64,
    pub copied_bytes: u64,
    /// 0-100; an empty source counts as fully copied
    pub percent_copied: f64,
    pub destination_files: usize,
    /// Objects that appeared at the destination since the job started
    pub transferred_files: usize,
    pub counters: TransferCounters,
}

impl GroupProgress {
    pub fn measure(
        group: &str,
        source: &Manifest,
        destination: &Manifest,
        initial_destination_files: usize,
        counters: TransferCounters,
    ) -> Self {
        let remaining = diff(source, destination);
        let source_bytes = source.total_bytes();
        let remaining_bytes = remaining.total_bytes();
        let copied_bytes = source_bytes.saturating_sub(remaining_bytes);

        let percent_copied = if source_bytes == 0 {
            100.0
        } else {
            copied_bytes as f64 / source_bytes as f64 * 100.0
        };

        Self {
            group: group.to_string(),
            source_files: source.len(),
            source_bytes,
            remaining_files: remaining.len(),
            remaining_bytes,
            copied_bytes,
            percent_copied,
            destination_files: destination.len(),
            transferred_files: destination.len().saturating_sub(initial_destination_files),
            counters,
        }
    }
}

/// Snapshot of the whole job at one reporting cycle.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub elapsed_secs: f64,
    /// Files that needed copying when the job started, over all groups
    pub pending_files: usize,
    pub transferred_files: usize,
    pub remaining_files: usize,
    pub files_per_second: f64,
    /// `None` while nothing has been transferred yet
    pub eta_secs: Option<f64>,
    /// True once every worker is terminal
    pub complete: bool,
    pub groups: Vec<GroupProgress>,
    pub workers: Vec<WorkerOutcome>,
    pub launch_failures: Vec<LaunchFailure>,
}

impl JobReport {
    pub fn new(groups: Vec<GroupProgress>, pending_files: usize, elapsed: Duration) -> Self {
        let transferred_files: usize = groups.iter().map(|g| g.transferred_files).sum();
        let remaining_files = pending_files.saturating_sub(transferred_files);
        let files_per_second = throughput(transferred_files, elapsed);
        let eta_secs = estimate_remaining(remaining_files, files_per_second).map(|d| d.as_secs_f64());

        Self {
            elapsed_secs: elapsed.as_secs_f64(),
            pending_files,
            transferred_files,
            remaining_files,
            files_per_second,
            eta_secs,
            complete: false,
            groups,
            workers: Vec::new(),
            launch_failures: Vec::new(),
        }
    }

    /// Attach worker states from the liveness table.
    pub fn with_workers(mut self, table: &WorkerTable) -> Self {
        self.complete = table.all_terminal();
        self.workers = table.outcomes();
        self.launch_failures = table.launch_failures().to_vec();
        self
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs)
    }

    pub fn eta(&self) -> Option<Duration> {
        self.eta_secs.map(Duration::from_secs_f64)
    }

    /// One progress bar per group.
    pub fn render_bars(&self) -> String {
        let mut out = String::new();
        for group in &self.groups {
            let _ = writeln!(out, "{}", progress_bar(group.percent_copied, &group.group));
        }
        out
    }

    /// Emit the cycle's log lines.
    pub fn log(&self) {
        for group in &self.groups {
            info!(
                "[{}] {} of {} copied. {} remaining",
                group.group,
                format_gb(group.copied_bytes),
                format_gb(group.source_bytes),
                format_gb(group.remaining_bytes)
            );
            info!(
                "{} out of {} transfers failed",
                group.counters.errors, group.counters.total
            );
        }

        info!("Time Elapsed: {}", format_duration(self.elapsed().as_secs()));
        info!(
            "Files Transferred: {} / {}",
            self.transferred_files, self.pending_files
        );
        if self.transferred_files > 0 {
            info!("Transfer Speed: {:.2} files per second", self.files_per_second);
        }
        match self.eta() {
            Some(eta) => info!("Estimated Time Remaining: {}", format_duration(eta.as_secs())),
            None => info!("Estimated Time Remaining: unknown"),
        }
    }

    /// Persist the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Run one reporting cycle over every group.
pub async fn report_cycle<L: Lister + ?Sized>(
    runs: &[GroupRun],
    source: &Manifest,
    started: Instant,
    lister: &L,
    table: &WorkerTable,
) -> JobReport {
    let mut groups = Vec::with_capacity(runs.len());
    for run in runs {
        let destination = collect_destination(&run.group, lister).await;
        groups.push(GroupProgress::measure(
            &run.group.name,
            source,
            &destination,
            run.initial_destination_files,
            table.counters_for(&run.group.name),
        ));
    }

    let pending_files = runs.iter().map(|run| run.initial_delta.len()).sum();
    JobReport::new(groups, pending_files, started.elapsed()).with_workers(table)
}

/// Files per second; zero when no time has passed.
pub fn throughput(transferred_files: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        transferred_files as f64 / secs
    } else {
        0.0
    }
}

/// Time left at the current throughput, unknown while it is zero.
pub fn estimate_remaining(remaining_files: usize, files_per_second: f64) -> Option<Duration> {
    if files_per_second > 0.0 && files_per_second.is_finite() {
        Some(Duration::from_secs_f64(remaining_files as f64 / files_per_second))
    } else {
        None
    }
}

/// Decimal gigabytes with one decimal, e.g. `12.5GB`.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.1}GB", bytes as f64 / BYTES_PER_GB)
}

/// Format duration as `05 Sec`, `02 Min 05 Sec` or `01 Hr 02 Min 05 Sec`.
pub fn format_duration(seconds: u64) -> String {
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if seconds < 60 {
        format!("{:02} Sec", secs)
    } else if seconds < 3600 {
        format!("{:02} Min {:02} Sec", minutes, secs)
    } else {
        format!("{:02} Hr {:02} Min {:02} Sec", hours, minutes, secs)
    }
}

/// `[=====     ] 50%  label`
pub fn progress_bar(percent: f64, label: &str) -> String {
    let fraction = (percent / 100.0).clamp(0.0, 1.0);
    let filled = (BAR_WIDTH as f64 * fraction) as usize;
    format!(
        "[{:<width$}] {}%  {}",
        "=".repeat(filled),
        (fraction * 100.0) as u32,
        label,
        width = BAR_WIDTH
    )
}
