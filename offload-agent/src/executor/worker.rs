//! Worker tasks: one copy-tool process per non-empty shard.
//!
//! The supervisor talks to workers only through [`WorkerLauncher`] and
//! [`WorkerHandle`].

use std::fs::File;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Serialize;
use tokio::process::{Child, Command};
use tracing::warn;

use crate::config::Target;
use crate::transfer::stats::{parse_results, TransferCounters};
use crate::utils::errors::{OffloadError, Result};

/// Liveness of a worker. Moves from `Running` to `Exited` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerStatus {
    Running,
    /// `code` is `None` when the process was killed by a signal or its status
    /// could not be read.
    Exited { code: Option<i32> },
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Exited { .. })
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, WorkerStatus::Exited { code: Some(0) })
    }
}

/// Everything needed to start a worker for one target.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub group: String,
    pub target: Target,
    pub batch_file: PathBuf,
    pub stdout_file: PathBuf,
    pub stderr_file: PathBuf,
    /// Parallel operations inside the worker
    pub concurrency: usize,
    pub log_level: String,
}

/// A started worker.
pub trait WorkerHandle: Send {
    fn target(&self) -> &str;

    /// OS process id, when the worker is process backed
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check.
    fn try_status(&mut self) -> WorkerStatus;

    /// Counters the worker has reported so far (zero until it reports).
    fn counters(&self) -> TransferCounters;
}

/// Starts workers.
pub trait WorkerLauncher {
    /// Start a worker and return as soon as it is running.
    fn launch(&self, spec: &WorkerSpec) -> Result<Box<dyn WorkerHandle>>;
}

/// Launches the bulk-copy executable:
/// `<tool> --numworkers N --stat --log L --endpoint-url E --profile P run <batch>`.
#[derive(Debug, Clone)]
pub struct CopyToolLauncher {
    tool: String,
}

impl CopyToolLauncher {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    fn command(&self, spec: &WorkerSpec) -> Command {
        let mut command = Command::new(&self.tool);
        command
            .arg("--numworkers")
            .arg(spec.concurrency.to_string())
            .arg("--stat")
            .arg("--log")
            .arg(tool_log_level(&spec.log_level))
            .arg("--endpoint-url")
            .arg(&spec.target.endpoint)
            .arg("--profile")
            .arg(&spec.target.profile)
            .arg("run")
            .arg(&spec.batch_file);
        command
    }
}

impl WorkerLauncher for CopyToolLauncher {
    fn launch(&self, spec: &WorkerSpec) -> Result<Box<dyn WorkerHandle>> {
        let launch_error = |reason: String| OffloadError::Launch {
            target: spec.target.name.clone(),
            reason,
        };

        let stdout = File::create(&spec.stdout_file)
            .map_err(|e| launch_error(format!("cannot create {}: {}", spec.stdout_file.display(), e)))?;
        let stderr = File::create(&spec.stderr_file)
            .map_err(|e| launch_error(format!("cannot create {}: {}", spec.stderr_file.display(), e)))?;

        let child = self
            .command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| launch_error(format!("cannot start {}: {}", self.tool, e)))?;

        Ok(Box::new(ProcessWorker {
            group: spec.group.clone(),
            target: spec.target.name.clone(),
            child,
            stdout_file: spec.stdout_file.clone(),
            status: WorkerStatus::Running,
        }))
    }
}

/// Map our log level onto the levels the copy tool accepts.
fn tool_log_level(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" | "error" => "error",
        _ => "info",
    }
}

/// A running copy-tool process. Not killed on drop: workers outlive the
/// orchestrator if it stops polling.
pub struct ProcessWorker {
    group: String,
    target: String,
    child: Child,
    stdout_file: PathBuf,
    status: WorkerStatus,
}

impl WorkerHandle for ProcessWorker {
    fn target(&self) -> &str {
        &self.target
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_status(&mut self) -> WorkerStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        self.status = match self.child.try_wait() {
            Ok(Some(exit)) => WorkerStatus::Exited { code: exit.code() },
            Ok(None) => WorkerStatus::Running,
            Err(e) => {
                warn!(group = %self.group, target_name = %self.target, error = %e, "Cannot read worker status, treating it as finished");
                WorkerStatus::Exited { code: None }
            }
        };
        self.status
    }

    fn counters(&self) -> TransferCounters {
        let output = match std::fs::read_to_string(&self.stdout_file) {
            Ok(output) => output,
            Err(_) => return TransferCounters::default(),
        };

        match parse_results(&output) {
            Ok(counters) => counters.unwrap_or_default(),
            Err(e) => {
                warn!(group = %self.group, target_name = %self.target, error = %e, "Ignoring unreadable worker results");
                TransferCounters::default()
            }
        }
    }
}
