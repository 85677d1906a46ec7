//! Dispatch of shards and tracking of the workers running them.

use serde::Serialize;
use tracing::{info, warn};

use super::partition::Assignment;
use super::worker::{WorkerHandle, WorkerLauncher, WorkerSpec, WorkerStatus};
use crate::artifacts::RunLayout;
use crate::transfer::stats::TransferCounters;
use crate::utils::errors::Result;

/// Write the shard's batch file and start its worker.
///
/// Returns `Ok(None)` without touching the file system when the shard is
/// empty. Does not wait for the worker to finish.
pub fn dispatch<W: WorkerLauncher + ?Sized>(
    launcher: &W,
    layout: &RunLayout,
    group: &str,
    assignment: &Assignment,
    concurrency: usize,
    log_level: &str,
) -> Result<Option<Box<dyn WorkerHandle>>> {
    if assignment.shard.is_empty() {
        info!(group = %group, target_name = %assignment.target.name, "Empty shard, target not dispatched");
        return Ok(None);
    }

    let target = &assignment.target;
    let spec = WorkerSpec {
        group: group.to_string(),
        target: target.clone(),
        batch_file: layout.batch_file(&target.name),
        stdout_file: layout.stdout_file(&target.name),
        stderr_file: layout.stderr_file(&target.name),
        concurrency,
        log_level: log_level.to_string(),
    };

    assignment.shard.write_batch(&spec.batch_file)?;
    info!(
        group = %group,
        target_name = %target.name,
        commands = assignment.shard.len(),
        batch_file = %spec.batch_file.display(),
        "Wrote copy commands"
    );

    let handle = launcher.launch(&spec)?;
    info!(
        group = %group,
        target_name = %target.name,
        endpoint = %target.endpoint,
        pid = ?handle.pid(),
        "Launched offload worker"
    );
    Ok(Some(handle))
}

/// Final state of one dispatched target.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutcome {
    pub group: String,
    pub target: String,
    pub pid: Option<u32>,
    pub status: WorkerStatus,
    pub counters: TransferCounters,
}

/// A target whose worker never started.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchFailure {
    pub group: String,
    pub target: String,
    pub reason: String,
}

struct TrackedWorker {
    group: String,
    handle: Box<dyn WorkerHandle>,
    status: WorkerStatus,
}

/// Liveness table of every worker in the job, across all groups.
///
/// Each entry moves from running to terminal once and never back, so a
/// single pass over the table is enough to refresh it.
#[derive(Default)]
pub struct WorkerTable {
    workers: Vec<TrackedWorker>,
    launch_failures: Vec<LaunchFailure>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly dispatched worker
    pub fn register(&mut self, group: &str, handle: Box<dyn WorkerHandle>) {
        self.workers.push(TrackedWorker {
            group: group.to_string(),
            handle,
            status: WorkerStatus::Running,
        });
    }

    /// Remember a target whose worker could not be started
    pub fn record_launch_failure(&mut self, group: &str, target: &str, reason: String) {
        self.launch_failures.push(LaunchFailure {
            group: group.to_string(),
            target: target.to_string(),
            reason,
        });
    }

    /// Refresh every running worker without blocking. Returns the number
    /// still running.
    pub fn poll(&mut self) -> usize {
        for worker in self.workers.iter_mut().filter(|w| !w.status.is_terminal()) {
            let status = worker.handle.try_status();
            if !status.is_terminal() {
                continue;
            }

            worker.status = status;
            if status.succeeded() {
                info!(group = %worker.group, target_name = %worker.handle.target(), "Offload worker finished");
            } else {
                warn!(
                    group = %worker.group,
                    target_name = %worker.handle.target(),
                    status = ?status,
                    "Offload worker finished with failures"
                );
            }
        }
        self.running_count()
    }

    /// True once every registered worker is terminal (vacuously for none).
    pub fn all_terminal(&self) -> bool {
        self.workers.iter().all(|w| w.status.is_terminal())
    }

    pub fn running_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| !w.status.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Counters summed over a group's workers
    pub fn counters_for(&self, group: &str) -> TransferCounters {
        self.workers
            .iter()
            .filter(|w| w.group == group)
            .map(|w| w.handle.counters())
            .sum()
    }

    pub fn outcomes(&self) -> Vec<WorkerOutcome> {
        self.workers
            .iter()
            .map(|w| WorkerOutcome {
                group: w.group.clone(),
                target: w.handle.target().to_string(),
                pid: w.handle.pid(),
                status: w.status,
                counters: w.handle.counters(),
            })
            .collect()
    }

    pub fn launch_failures(&self) -> &[LaunchFailure] {
        &self.launch_failures
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::target;
    use crate::executor::partition::Shard;
    use crate::manifest::tests::manifest;
    use crate::utils::errors::OffloadError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Handle that turns terminal after a fixed number of polls.
    pub(crate) struct FakeHandle {
        pub(crate) target: String,
        pub(crate) polls_left: usize,
        pub(crate) exit_code: i32,
        pub(crate) counters: TransferCounters,
        pub(crate) polls: Arc<AtomicUsize>,
    }

    impl FakeHandle {
        pub(crate) fn new(target: &str, polls_left: usize, exit_code: i32) -> Self {
            Self {
                target: target.to_string(),
                polls_left,
                exit_code,
                counters: TransferCounters::default(),
                polls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl WorkerHandle for FakeHandle {
        fn target(&self) -> &str {
            &self.target
        }

        fn pid(&self) -> Option<u32> {
            None
        }

        fn try_status(&mut self) -> WorkerStatus {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.polls_left == 0 {
                return WorkerStatus::Exited {
                    code: Some(self.exit_code),
                };
            }
            self.polls_left -= 1;
            WorkerStatus::Running
        }

        fn counters(&self) -> TransferCounters {
            self.counters
        }
    }

    /// Launcher producing fake handles; targets listed in `fail` do not start.
    #[derive(Default)]
    pub(crate) struct FakeLauncher {
        pub(crate) launched: Mutex<Vec<WorkerSpec>>,
        pub(crate) polls_before_exit: usize,
        pub(crate) exit_code: i32,
        pub(crate) fail: Vec<String>,
    }

    impl WorkerLauncher for FakeLauncher {
        fn launch(&self, spec: &WorkerSpec) -> Result<Box<dyn WorkerHandle>> {
            if self.fail.contains(&spec.target.name) {
                return Err(OffloadError::Launch {
                    target: spec.target.name.clone(),
                    reason: "refused".to_string(),
                });
            }
            self.launched.lock().unwrap().push(spec.clone());
            Ok(Box::new(FakeHandle::new(
                &spec.target.name,
                self.polls_before_exit,
                self.exit_code,
            )))
        }
    }

    fn layout(dir: &TempDir) -> RunLayout {
        RunLayout::new(dir.path(), "job.json", &chrono::Utc::now())
    }

    fn assignment(name: &str, files: &[(&str, u64)]) -> Assignment {
        let delta = manifest(files);
        let shards = crate::executor::partition::partition(
            &delta,
            Path::new("/data"),
            &[target(name, "bucket")],
        );
        shards.into_iter().next().unwrap()
    }

    #[test]
    fn test_empty_shard_is_not_dispatched() {
        let dir = TempDir::new().unwrap();
        let launcher = FakeLauncher::default();
        let empty = Assignment {
            target: target("sbe2", "bucket"),
            shard: Shard::default(),
        };

        let handle = dispatch(&launcher, &layout(&dir), "cluster", &empty, 8, "info").unwrap();
        assert!(handle.is_none());
        assert!(launcher.launched.lock().unwrap().is_empty());
        assert!(!layout(&dir).batch_file("sbe2").exists());
    }

    #[test]
    fn test_dispatch_writes_batch_before_launch() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let launcher = FakeLauncher::default();

        let handle = dispatch(&launcher, &layout, "cluster", &assignment("sbe1", &[("b", 200)]), 8, "info")
            .unwrap()
            .unwrap();
        assert_eq!(handle.target(), "sbe1");

        let launched = launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].concurrency, 8);
        let batch = std::fs::read_to_string(&launched[0].batch_file).unwrap();
        assert_eq!(batch, "cp \"/data/b\" s3://bucket/b\n");
    }

    #[test]
    fn test_dispatch_propagates_launch_error() {
        let dir = TempDir::new().unwrap();
        let launcher = FakeLauncher {
            fail: vec!["sbe1".to_string()],
            ..Default::default()
        };

        let result = dispatch(&launcher, &layout(&dir), "cluster", &assignment("sbe1", &[("b", 1)]), 8, "info");
        assert!(matches!(result, Err(OffloadError::Launch { .. })));
    }

    #[test]
    fn test_table_completes_only_when_every_worker_is_terminal() {
        let mut table = WorkerTable::new();
        table.register("cluster", Box::new(FakeHandle::new("sbe1", 0, 0)));
        table.register("cluster", Box::new(FakeHandle::new("sbe2", 2, 1)));
        table.register("dataimport", Box::new(FakeHandle::new("sbe3", 1, 0)));

        assert_eq!(table.poll(), 2);
        assert!(!table.all_terminal());
        assert_eq!(table.poll(), 1);
        assert!(!table.all_terminal());
        assert_eq!(table.poll(), 0);
        assert!(table.all_terminal());
    }

    #[test]
    fn test_terminal_workers_are_not_polled_again() {
        let handle = FakeHandle::new("sbe1", 0, 3);
        let polls = Arc::clone(&handle.polls);
        let mut table = WorkerTable::new();
        table.register("cluster", Box::new(handle));

        table.poll();
        table.poll();
        table.poll();
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert_eq!(
            table.outcomes()[0].status,
            WorkerStatus::Exited { code: Some(3) }
        );
    }

    #[test]
    fn test_empty_table_is_terminal() {
        let mut table = WorkerTable::new();
        assert_eq!(table.poll(), 0);
        assert!(table.all_terminal());
        assert!(table.is_empty());
    }

    #[test]
    fn test_counters_for_group() {
        let mut one = FakeHandle::new("sbe1", 0, 0);
        one.counters = TransferCounters { total: 5, errors: 1, successes: 4 };
        let mut two = FakeHandle::new("sbe2", 0, 0);
        two.counters = TransferCounters { total: 5, errors: 0, successes: 5 };
        let mut other = FakeHandle::new("sbe3", 0, 0);
        other.counters = TransferCounters { total: 100, errors: 0, successes: 100 };

        let mut table = WorkerTable::new();
        table.register("cluster", Box::new(one));
        table.register("cluster", Box::new(two));
        table.register("dataimport", Box::new(other));

        assert_eq!(
            table.counters_for("cluster"),
            TransferCounters { total: 10, errors: 1, successes: 9 }
        );
        assert_eq!(table.counters_for("missing"), TransferCounters::default());
    }
}
