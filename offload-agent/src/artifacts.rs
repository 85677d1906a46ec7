//! Naming of the files a run leaves behind.
//!
//! Every artifact is prefixed with the job file name and the run timestamp, so
//! repeated runs of the same job never overwrite each other.

use chrono::{DateTime, TimeZone};
use std::path::{Path, PathBuf};

/// Run timestamp format, e.g. `142501_31012024`.
const RUN_ID_FORMAT: &str = "%H%M%S_%d%m%Y";

#[derive(Debug, Clone)]
pub struct RunLayout {
    dir: PathBuf,
    prefix: String,
}

impl RunLayout {
    pub fn new<Tz>(dir: &Path, config_id: &str, started: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            dir: dir.to_path_buf(),
            prefix: format!("{}_{}", config_id, started.format(RUN_ID_FORMAT)),
        }
    }

    /// Create the artifact directory
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    pub fn job_log(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.prefix))
    }

    pub fn batch_file(&self, target: &str) -> PathBuf {
        self.per_target("commands_pending", target)
    }

    pub fn stdout_file(&self, target: &str) -> PathBuf {
        self.per_target("stdout", target)
    }

    pub fn stderr_file(&self, target: &str) -> PathBuf {
        self.per_target("stderr", target)
    }

    pub fn report_file(&self) -> PathBuf {
        self.dir.join(format!("{}_report.json", self.prefix))
    }

    fn per_target(&self, kind: &str, target: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.txt", self.prefix, kind, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn layout() -> RunLayout {
        let started = Utc.with_ymd_and_hms(2024, 1, 31, 14, 25, 1).unwrap();
        RunLayout::new(Path::new("logs"), "job.json", &started)
    }

    #[test]
    fn test_artifact_names() {
        let layout = layout();
        assert_eq!(layout.job_log(), PathBuf::from("logs/job.json_142501_31012024.log"));
        assert_eq!(
            layout.batch_file("sbe1"),
            PathBuf::from("logs/job.json_142501_31012024_commands_pending_sbe1.txt")
        );
        assert_eq!(
            layout.stdout_file("sbe1"),
            PathBuf::from("logs/job.json_142501_31012024_stdout_sbe1.txt")
        );
        assert_eq!(
            layout.stderr_file("sbe1"),
            PathBuf::from("logs/job.json_142501_31012024_stderr_sbe1.txt")
        );
        assert_eq!(
            layout.report_file(),
            PathBuf::from("logs/job.json_142501_31012024_report.json")
        );
    }

    #[test]
    fn test_runs_do_not_collide() {
        let later = Utc.with_ymd_and_hms(2024, 1, 31, 14, 25, 2).unwrap();
        let other = RunLayout::new(Path::new("logs"), "job.json", &later);
        assert_ne!(layout().stdout_file("sbe1"), other.stdout_file("sbe1"));
    }
}
