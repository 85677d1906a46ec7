//! Job configuration for the offload agent.
//!
//! Loads a JSON or TOML job file (chosen by extension) with environment
//! variable overrides for the scalar settings.

pub mod validation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::utils::errors::{OffloadError, Result};

pub use validation::validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Local directory whose top-level files are offloaded
    pub source: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Parallel operations passed to every copy worker
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Seconds between progress reports
    #[serde(default = "default_reporting_frequency")]
    pub reporting_frequency: u64,

    /// Bulk-copy executable, also used for listings
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Directory for batch files, worker captures and the job log
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Destination groups keyed by group name
    pub destinations: BTreeMap<String, GroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(rename = "type")]
    pub mode: GroupMode,

    #[serde(alias = "snowballs")]
    pub targets: Vec<Target>,
}

/// How the targets of a group relate to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupMode {
    /// Every target fronts the same bucket; listing the first one is enough.
    #[serde(rename = "s3compatible", alias = "shared-bucket")]
    SharedBucket,

    /// Each target owns its own storage.
    #[serde(rename = "snowball", alias = "independent")]
    Independent,
}

/// One physical endpoint of a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub bucket: String,
    pub endpoint: String,
    pub profile: String,
}

impl Target {
    /// Root URI of the target's bucket, without a trailing slash.
    pub fn bucket_root(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}

/// A named destination group, detached from the configuration file.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub mode: GroupMode,
    pub targets: Vec<Target>,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_num_workers() -> usize {
    256
}

fn default_reporting_frequency() -> u64 {
    60
}

fn default_tool() -> String {
    "s5cmd".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl JobConfig {
    /// Load configuration from a JSON or TOML file and apply `OFFLOAD_*` overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(OffloadError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content, path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse file content, picking the format from the file extension.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config = if is_toml {
            toml::from_str(content)?
        } else {
            serde_json::from_str(content)?
        };
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("OFFLOAD_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(workers) = lookup("OFFLOAD_NUM_WORKERS").and_then(|v| v.parse().ok()) {
            self.num_workers = workers;
        }
        if let Some(freq) = lookup("OFFLOAD_REPORTING_FREQUENCY").and_then(|v| v.parse().ok()) {
            self.reporting_frequency = freq;
        }
        if let Some(tool) = lookup("OFFLOAD_TOOL") {
            self.tool = tool;
        }
        if let Some(dir) = lookup("OFFLOAD_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
    }

    /// Destination groups in a stable (name) order
    pub fn groups(&self) -> Vec<Group> {
        self.destinations
            .iter()
            .map(|(name, group)| Group {
                name: name.clone(),
                mode: group.mode,
                targets: group.targets.clone(),
            })
            .collect()
    }
}

/// Identifier of a job file used in artifact names: its file name.
pub fn config_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string())
}
