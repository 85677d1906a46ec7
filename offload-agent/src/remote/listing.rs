//! Destination manifest collection through the listing collaborator.
//!
//! Listings come from the copy tool's `ls` command, one object per line:
//!
//! ```text
//! 2024/01/31 14:02:11          1048576 dataset-0001.tar
//! ```
//!
//! Lines with fewer than four fields (directory markers, blank lines, noise)
//! or without a numeric size are skipped.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{Group, GroupMode, Target};
use crate::manifest::{Manifest, ManifestEntry};
use crate::utils::errors::{OffloadError, Result};

const LISTING_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Remote listing collaborator.
#[async_trait]
pub trait Lister: Send + Sync {
    /// Raw listing of every object in the target's bucket.
    async fn list_objects(&self, target: &Target) -> Result<String>;

    /// Raw listing of the buckets visible to the target's profile.
    async fn list_buckets(&self, target: &Target) -> Result<String>;
}

/// Lister backed by the bulk-copy executable (`s5cmd ls`).
#[derive(Debug, Clone)]
pub struct CopyToolLister {
    tool: String,
}

impl CopyToolLister {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    async fn run_ls(&self, target: &Target, uri: Option<String>) -> Result<String> {
        let mut command = Command::new(&self.tool);
        command
            .arg("--log")
            .arg("error")
            .arg("--endpoint-url")
            .arg(&target.endpoint)
            .arg("--use-list-objects-v1")
            .arg("--profile")
            .arg(&target.profile)
            .arg("ls");
        if let Some(uri) = uri {
            command.arg(uri);
        }

        let output = command.output().await.map_err(|e| {
            OffloadError::Listing(format!("failed to launch {}: {}", self.tool, e))
        })?;

        if !output.status.success() {
            return Err(OffloadError::Listing(format!(
                "{} ls on {} exited with {}: {}",
                self.tool,
                target.endpoint,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| OffloadError::Listing(format!("listing is not valid UTF-8: {}", e)))
    }
}

#[async_trait]
impl Lister for CopyToolLister {
    async fn list_objects(&self, target: &Target) -> Result<String> {
        self.run_ls(target, Some(format!("{}/", target.bucket_root())))
            .await
    }

    async fn list_buckets(&self, target: &Target) -> Result<String> {
        self.run_ls(target, None).await
    }
}

/// Build a fresh destination manifest for `group`.
///
/// Shared-bucket groups are assumed to expose identical bucket state on every
/// target, so only the first target is listed. Listing failures are expected
/// while a destination is still warming up and count as an empty listing.
pub async fn collect_destination<L: Lister + ?Sized>(group: &Group, lister: &L) -> Manifest {
    let targets = match group.mode {
        GroupMode::SharedBucket => &group.targets[..group.targets.len().min(1)],
        GroupMode::Independent => &group.targets[..],
    };

    let mut manifest = Manifest::new();
    for target in targets {
        match lister.list_objects(target).await {
            Ok(output) => manifest.merge(parse_listing(&output)),
            Err(e) => {
                debug!(
                    group = %group.name,
                    target_name = %target.name,
                    error = %e,
                    "Listing failed, treating as empty"
                );
            }
        }
    }
    manifest
}

/// Parse a complete listing into a manifest.
pub fn parse_listing(output: &str) -> Manifest {
    output.lines().filter_map(parse_listing_line).collect()
}

/// Bucket names in a bucket listing (`<date> <time> s3://<bucket>` lines).
pub fn parse_bucket_listing(output: &str) -> HashSet<String> {
    output
        .split_whitespace()
        .filter_map(|token| token.strip_prefix("s3://"))
        .map(|bucket| bucket.trim_end_matches('/').to_string())
        .filter(|bucket| !bucket.is_empty())
        .collect()
}

/// Parse one `<date> <time> <size> <name>` line.
pub fn parse_listing_line(line: &str) -> Option<ManifestEntry> {
    let mut rest = line.trim();
    let mut fields = [""; 3];
    for field in fields.iter_mut() {
        let (head, tail) = rest.split_once(char::is_whitespace)?;
        *field = head;
        rest = tail.trim_start();
    }
    let name = rest.trim_end();
    if name.is_empty() {
        return None;
    }

    let size = match fields[2].parse::<u64>() {
        Ok(size) => size,
        Err(_) => {
            warn!(line = %line, "Skipping listing line with non-numeric size");
            return None;
        }
    };

    let timestamp = NaiveDateTime::parse_from_str(
        &format!("{} {}", fields[0], fields[1]),
        LISTING_TIME_FORMAT,
    )
    .map(|naive| naive.and_utc())
    .unwrap_or_else(|_| DateTime::<Utc>::default());

    Some(ManifestEntry::new(name, size, timestamp))
}
