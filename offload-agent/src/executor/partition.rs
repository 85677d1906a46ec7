//! Splitting a group's delta into one shard per target.
//!
//! The delta's identities are cut into contiguous runs in key order. With `K`
//! files and `N` targets the first `K mod N` shards hold `ceil(K/N)` files and
//! the rest `floor(K/N)`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::Target;
use crate::manifest::{object_key, Delta};

/// One line of a worker's batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInstruction {
    /// Absolute path of the local file
    pub source: PathBuf,
    /// `s3://bucket/key` the file is copied to
    pub destination: String,
    /// Manifest identity the instruction was built from
    pub identity: String,
    pub size: u64,
}

impl CopyInstruction {
    /// Render as a copy-tool command line.
    pub fn render(&self) -> String {
        format!("cp \"{}\" {}", self.source.display(), self.destination)
    }
}

/// The ordered instructions assigned to one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shard {
    pub instructions: Vec<CopyInstruction>,
}

impl Shard {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.instructions.iter().map(|i| i.size).sum()
    }

    /// Batch file content, one instruction per line.
    pub fn render_batch(&self) -> String {
        let mut batch = String::new();
        for instruction in &self.instructions {
            let _ = writeln!(batch, "{}", instruction.render());
        }
        batch
    }

    /// Persist the batch file before a worker consumes it.
    pub fn write_batch(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.render_batch())
    }
}

/// A target and the shard it will copy.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: Target,
    pub shard: Shard,
}

/// Shard sizes for `total` items over `parts` targets.
pub fn shard_sizes(total: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = total / parts;
    let extra = total % parts;
    (0..parts)
        .map(|index| if index < extra { base + 1 } else { base })
        .collect()
}

/// Split `delta` across `targets`, preserving target order.
pub fn partition(delta: &Delta, source_root: &Path, targets: &[Target]) -> Vec<Assignment> {
    let mut entries = delta.iter();

    shard_sizes(delta.len(), targets.len())
        .into_iter()
        .zip(targets)
        .map(|(size, target)| {
            let instructions = entries
                .by_ref()
                .take(size)
                .map(|entry| CopyInstruction {
                    source: source_root.join(&entry.identity),
                    destination: format!(
                        "{}/{}",
                        target.bucket_root(),
                        object_key(&entry.identity)
                    ),
                    identity: entry.identity.clone(),
                    size: entry.size,
                })
                .collect();

            Assignment {
                target: target.clone(),
                shard: Shard { instructions },
            }
        })
        .collect()
}
