//! Source manifest collection.
//!
//! Only the top level of the source directory is offloaded: entries are listed
//! non-recursively and sub-directories are ignored.

use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::manifest::{Manifest, ManifestEntry};
use crate::utils::errors::{OffloadError, Result};

/// Build the source manifest for `root`.
///
/// # Returns
/// * `Ok(Manifest)` - one entry per regular file (or symlink to one) in `root`
/// * `Err(OffloadError)` - if `root` is missing or cannot be read
pub fn collect_source(root: &Path) -> Result<Manifest> {
    if !root.is_dir() {
        return Err(OffloadError::Source(format!(
            "{} is not a readable directory",
            root.display()
        )));
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    let mut manifest = Manifest::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            OffloadError::Source(format!("failed to list {}: {}", root.display(), e))
        })?;

        if let Some(manifest_entry) = entry_for(&entry)? {
            manifest.insert(manifest_entry);
        }
    }

    tracing::debug!(
        source = %root.display(),
        files = manifest.len(),
        bytes = manifest.total_bytes(),
        "Collected source manifest"
    );
    Ok(manifest)
}

/// Manifest entry for a directory entry, `None` for directories, symlinks to
/// directories and broken symlinks.
fn entry_for(entry: &DirEntry) -> Result<Option<ManifestEntry>> {
    let raw_metadata = entry.metadata().map_err(|e| {
        OffloadError::Source(format!("failed to stat {}: {}", entry.path().display(), e))
    })?;

    let metadata = if raw_metadata.is_symlink() {
        match std::fs::metadata(entry.path()) {
            Ok(resolved) => resolved,
            Err(_) => return Ok(None),
        }
    } else {
        raw_metadata
    };

    if metadata.is_dir() {
        return Ok(None);
    }

    let identity = entry.file_name().to_string_lossy().into_owned();
    Ok(Some(ManifestEntry::new(
        identity,
        metadata.len(),
        file_timestamp(&metadata),
    )))
}

/// Creation time where the platform records it, modification time otherwise.
fn file_timestamp(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_default()
}
