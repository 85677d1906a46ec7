//! Delta computation logic.
//!
//! A file needs copying when the destination lacks it or holds it with a
//! different size. Timestamps are advisory and never compared.

use std::collections::BTreeMap;

use crate::manifest::{object_key, Delta, Manifest, ManifestEntry};

/// Compute the copy delta between a source and a destination snapshot.
///
/// Pure and deterministic: calling it again with the same inputs yields the
/// same delta, which is what makes re-polling and re-running a job safe.
///
/// A destination entry is matched under the source identity or under the
/// object key the identity is uploaded as, so names containing whitespace
/// reconcile once copied. The key is only consulted when no other source
/// identity maps to it.
///
/// # Example
/// ```
/// use offload_agent::manifest::{Manifest, ManifestEntry};
/// use offload_agent::sync::delta::diff;
///
/// let now = chrono::Utc::now();
/// let source: Manifest = vec![
///     ManifestEntry::new("a", 100, now),
///     ManifestEntry::new("b", 200, now),
/// ].into_iter().collect();
/// let destination: Manifest = vec![ManifestEntry::new("a", 100, now)].into_iter().collect();
///
/// let delta = diff(&source, &destination);
/// assert_eq!(delta.len(), 1);
/// assert!(delta.contains("b"));
/// ```
pub fn diff(source: &Manifest, destination: &Manifest) -> Delta {
    let shared_keys = source.key_collisions();
    source
        .iter()
        .filter(|entry| !is_copied(entry, destination, &shared_keys))
        .cloned()
        .collect()
}

fn is_copied(
    entry: &ManifestEntry,
    destination: &Manifest,
    shared_keys: &BTreeMap<String, Vec<String>>,
) -> bool {
    let same_size = |found: &ManifestEntry| found.size == entry.size;

    if destination.get(&entry.identity).is_some_and(same_size) {
        return true;
    }
    let key = object_key(&entry.identity);
    key != entry.identity
        && !shared_keys.contains_key(&key)
        && destination.get(&key).is_some_and(same_size)
}

/// Counts describing a delta relative to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaSummary {
    pub pending_files: usize,
    pub pending_bytes: u64,
    pub completed_files: usize,
}

impl DeltaSummary {
    pub fn new(source: &Manifest, delta: &Delta) -> Self {
        Self {
            pending_files: delta.len(),
            pending_bytes: delta.total_bytes(),
            completed_files: source.len().saturating_sub(delta.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::manifest;
    use chrono::{Duration, Utc};

    #[test]
    fn test_missing_file_is_pending() {
        let source = manifest(&[("a", 100), ("b", 200)]);
        let destination = manifest(&[("a", 100)]);

        let delta = diff(&source, &destination);
        assert_eq!(delta, manifest(&[("b", 200)]));
    }

    #[test]
    fn test_size_mismatch_is_pending() {
        let source = manifest(&[("a", 100)]);
        let destination = manifest(&[("a", 99)]);

        let delta = diff(&source, &destination);
        assert!(delta.contains("a"));
    }

    #[test]
    fn test_timestamp_is_ignored() {
        let source = manifest(&[("a", 100)]);
        let mut destination = Manifest::new();
        destination.insert(ManifestEntry::new("a", 100, Utc::now() + Duration::days(365)));

        assert!(diff(&source, &destination).is_empty());
    }

    #[test]
    fn test_empty_source_yields_empty_delta() {
        let destination = manifest(&[("a", 100), ("z", 1)]);
        assert!(diff(&Manifest::new(), &destination).is_empty());
    }

    #[test]
    fn test_extra_destination_files_are_ignored() {
        let source = manifest(&[("a", 100)]);
        let destination = manifest(&[("a", 100), ("stale", 5)]);
        assert!(diff(&source, &destination).is_empty());
    }

    #[test]
    fn test_diff_is_idempotent() {
        let source = manifest(&[("a", 1), ("b", 2), ("c", 3)]);
        let destination = manifest(&[("b", 2), ("c", 30)]);

        assert_eq!(diff(&source, &destination), diff(&source, &destination));
    }

    #[test]
    fn test_as_if_copied_destination_is_complete() {
        let source = manifest(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
        let mut destination = manifest(&[("a", 1), ("c", 7)]);

        let delta = diff(&source, &destination);
        for entry in &delta {
            destination.insert(entry.clone());
        }

        assert!(diff(&source, &destination).is_empty());
    }

    #[test]
    fn test_whitespace_names_match_uploaded_key() {
        let source = manifest(&[("my file.bin", 10)]);
        let destination = manifest(&[("myfile.bin", 10)]);
        assert!(diff(&source, &destination).is_empty());

        let resized = manifest(&[("myfile.bin", 11)]);
        assert_eq!(diff(&source, &resized).len(), 1);
    }

    #[test]
    fn test_key_shared_by_two_sources_needs_exact_match() {
        let source = manifest(&[("a b", 10), ("ab", 10)]);
        let destination = manifest(&[("ab", 10)]);

        let delta = diff(&source, &destination);
        assert_eq!(delta.len(), 1);
        assert!(delta.contains("a b"));
        assert!(!delta.contains("ab"));
    }

    #[test]
    fn test_delta_summary() {
        let source = manifest(&[("a", 100), ("b", 200), ("c", 300)]);
        let delta = diff(&source, &manifest(&[("a", 100)]));

        let summary = DeltaSummary::new(&source, &delta);
        assert_eq!(summary.pending_files, 2);
        assert_eq!(summary.pending_bytes, 500);
        assert_eq!(summary.completed_files, 1);
    }
}
