//! Manifest types shared by the source scan, the remote listings and the
//! reconciliation step.
//!
//! A manifest maps a file identity (its name) to size and timestamp. Entries
//! are kept in a `BTreeMap` so every pass over a manifest, or a delta derived
//! from it, sees the same key order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Metadata for a single file in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub identity: String,
    pub size: u64,
    /// Advisory only; never used for equality.
    pub timestamp: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn new(identity: impl Into<String>, size: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            size,
            timestamp,
        }
    }
}

/// Snapshot of identity -> entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    files: BTreeMap<String, ManifestEntry>,
}

/// Files still to copy for one group. Same shape as a manifest.
pub type Delta = Manifest;

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any entry with the same identity.
    pub fn insert(&mut self, entry: ManifestEntry) {
        self.files.insert(entry.identity.clone(), entry);
    }

    pub fn get(&self, identity: &str) -> Option<&ManifestEntry> {
        self.files.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.files.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|entry| entry.size).sum()
    }

    /// Entries in identity order
    pub fn iter(&self) -> btree_map::Values<'_, String, ManifestEntry> {
        self.files.values()
    }

    /// Identities in the same order as `iter`
    pub fn identities(&self) -> btree_map::Keys<'_, String, ManifestEntry> {
        self.files.keys()
    }

    /// Fold another snapshot into this one; later entries win.
    pub fn merge(&mut self, other: Manifest) {
        self.files.extend(other.files);
    }

    /// Object keys that more than one identity would be uploaded under,
    /// with the identities sharing each.
    pub fn key_collisions(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_key: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for identity in self.files.keys() {
            by_key
                .entry(object_key(identity))
                .or_default()
                .push(identity.clone());
        }
        by_key.retain(|_, identities| identities.len() > 1);
        by_key
    }
}

/// Object key a source identity is uploaded under: the identity with all
/// whitespace removed.
pub fn object_key(identity: &str) -> String {
    identity.chars().filter(|c| !c.is_whitespace()).collect()
}

impl FromIterator<ManifestEntry> for Manifest {
    fn from_iter<I: IntoIterator<Item = ManifestEntry>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for entry in iter {
            manifest.insert(entry);
        }
        manifest
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = btree_map::Values<'a, String, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a manifest from (identity, size) pairs with an epoch timestamp.
    pub(crate) fn manifest(entries: &[(&str, u64)]) -> Manifest {
        entries
            .iter()
            .map(|(name, size)| ManifestEntry::new(*name, *size, DateTime::<Utc>::default()))
            .collect()
    }

    #[test]
    fn test_totals() {
        let m = manifest(&[("a", 100), ("b", 200)]);
        assert_eq!(m.len(), 2);
        assert_eq!(m.total_bytes(), 300);
        assert!(!m.is_empty());
    }

    #[test]
    fn test_iteration_is_sorted_by_identity() {
        let m = manifest(&[("zeta", 1), ("alpha", 2), ("mid", 3)]);
        let names: Vec<&str> = m.identities().map(String::as_str).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_insert_replaces_same_identity() {
        let mut m = manifest(&[("a", 100)]);
        m.insert(ManifestEntry::new("a", 150, Utc::now()));
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("a").unwrap().size, 150);
    }

    #[test]
    fn test_object_key_strips_whitespace() {
        assert_eq!(object_key("my data\tfile 01.bin"), "mydatafile01.bin");
        assert_eq!(object_key("plain.bin"), "plain.bin");
    }

    #[test]
    fn test_merge() {
        let mut m = manifest(&[("a", 1), ("b", 2)]);
        m.merge(manifest(&[("b", 20), ("c", 3)]));
        assert_eq!(m.len(), 3);
        assert_eq!(m.get("b").unwrap().size, 20);
    }

    #[test]
    fn test_key_collisions() {
        let m = manifest(&[("a b", 1), ("ab", 2), ("c d", 3), ("e", 4)]);
        let collisions = m.key_collisions();

        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions["ab"], vec!["a b".to_string(), "ab".to_string()]);
        assert!(manifest(&[("c d", 3), ("e", 4)]).key_collisions().is_empty());
    }
}
