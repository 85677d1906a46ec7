//! Static validation of a job configuration.
//!
//! Runs once at startup; nothing here is re-checked while the job runs.

use std::collections::HashSet;

use super::{GroupMode, JobConfig};
use crate::utils::errors::{OffloadError, Result};

/// Validate the configuration.
pub fn validate(config: &JobConfig) -> Result<()> {
    if config.source.as_os_str().is_empty() {
        return Err(OffloadError::Validation("source is required".into()));
    }
    if config.num_workers == 0 {
        return Err(OffloadError::Validation(
            "num_workers must be at least 1".into(),
        ));
    }
    if config.reporting_frequency == 0 {
        return Err(OffloadError::Validation(
            "reporting_frequency must be at least 1 second".into(),
        ));
    }
    if config.destinations.is_empty() {
        return Err(OffloadError::Validation(
            "at least one destination group is required".into(),
        ));
    }

    // Target names key the per-target artifact files, so they must be file
    // name safe and unique across the whole job
    let mut job_names: HashSet<&str> = HashSet::new();
    for (group, group_config) in &config.destinations {
        if group_config.targets.is_empty() {
            return Err(OffloadError::Validation(format!(
                "group {} has no targets",
                group
            )));
        }

        let mut names = HashSet::new();
        for target in &group_config.targets {
            if target.name.is_empty()
                || target.bucket.is_empty()
                || target.endpoint.is_empty()
                || target.profile.is_empty()
            {
                return Err(OffloadError::Validation(format!(
                    "group {} has a target with an empty name, bucket, endpoint or profile",
                    group
                )));
            }
            if !is_file_name_safe(&target.name) {
                return Err(OffloadError::Validation(format!(
                    "group {} has a target name {:?} that cannot be used in a file name",
                    group, target.name
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(OffloadError::Validation(format!(
                    "group {} has a duplicate target name {}",
                    group, target.name
                )));
            }
            if !job_names.insert(target.name.as_str()) {
                return Err(OffloadError::Validation(format!(
                    "target name {} in group {} is already used by another group",
                    target.name, group
                )));
            }
        }

        if group_config.mode == GroupMode::SharedBucket {
            let buckets: HashSet<&str> = group_config
                .targets
                .iter()
                .map(|t| t.bucket.as_str())
                .collect();
            if buckets.len() != 1 {
                return Err(OffloadError::Validation(format!(
                    "group {} is shared-bucket but its targets use {} different buckets",
                    group,
                    buckets.len()
                )));
            }
        }
    }

    Ok(())
}

fn is_file_name_safe(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::target;
    use crate::config::GroupConfig;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn valid_config() -> JobConfig {
        let mut destinations = BTreeMap::new();
        destinations.insert(
            "cluster".to_string(),
            GroupConfig {
                mode: GroupMode::SharedBucket,
                targets: vec![target("sbe1", "shared"), target("sbe2", "shared")],
            },
        );
        destinations.insert(
            "dataimport".to_string(),
            GroupConfig {
                mode: GroupMode::Independent,
                targets: vec![target("sbe3", "one"), target("sbe4", "two")],
            },
        );

        JobConfig {
            source: PathBuf::from("/data"),
            log_level: "info".to_string(),
            num_workers: 16,
            reporting_frequency: 60,
            tool: "s5cmd".to_string(),
            log_dir: PathBuf::from("logs"),
            destinations,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_duplicate_target_name() {
        let mut config = valid_config();
        let group = config.destinations.get_mut("dataimport").unwrap();
        group.targets[1].name = "sbe3".to_string();

        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate target name sbe3"));
    }

    #[test]
    fn test_same_name_in_different_groups_is_rejected() {
        let mut config = valid_config();
        let group = config.destinations.get_mut("dataimport").unwrap();
        group.targets[0].name = "sbe1".to_string();

        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("already used by another group"));
    }

    #[test]
    fn test_target_name_with_path_separator() {
        for name in ["rack/sbe3", "rack\\sbe3", "..", "."] {
            let mut config = valid_config();
            let group = config.destinations.get_mut("dataimport").unwrap();
            group.targets[0].name = name.to_string();

            let err = validate(&config).unwrap_err();
            assert!(
                err.to_string().contains("cannot be used in a file name"),
                "{} accepted",
                name
            );
        }
    }

    #[test]
    fn test_shared_bucket_mismatch() {
        let mut config = valid_config();
        let group = config.destinations.get_mut("cluster").unwrap();
        group.targets[1].bucket = "other".to_string();

        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_independent_groups_may_mix_buckets() {
        let config = valid_config();
        let group = &config.destinations["dataimport"];
        assert_ne!(group.targets[0].bucket, group.targets[1].bucket);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_workers() {
        let mut config = valid_config();
        config.num_workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_reporting_frequency() {
        let mut config = valid_config();
        config.reporting_frequency = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_group_without_targets() {
        let mut config = valid_config();
        config.destinations.get_mut("cluster").unwrap().targets.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_no_groups() {
        let mut config = valid_config();
        config.destinations.clear();
        assert!(validate(&config).is_err());
    }
}
