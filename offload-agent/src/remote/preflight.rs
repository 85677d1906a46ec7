//! Reachability checks run once before any transfer starts.
//!
//! Each distinct endpoint and profile pair lists its buckets once. That
//! listing is the credential check, and every target's bucket must appear in
//! it. Bucket contents are never listed here.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use super::listing::{parse_bucket_listing, Lister};
use crate::config::Group;
use crate::utils::errors::{OffloadError, Result};

/// Verify every target's credentials and bucket access.
///
/// The first failing target aborts the job.
pub async fn check_reachability<L: Lister + ?Sized>(groups: &[Group], lister: &L) -> Result<()> {
    let mut visible: HashMap<(String, String), HashSet<String>> = HashMap::new();

    for group in groups {
        for target in &group.targets {
            let key = (target.endpoint.clone(), target.profile.clone());
            let buckets = match visible.entry(key) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match lister.list_buckets(target).await {
                    Ok(output) => entry.insert(parse_bucket_listing(&output)),
                    Err(e) => {
                        error!(group = %group.name, target_name = %target.name, error = %e, "Credential check failed");
                        return Err(OffloadError::Preflight(format!(
                            "profile {} is unable to list buckets at {}; check the profile's credentials, region and endpoint url",
                            target.profile, target.endpoint
                        )));
                    }
                },
            };

            if !buckets.contains(&target.bucket) {
                error!(group = %group.name, target_name = %target.name, bucket = %target.bucket, "Bucket check failed");
                return Err(OffloadError::Preflight(format!(
                    "bucket {} is not accessible with the profile {} at {}",
                    target.bucket, target.profile, target.endpoint
                )));
            }
            debug!(group = %group.name, target_name = %target.name, "Target reachable");
        }
        info!(group = %group.name, targets = group.targets.len(), "Destination group reachable");
    }
    Ok(())
}
