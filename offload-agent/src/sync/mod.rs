//! Reconciliation between the source and destination manifests.

pub mod delta;

pub use delta::{diff, DeltaSummary};
