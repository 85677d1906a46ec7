//! Offload Agent Library
//!
//! Reconciles a local directory against groups of S3-compatible targets,
//! splits the missing files across each group's targets and drives one bulk
//! copy worker per target while reporting progress.

pub mod artifacts;
pub mod config;
pub mod executor;
pub mod fs;
pub mod manifest;
pub mod remote;
pub mod shutdown;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::JobConfig;
pub use executor::{JobOutcome, Orchestrator};
pub use utils::errors::OffloadError;
pub type Result<T> = std::result::Result<T, OffloadError>;
