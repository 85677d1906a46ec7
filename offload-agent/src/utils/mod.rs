//! Utility modules for the offload agent.

pub mod errors;
pub mod logger;

pub use errors::{OffloadError, Result};
