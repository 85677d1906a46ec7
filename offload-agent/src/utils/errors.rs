//! Custom error types for the offload agent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OffloadError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Preflight check failed: {0}")]
    Preflight(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source directory error: {0}")]
    Source(String),

    #[error("Listing error: {0}")]
    Listing(String),

    #[error("Failed to launch worker for target {target}: {reason}")]
    Launch { target: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, OffloadError>;
