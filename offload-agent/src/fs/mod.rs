//! Local file system access.

pub mod walker;

pub use walker::collect_source;
