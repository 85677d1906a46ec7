//! Progress reporting and worker result parsing.

pub mod progress;
pub mod stats;

pub use progress::{report_cycle, GroupProgress, JobReport};
pub use stats::{parse_results, TransferCounters};
