//! Remote storage collaborators: object listings and startup reachability.

pub mod listing;
pub mod preflight;

pub use listing::{collect_destination, CopyToolLister, Lister};
pub use preflight::check_reachability;
