mod files;
pub mod stats;
pub mod versions;

pub use files::{FileRepository, UPDATE_DESCRIPTION};
pub use stats::{DocumentStatsStore, ProjectStatsSink, StatsPropagator};
pub use versions::{DocumentVersionStore, VersionHistory};
