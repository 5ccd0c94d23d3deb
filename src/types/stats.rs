use serde::{Deserialize, Serialize};

/// Aggregate over every file stored for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub file_count: u64,
    pub total_size: u64,
}
