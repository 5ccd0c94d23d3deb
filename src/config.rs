use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::checksum::ChecksumAlgorithm;
use crate::error::StorageResult;

const APP_DIR: &str = "project_vault";
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Runtime settings, resolved once and handed to the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory of the on-disk backend.
    pub data_dir: PathBuf,
    /// Gzip document files written by the on-disk backend.
    pub compression: bool,
    pub checksum: ChecksumAlgorithm,
    /// Maximum number of text search results.
    pub search_limit: usize,
    pub files_collection: String,
    pub versions_collection: String,
    pub stats_collection: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            compression: false,
            checksum: ChecksumAlgorithm::default(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            files_collection: "files".into(),
            versions_collection: "file_versions".into(),
            stats_collection: "project_stats".into(),
        }
    }
}

impl VaultConfig {
    /// Read settings from a JSON file; missing keys take their defaults.
    pub async fn load(path: &Path) -> StorageResult<Self> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(APP_DIR))
}
