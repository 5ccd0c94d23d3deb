use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{timestamp_now, File, FileMetadata};

/// Immutable copy of a file as it was before an update was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    pub id: Uuid,
    pub project_name: String,
    pub file_name: String,
    pub version: u32,
    pub content: String,
    pub size: u64,
    pub checksum: String,
    pub metadata: FileMetadata,
    pub change_description: String,
    pub is_auto_save: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl FileVersion {
    pub fn snapshot(file: &File, change_description: &str, is_auto_save: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_name: file.project_name.clone(),
            file_name: file.name.clone(),
            version: file.metadata.version,
            content: file.content.clone(),
            size: file.size,
            checksum: file.checksum.clone(),
            metadata: file.metadata.clone(),
            change_description: change_description.to_string(),
            is_auto_save,
            created_at: timestamp_now(),
        }
    }
}
