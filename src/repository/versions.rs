use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::storage::{ensure_indexes, DocumentBackend, Filter, FindOptions, VERSION_INDEXES};
use crate::types::FileVersion;

/// Store of immutable pre-update snapshots. Optional for the repository;
/// every failure is absorbed by the caller.
#[async_trait]
pub trait VersionHistory: Send + Sync {
    async fn create_version(&self, version: &FileVersion) -> StorageResult<()>;
    async fn delete_all_versions(&self, project_name: &str, file_name: &str) -> StorageResult<u64>;
    async fn list_versions(&self, project_name: &str, file_name: &str) -> StorageResult<Vec<FileVersion>>;
    async fn get_version(&self, project_name: &str, file_name: &str, version: u32) -> StorageResult<Option<FileVersion>>;
}

/// Version history kept in a collection of the same document backend.
pub struct DocumentVersionStore {
    backend: Arc<dyn DocumentBackend>,
    collection: String,
}

impl DocumentVersionStore {
    pub async fn new(backend: Arc<dyn DocumentBackend>, collection: &str) -> Self {
        ensure_indexes(backend.as_ref(), collection, &VERSION_INDEXES).await;
        Self {
            backend,
            collection: collection.to_string(),
        }
    }

    fn file_filter(project_name: &str, file_name: &str) -> Filter {
        Filter::and(vec![
            Filter::eq("projectName", project_name),
            Filter::eq("fileName", file_name),
        ])
    }
}

#[async_trait]
impl VersionHistory for DocumentVersionStore {
    async fn create_version(&self, version: &FileVersion) -> StorageResult<()> {
        let document = serde_json::to_value(version)?;
        self.backend.insert_one(&self.collection, document).await
    }

    async fn delete_all_versions(&self, project_name: &str, file_name: &str) -> StorageResult<u64> {
        self.backend
            .delete_many(&self.collection, &Self::file_filter(project_name, file_name))
            .await
    }

    async fn list_versions(&self, project_name: &str, file_name: &str) -> StorageResult<Vec<FileVersion>> {
        let documents = self
            .backend
            .find(
                &self.collection,
                &Self::file_filter(project_name, file_name),
                &FindOptions::sorted_asc("version"),
            )
            .await?;
        documents
            .into_iter()
            .map(|document| serde_json::from_value::<FileVersion>(document).map_err(StorageError::from))
            .collect()
    }

    async fn get_version(&self, project_name: &str, file_name: &str, version: u32) -> StorageResult<Option<FileVersion>> {
        let filter = Filter::and(vec![
            Self::file_filter(project_name, file_name),
            Filter::eq("version", version),
        ]);
        match self.backend.find_one(&self.collection, &filter).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }
}
