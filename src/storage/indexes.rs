use lazy_static::lazy_static;
use tracing::{debug, info, warn};

use crate::error::StorageError;

use super::backend::{DocumentBackend, IndexSpec};

pub const NATURAL_KEY_INDEX: &str = "projectName_1_name_1";
pub const TEXT_INDEX: &str = "file_text_search";

lazy_static! {
    /// Indexes the files collection needs before serving mutations.
    pub static ref FILE_INDEXES: Vec<IndexSpec> = vec![
        IndexSpec::new(NATURAL_KEY_INDEX).asc("projectName").asc("name").unique(),
        IndexSpec::new("projectName_1_updatedAt_-1").asc("projectName").desc("updatedAt"),
        IndexSpec::new("checksum_1").asc("checksum"),
        IndexSpec::new("metadata.mimeType_1").asc("metadata.mimeType"),
        IndexSpec::new("size_1").asc("size"),
        IndexSpec::new("metadata.tags_1").asc("metadata.tags"),
        IndexSpec::new(TEXT_INDEX)
            .text("name", 10)
            .text("metadata.keywords", 8)
            .text("metadata.tags", 5)
            .text("content", 1),
    ];

    pub static ref VERSION_INDEXES: Vec<IndexSpec> = vec![
        IndexSpec::new("projectName_1_fileName_1_version_1")
            .asc("projectName")
            .asc("fileName")
            .asc("version")
            .unique(),
    ];

    pub static ref STATS_INDEXES: Vec<IndexSpec> = vec![
        IndexSpec::new("projectName_1").asc("projectName").unique(),
    ];
}

/// Outcome of one provisioning pass, by index name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub ensured: Vec<String>,
    pub recreated: Vec<String>,
    pub failed: Vec<String>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Best-effort creation of `specs` on `collection`.
///
/// A definition conflict is repaired by dropping and recreating the index.
/// Every other failure is logged and recorded in the report; nothing here
/// returns an error.
pub async fn ensure_indexes(backend: &dyn DocumentBackend, collection: &str, specs: &[IndexSpec]) -> ProvisionReport {
    let mut report = ProvisionReport::default();

    for spec in specs {
        match backend.create_index(collection, spec).await {
            Ok(()) => {
                debug!(collection, index = %spec.name, "index ensured");
                report.ensured.push(spec.name.clone());
            }
            Err(StorageError::IndexConflict { .. }) => match recreate_index(backend, collection, spec).await {
                Ok(()) => {
                    info!(collection, index = %spec.name, "recreated index with conflicting definition");
                    report.recreated.push(spec.name.clone());
                }
                Err(e) => {
                    warn!(collection, index = %spec.name, error = %e, "failed to recreate conflicting index");
                    report.failed.push(spec.name.clone());
                }
            },
            Err(e) => {
                warn!(collection, index = %spec.name, error = %e, "failed to create index");
                report.failed.push(spec.name.clone());
            }
        }
    }

    report
}

async fn recreate_index(backend: &dyn DocumentBackend, collection: &str, spec: &IndexSpec) -> Result<(), StorageError> {
    backend.drop_index(collection, &spec.name).await?;
    backend.create_index(collection, spec).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[tokio::test]
    async fn provisioning_is_idempotent() {
        let backend = MemoryBackend::new();

        let first = ensure_indexes(&backend, "files", &FILE_INDEXES).await;
        assert_eq!(first.ensured.len(), FILE_INDEXES.len());
        assert!(first.is_complete());

        let second = ensure_indexes(&backend, "files", &FILE_INDEXES).await;
        assert_eq!(second, first);
        assert_eq!(backend.list_indexes("files").await.unwrap().len(), FILE_INDEXES.len());
    }

    #[tokio::test]
    async fn conflicting_definition_is_dropped_and_recreated() {
        let backend = MemoryBackend::new();
        let stale = IndexSpec::new(NATURAL_KEY_INDEX).asc("name");
        backend.create_index("files", &stale).await.unwrap();

        let report = ensure_indexes(&backend, "files", &FILE_INDEXES).await;
        assert_eq!(report.recreated, vec![NATURAL_KEY_INDEX.to_string()]);
        assert!(report.is_complete());

        let indexes = backend.list_indexes("files").await.unwrap();
        let natural = indexes.iter().find(|i| i.name == NATURAL_KEY_INDEX).unwrap();
        assert!(natural.unique);
    }

    #[tokio::test]
    async fn failed_repairs_are_recorded_not_raised() {
        let backend = MemoryBackend::new();
        let other_text = IndexSpec::new("legacy_text").text("content", 1);
        backend.create_index("files", &other_text).await.unwrap();

        let report = ensure_indexes(&backend, "files", &FILE_INDEXES).await;
        assert_eq!(report.failed, vec![TEXT_INDEX.to_string()]);
        assert_eq!(report.ensured.len(), FILE_INDEXES.len() - 1);
    }

    #[test]
    fn text_index_weights_favour_names_over_content() {
        let text = FILE_INDEXES.iter().find(|i| i.name == TEXT_INDEX).unwrap();
        assert_eq!(text.weights["name"], 10);
        assert_eq!(text.weights["metadata.keywords"], 8);
        assert_eq!(text.weights["metadata.tags"], 5);
        assert_eq!(text.weights["content"], 1);
    }
}
