use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checksum::{checksum_with, ChecksumAlgorithm};
use crate::config::VaultConfig;
use crate::error::{RepositoryError, Result, ValidationError, Violation};
use crate::metadata::enrich;
use crate::storage::{ensure_indexes, DiskStorage, DocumentBackend, Filter, FindOptions, ProvisionReport, FILE_INDEXES};
use crate::types::{timestamp_now, File, FileVersion, ProjectStats};
use crate::validation::{file_from_document, file_to_document};

use super::stats::{DocumentStatsStore, ProjectStatsSink, StatsPropagator};
use super::versions::{DocumentVersionStore, VersionHistory};

pub const UPDATE_DESCRIPTION: &str = "updated";

/// Versioned, checksummed text files scoped to projects, stored in a
/// document backend.
///
/// Every mutation runs snapshot (updates only), field recomputation,
/// persistence and stats propagation strictly in that order. Version history
/// and stats are side channels: their failures are logged, never returned.
pub struct FileRepository {
    backend: Arc<dyn DocumentBackend>,
    collection: String,
    checksum_algorithm: ChecksumAlgorithm,
    search_limit: usize,
    versions: Option<Arc<dyn VersionHistory>>,
    stats: StatsPropagator,
    provision_report: ProvisionReport,
}

impl FileRepository {
    /// Build a repository with default settings and provision its indexes.
    pub async fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self::with_config(backend, &VaultConfig::default()).await
    }

    pub async fn with_config(backend: Arc<dyn DocumentBackend>, config: &VaultConfig) -> Self {
        let provision_report = ensure_indexes(backend.as_ref(), &config.files_collection, &FILE_INDEXES).await;
        if !provision_report.is_complete() {
            warn!(failed = ?provision_report.failed, "file indexes incomplete; queries may degrade");
        }

        Self {
            stats: StatsPropagator::new(backend.clone(), &config.files_collection),
            backend,
            collection: config.files_collection.clone(),
            checksum_algorithm: config.checksum,
            search_limit: config.search_limit,
            versions: None,
            provision_report,
        }
    }

    /// Open the on-disk backend under `config.data_dir` with version history
    /// and project stats stored next to the files.
    pub async fn open(config: &VaultConfig) -> Result<Self> {
        let storage = DiskStorage::new(&config.data_dir).await?.with_compression(config.compression);
        let backend: Arc<dyn DocumentBackend> = Arc::new(storage);

        let versions = DocumentVersionStore::new(backend.clone(), &config.versions_collection).await;
        let stats = DocumentStatsStore::new(backend.clone(), &config.stats_collection).await;

        info!(data_dir = %config.data_dir.display(), "opened file repository");
        Ok(Self::with_config(backend, config)
            .await
            .with_version_history(Arc::new(versions))
            .with_stats_sink(Arc::new(stats)))
    }

    pub fn with_version_history(mut self, versions: Arc<dyn VersionHistory>) -> Self {
        self.versions = Some(versions);
        self
    }

    pub fn with_stats_sink(mut self, sink: Arc<dyn ProjectStatsSink>) -> Self {
        self.stats = self.stats.with_sink(sink);
        self
    }

    pub fn provision_report(&self) -> &ProvisionReport {
        &self.provision_report
    }

    fn natural_key(project_name: &str, file_name: &str) -> Filter {
        Filter::and(vec![
            Filter::eq("projectName", project_name),
            Filter::eq("name", file_name),
        ])
    }

    fn project_filter(project_name: &str) -> Filter {
        Filter::eq("projectName", project_name)
    }

    fn to_files(documents: Vec<Value>) -> Result<Vec<File>> {
        documents
            .into_iter()
            .map(|document| file_from_document(document).map_err(RepositoryError::from))
            .collect()
    }

    pub async fn create_file(&self, project_name: &str, file_name: &str, content: &str) -> Result<File> {
        let now = timestamp_now();
        let file = File {
            id: Uuid::new_v4(),
            name: file_name.to_string(),
            project_name: project_name.to_string(),
            content: content.to_string(),
            size: content.len() as u64,
            checksum: checksum_with(self.checksum_algorithm, content),
            created_at: now,
            updated_at: now,
            metadata: enrich(content, file_name, None),
        };

        let document = file_to_document(&file)?;
        self.backend.insert_one(&self.collection, document).await?;
        info!(project = project_name, file = file_name, size = file.size, "created file");

        self.stats.propagate(project_name).await;
        Ok(file)
    }

    /// Replace a file's content. `None` when no file has this natural key.
    pub async fn update_file(&self, project_name: &str, file_name: &str, content: &str) -> Result<Option<File>> {
        self.apply_update(project_name, file_name, content, UPDATE_DESCRIPTION).await
    }

    async fn apply_update(
        &self,
        project_name: &str,
        file_name: &str,
        content: &str,
        change_description: &str,
    ) -> Result<Option<File>> {
        let Some(current) = self.load_file(project_name, file_name).await? else {
            debug!(project = project_name, file = file_name, "update skipped: file not found");
            return Ok(None);
        };

        let Some(next_version) = current.metadata.version.checked_add(1) else {
            return Err(ValidationError {
                violations: vec![Violation::new("metadata.version", "version counter exhausted")],
            }
            .into());
        };

        self.snapshot(&current, change_description).await;

        let mut metadata = enrich(content, file_name, Some(next_version));
        metadata.tags = current.metadata.tags.clone();
        let candidate = File {
            content: content.to_string(),
            size: content.len() as u64,
            checksum: checksum_with(self.checksum_algorithm, content),
            updated_at: timestamp_now().max(current.created_at),
            metadata,
            ..current
        };

        let document = file_to_document(&candidate)?;
        let changes = pick_fields(&document, &["content", "size", "checksum", "metadata", "updatedAt"]);
        let updated = self
            .backend
            .find_one_and_update(&self.collection, &Self::natural_key(project_name, file_name), changes)
            .await?;

        let Some(updated) = updated else {
            debug!(project = project_name, file = file_name, "file removed before update was applied");
            return Ok(None);
        };
        let updated = file_from_document(updated)?;
        info!(
            project = project_name,
            file = file_name,
            version = updated.metadata.version,
            "updated file"
        );

        self.stats.propagate(project_name).await;
        Ok(Some(updated))
    }

    async fn snapshot(&self, current: &File, change_description: &str) {
        let Some(versions) = &self.versions else {
            return;
        };
        let snapshot = FileVersion::snapshot(current, change_description, false);
        if let Err(e) = versions.create_version(&snapshot).await {
            warn!(
                project = %current.project_name,
                file = %current.name,
                version = current.metadata.version,
                error = %e,
                "failed to snapshot file version"
            );
        }
    }

    /// Remove a file and its history. `false` when nothing matched.
    pub async fn delete_file(&self, project_name: &str, file_name: &str) -> Result<bool> {
        let removed = self
            .backend
            .delete_one(&self.collection, &Self::natural_key(project_name, file_name))
            .await?;
        if removed == 0 {
            debug!(project = project_name, file = file_name, "delete skipped: file not found");
            return Ok(false);
        }

        if let Some(versions) = &self.versions {
            match versions.delete_all_versions(project_name, file_name).await {
                Ok(count) => debug!(project = project_name, file = file_name, count, "purged file versions"),
                Err(e) => warn!(project = project_name, file = file_name, error = %e, "failed to purge file versions"),
            }
        }
        info!(project = project_name, file = file_name, "deleted file");

        self.stats.propagate(project_name).await;
        Ok(true)
    }

    /// Replace the user-assigned tags. Does not bump the version.
    pub async fn set_tags(&self, project_name: &str, file_name: &str, tags: &[String]) -> Result<Option<File>> {
        let Some(current) = self.load_file(project_name, file_name).await? else {
            return Ok(None);
        };

        let mut normalized: Vec<String> = Vec::new();
        for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !normalized.iter().any(|existing| existing == tag) {
                normalized.push(tag.to_string());
            }
        }

        let mut candidate = current;
        candidate.metadata.tags = normalized;
        candidate.updated_at = timestamp_now().max(candidate.created_at);

        let document = file_to_document(&candidate)?;
        let changes = pick_fields(&document, &["metadata", "updatedAt"]);
        let Some(updated) = self
            .backend
            .find_one_and_update(&self.collection, &Self::natural_key(project_name, file_name), changes)
            .await?
        else {
            return Ok(None);
        };

        debug!(project = project_name, file = file_name, "tags updated");
        self.stats.propagate(project_name).await;
        Ok(Some(file_from_document(updated)?))
    }

    /// Files of a project, most recently updated first.
    pub async fn list_files(&self, project_name: &str) -> Result<Vec<File>> {
        let documents = self
            .backend
            .find(&self.collection, &Self::project_filter(project_name), &FindOptions::sorted_desc("updatedAt"))
            .await?;
        Self::to_files(documents)
    }

    pub async fn load_file(&self, project_name: &str, file_name: &str) -> Result<Option<File>> {
        match self
            .backend
            .find_one(&self.collection, &Self::natural_key(project_name, file_name))
            .await?
        {
            Some(document) => Ok(Some(file_from_document(document)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, project_name: &str, file_name: &str) -> Result<bool> {
        Ok(self
            .backend
            .find_one(&self.collection, &Self::natural_key(project_name, file_name))
            .await?
            .is_some())
    }

    /// Full-text search ranked by relevance, capped at the configured limit.
    pub async fn search_files(&self, project_name: &str, query: &str) -> Result<Vec<File>> {
        let scored = self
            .backend
            .text_search(&self.collection, &Self::project_filter(project_name), query, self.search_limit)
            .await?;
        Self::to_files(scored.into_iter().map(|s| s.document).collect())
    }

    /// Files carrying any of `tags`, most recently updated first.
    pub async fn find_by_tags(&self, project_name: &str, tags: &[String]) -> Result<Vec<File>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::and(vec![
            Self::project_filter(project_name),
            Filter::any_of("metadata.tags", tags.iter().map(|t| Value::String(t.clone())).collect()),
        ]);
        let documents = self
            .backend
            .find(&self.collection, &filter, &FindOptions::sorted_desc("updatedAt"))
            .await?;
        Self::to_files(documents)
    }

    pub async fn project_stats(&self, project_name: &str) -> Result<ProjectStats> {
        Ok(self.stats.aggregate(project_name).await?)
    }

    /// Snapshots of a file in ascending version order. Empty without history.
    pub async fn list_versions(&self, project_name: &str, file_name: &str) -> Result<Vec<FileVersion>> {
        match &self.versions {
            Some(versions) => Ok(versions.list_versions(project_name, file_name).await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_version(&self, project_name: &str, file_name: &str, version: u32) -> Result<Option<FileVersion>> {
        match &self.versions {
            Some(versions) => Ok(versions.get_version(project_name, file_name, version).await?),
            None => Ok(None),
        }
    }

    /// Write a snapshot's content back as a new version.
    pub async fn restore_version(&self, project_name: &str, file_name: &str, version: u32) -> Result<Option<File>> {
        let Some(snapshot) = self.get_version(project_name, file_name, version).await? else {
            debug!(project = project_name, file = file_name, version, "restore skipped: version not found");
            return Ok(None);
        };
        let description = format!("restored from version {}", version);
        self.apply_update(project_name, file_name, &snapshot.content, &description).await
    }
}

fn pick_fields(document: &Value, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|field| document.get(*field).map(|value| (field.to_string(), value.clone())))
        .collect()
}

impl std::fmt::Debug for FileRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRepository")
            .field("collection", &self.collection)
            .field("checksum_algorithm", &self.checksum_algorithm)
            .field("search_limit", &self.search_limit)
            .field("versions", &self.versions.is_some())
            .finish()
    }
}
