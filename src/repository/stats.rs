use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::StorageResult;
use crate::storage::{ensure_indexes, DocumentBackend, Filter, STATS_INDEXES};
use crate::types::{timestamp_now, ProjectStats};

/// Receiver of per-project file counts and sizes.
#[async_trait]
pub trait ProjectStatsSink: Send + Sync {
    async fn update_stats(&self, project_name: &str, file_count: u64, total_size: u64) -> StorageResult<()>;
}

/// Keeps one stats document per project in a backend collection.
pub struct DocumentStatsStore {
    backend: Arc<dyn DocumentBackend>,
    collection: String,
}

impl DocumentStatsStore {
    pub async fn new(backend: Arc<dyn DocumentBackend>, collection: &str) -> Self {
        ensure_indexes(backend.as_ref(), collection, &STATS_INDEXES).await;
        Self {
            backend,
            collection: collection.to_string(),
        }
    }

    pub async fn get(&self, project_name: &str) -> StorageResult<Option<ProjectStats>> {
        match self
            .backend
            .find_one(&self.collection, &Filter::eq("projectName", project_name))
            .await?
        {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProjectStatsSink for DocumentStatsStore {
    async fn update_stats(&self, project_name: &str, file_count: u64, total_size: u64) -> StorageResult<()> {
        let document = json!({
            "projectName": project_name,
            "fileCount": file_count,
            "totalSize": total_size,
            "updatedAt": timestamp_now().timestamp_millis(),
        });
        self.backend
            .upsert_one(&self.collection, &Filter::eq("projectName", project_name), document)
            .await
    }
}

/// Recomputes project aggregates and forwards them to the sink after each
/// mutation, absorbing every failure.
pub struct StatsPropagator {
    backend: Arc<dyn DocumentBackend>,
    collection: String,
    sink: Option<Arc<dyn ProjectStatsSink>>,
}

impl StatsPropagator {
    pub fn new(backend: Arc<dyn DocumentBackend>, collection: &str) -> Self {
        Self {
            backend,
            collection: collection.to_string(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProjectStatsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub async fn aggregate(&self, project_name: &str) -> StorageResult<ProjectStats> {
        let totals = self
            .backend
            .aggregate_sum(&self.collection, &Filter::eq("projectName", project_name), "size")
            .await?;
        Ok(ProjectStats {
            file_count: totals.count,
            total_size: totals.sum,
        })
    }

    pub async fn propagate(&self, project_name: &str) {
        let Some(sink) = &self.sink else {
            return;
        };

        let stats = match self.aggregate(project_name).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(project = project_name, error = %e, "failed to aggregate project stats");
                return;
            }
        };

        match sink.update_stats(project_name, stats.file_count, stats.total_size).await {
            Ok(()) => debug!(
                project = project_name,
                file_count = stats.file_count,
                total_size = stats.total_size,
                "project stats updated"
            ),
            Err(e) => warn!(project = project_name, error = %e, "failed to update project stats"),
        }
    }
}
