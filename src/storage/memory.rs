use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::StorageResult;

use super::backend::{Document, DocumentBackend, Filter, FindOptions, IndexSpec, ScoredDocument, SumAggregate};
use super::collection::Collection;

/// Process-local backend. Nothing survives the process.
#[derive(Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        let mut collections = self.collections.lock().await;
        collections.entry(collection.to_string()).or_default().create_index(index)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StorageResult<()> {
        let mut collections = self.collections.lock().await;
        collections.entry(collection.to_string()).or_default().drop_index(name)
    }

    async fn list_indexes(&self, collection: &str) -> StorageResult<Vec<IndexSpec>> {
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).map(|c| c.indexes().to_vec()).unwrap_or_default())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<()> {
        let mut collections = self.collections.lock().await;
        collections.entry(collection.to_string()).or_default().insert(document)?;
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).and_then(|c| c.find_one(filter)))
    }

    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StorageResult<Vec<Document>> {
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).map(|c| c.find(filter, options)).unwrap_or_default())
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Map<String, Value>,
    ) -> StorageResult<Option<Document>> {
        let mut collections = self.collections.lock().await;
        match collections.get_mut(collection) {
            Some(c) => c.find_one_and_update(filter, changes),
            None => Ok(None),
        }
    }

    async fn upsert_one(&self, collection: &str, filter: &Filter, document: Document) -> StorageResult<()> {
        let mut collections = self.collections.lock().await;
        collections.entry(collection.to_string()).or_default().upsert(filter, document)?;
        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let mut collections = self.collections.lock().await;
        Ok(collections
            .get_mut(collection)
            .map_or(0, |c| c.delete(filter, Some(1)).len() as u64))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let mut collections = self.collections.lock().await;
        Ok(collections
            .get_mut(collection)
            .map_or(0, |c| c.delete(filter, None).len() as u64))
    }

    async fn text_search(
        &self,
        collection: &str,
        filter: &Filter,
        query: &str,
        limit: usize,
    ) -> StorageResult<Vec<ScoredDocument>> {
        let mut collections = self.collections.lock().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .text_search(filter, query, limit)
    }

    async fn aggregate_sum(&self, collection: &str, filter: &Filter, field: &str) -> StorageResult<SumAggregate> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|c| c.aggregate_sum(filter, field))
            .unwrap_or_default())
    }
}
