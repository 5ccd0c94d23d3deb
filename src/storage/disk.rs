use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

use super::backend::{
    Document, DocumentBackend, Filter, FindOptions, IndexSpec, ScoredDocument, SumAggregate, ID_FIELD,
};
use super::collection::Collection;
use super::compression::CompressionManager;

const INDEXES_FILE: &str = "indexes.json";
const DOCUMENTS_DIR: &str = "documents";

/// Backend that keeps every collection in memory and writes each change
/// through to `<base>/<collection>/documents/<_id>.json[.gz]`.
///
/// Collections are loaded lazily on first access. Reloaded documents are
/// ordered by `_id`. Mutations are applied to a staged copy of the collection
/// and only become visible once the disk write has succeeded.
pub struct DiskStorage {
    base_path: PathBuf,
    compression: CompressionManager,
    collections: Mutex<HashMap<String, Collection>>,
}

impl DiskStorage {
    pub async fn new<P: AsRef<Path>>(base_path: P) -> StorageResult<Self> {
        let base_path = base_path.as_ref().to_owned();
        fs::create_dir_all(&base_path).await?;

        Ok(Self {
            base_path,
            compression: CompressionManager::new(false),
            collections: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = CompressionManager::new(enabled);
        self
    }

    fn collection_path(&self, collection: &str) -> StorageResult<PathBuf> {
        check_component(collection)?;
        Ok(self.base_path.join(collection))
    }

    fn get_document_path(&self, collection: &str, id: &str, compressed: bool) -> StorageResult<PathBuf> {
        check_component(id)?;
        let extension = if compressed { "json.gz" } else { "json" };
        Ok(self
            .collection_path(collection)?
            .join(DOCUMENTS_DIR)
            .join(format!("{}.{}", id, extension)))
    }

    async fn load_collection(&self, collection: &str) -> StorageResult<Collection> {
        let collection_path = self.collection_path(collection)?;
        let documents_path = collection_path.join(DOCUMENTS_DIR);
        fs::create_dir_all(&documents_path).await?;

        let indexes_path = collection_path.join(INDEXES_FILE);
        let indexes: Vec<IndexSpec> = match fs::read(&indexes_path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        // A compression switch can leave both `.json` and `.json.gz` for an id.
        let mut by_id: HashMap<String, (SystemTime, Document)> = HashMap::new();
        let mut entries = fs::read_dir(&documents_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let raw = fs::read(&path).await?;
            let raw = if file_name.ends_with(".json.gz") {
                self.compression.decompress(&raw)?
            } else if file_name.ends_with(".json") {
                raw
            } else {
                continue;
            };
            let document: Document = serde_json::from_slice(&raw)?;
            let modified = entry.metadata().await?.modified()?;
            let id = document
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let newer = by_id.get(&id).map_or(true, |(seen, _)| modified > *seen);
            if newer {
                by_id.insert(id, (modified, document));
            }
        }
        let mut documents: Vec<(String, Document)> =
            by_id.into_iter().map(|(id, (_, document))| (id, document)).collect();
        documents.sort_by(|(a, _), (b, _)| a.cmp(b));
        let documents: Vec<Document> = documents.into_iter().map(|(_, document)| document).collect();

        debug!(collection, documents = documents.len(), indexes = indexes.len(), "loaded collection");
        Ok(Collection::from_parts(documents, indexes))
    }

    async fn loaded<'a>(
        &self,
        collections: &'a mut HashMap<String, Collection>,
        collection: &str,
    ) -> StorageResult<&'a mut Collection> {
        if !collections.contains_key(collection) {
            let loaded = self.load_collection(collection).await?;
            collections.insert(collection.to_string(), loaded);
        }
        collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::Query(format!("collection {} unavailable", collection)))
    }

    async fn write_document(&self, collection: &str, document: &Document) -> StorageResult<()> {
        let id = document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| StorageError::Query("stored document has no _id".to_string()))?;
        let compressed = self.compression.enabled();

        let data = self.compression.compress(&serde_json::to_vec(document)?)?;
        fs::write(self.get_document_path(collection, id, compressed)?, data).await?;

        // The new file is durable at this point; a stale copy under the other
        // compression setting loses to it on reload.
        if let Err(e) = remove_if_exists(&self.get_document_path(collection, id, !compressed)?).await {
            debug!(collection, id, error = %e, "stale document copy left in place");
        }
        Ok(())
    }

    async fn remove_document(&self, collection: &str, document: &Document) -> StorageResult<()> {
        let Some(id) = document.get(ID_FIELD).and_then(Value::as_str) else {
            return Ok(());
        };
        remove_if_exists(&self.get_document_path(collection, id, true)?).await?;
        remove_if_exists(&self.get_document_path(collection, id, false)?).await
    }

    async fn write_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> StorageResult<()> {
        let path = self.collection_path(collection)?.join(INDEXES_FILE);
        fs::write(path, serde_json::to_vec_pretty(indexes)?).await?;
        Ok(())
    }
}

/// Collection names and ids become path components.
fn check_component(component: &str) -> StorageResult<()> {
    let valid = !component.is_empty()
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(StorageError::Query(format!("invalid storage name: {:?}", component)));
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove document file");
            Err(e.into())
        }
    }
}

#[async_trait]
impl DocumentBackend for DiskStorage {
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        let mut staged = target.clone();
        staged.create_index(index)?;
        self.write_indexes(collection, staged.indexes()).await?;
        *target = staged;
        Ok(())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StorageResult<()> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        let mut staged = target.clone();
        staged.drop_index(name)?;
        self.write_indexes(collection, staged.indexes()).await?;
        *target = staged;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> StorageResult<Vec<IndexSpec>> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        Ok(target.indexes().to_vec())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<()> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        let mut staged = target.clone();
        let stored = staged.insert(document)?;
        self.write_document(collection, &stored).await?;
        *target = staged;
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        Ok(target.find_one(filter))
    }

    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StorageResult<Vec<Document>> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        Ok(target.find(filter, options))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Map<String, Value>,
    ) -> StorageResult<Option<Document>> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        let mut staged = target.clone();
        let updated = staged.find_one_and_update(filter, changes)?;
        if let Some(document) = &updated {
            self.write_document(collection, document).await?;
            *target = staged;
        }
        Ok(updated)
    }

    async fn upsert_one(&self, collection: &str, filter: &Filter, document: Document) -> StorageResult<()> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        let mut staged = target.clone();
        let stored = staged.upsert(filter, document)?;
        self.write_document(collection, &stored).await?;
        *target = staged;
        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        let mut staged = target.clone();
        let removed = staged.delete(filter, Some(1));
        for document in &removed {
            self.remove_document(collection, document).await?;
        }
        *target = staged;
        Ok(removed.len() as u64)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        let mut staged = target.clone();
        let removed = staged.delete(filter, None);
        for document in &removed {
            self.remove_document(collection, document).await?;
        }
        *target = staged;
        Ok(removed.len() as u64)
    }

    async fn text_search(
        &self,
        collection: &str,
        filter: &Filter,
        query: &str,
        limit: usize,
    ) -> StorageResult<Vec<ScoredDocument>> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        target.text_search(filter, query, limit)
    }

    async fn aggregate_sum(&self, collection: &str, filter: &Filter, field: &str) -> StorageResult<SumAggregate> {
        let mut collections = self.collections.lock().await;
        let target = self.loaded(&mut collections, collection).await?;
        Ok(target.aggregate_sum(filter, field))
    }
}
