#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use project_vault::storage::{DiskStorage, DocumentBackend, Filter, FindOptions, IndexSpec};
    use project_vault::*;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    /// Helper to initialize DiskStorage with a temporary directory
    async fn create_test_storage() -> (DiskStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = DiskStorage::new(temp_dir.path()).await.expect("can't create disk storage");
        (storage, temp_dir)
    }

    fn test_config(temp_dir: &TempDir) -> VaultConfig {
        VaultConfig::default().with_data_dir(temp_dir.path())
    }

    /// Test storing and retrieving a document
    #[tokio::test]
    async fn test_store_and_retrieve_document() {
        let (storage, temp_dir) = create_test_storage().await;

        storage
            .insert_one("files", json!({ "_id": "doc-1", "name": "test.txt", "size": 13 }))
            .await
            .expect("Failed to store document");

        let retrieved = storage
            .find_one("files", &Filter::eq("name", "test.txt"))
            .await
            .expect("Failed to retrieve document")
            .expect("Document should exist");
        assert_eq!(retrieved["size"], json!(13));

        let on_disk = temp_dir.path().join("files").join("documents").join("doc-1.json");
        assert!(on_disk.exists());
    }

    /// Test document deletion removes the file on disk
    #[tokio::test]
    async fn test_delete_document() {
        let (storage, temp_dir) = create_test_storage().await;
        storage
            .insert_one("files", json!({ "_id": "doc-1", "name": "temp.txt" }))
            .await
            .expect("Failed to store document");

        let removed = storage
            .delete_one("files", &Filter::eq("name", "temp.txt"))
            .await
            .expect("Failed to delete document");
        assert_eq!(removed, 1);

        let result = storage.find_one("files", &Filter::eq("name", "temp.txt")).await.expect("Failed to query");
        assert!(result.is_none());
        assert!(!temp_dir.path().join("files").join("documents").join("doc-1.json").exists());
    }

    /// Test compressed documents and indexes survive a reopen
    #[tokio::test]
    async fn test_reopen_with_compression() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        {
            let storage = DiskStorage::new(temp_dir.path())
                .await
                .expect("can't create disk storage")
                .with_compression(true);
            storage
                .create_index("files", &IndexSpec::new("name_1").asc("name").unique())
                .await
                .expect("Failed to create index");
            storage
                .insert_one("files", json!({ "_id": "a", "name": "file1.txt", "size": 16 }))
                .await
                .expect("Failed to store file1");
            storage
                .insert_one("files", json!({ "_id": "b", "name": "file2.txt", "size": 16 }))
                .await
                .expect("Failed to store file2");
            assert!(temp_dir.path().join("files").join("documents").join("a.json.gz").exists());
        }

        let reopened = DiskStorage::new(temp_dir.path()).await.expect("can't reopen disk storage");
        let files = reopened
            .find("files", &Filter::All, &FindOptions::default())
            .await
            .expect("Failed to list files");
        assert_eq!(files.len(), 2);
        let file_names: Vec<_> = files.iter().map(|f| f["name"].clone()).collect();
        assert!(file_names.contains(&json!("file1.txt")));
        assert!(file_names.contains(&json!("file2.txt")));

        let indexes = reopened.list_indexes("files").await.expect("Failed to list indexes");
        assert_eq!(indexes.len(), 1);
        let duplicate = reopened.insert_one("files", json!({ "name": "file1.txt" })).await;
        assert!(matches!(duplicate, Err(StorageError::DuplicateKey { .. })));
    }

    /// Swap a stored document file for a directory so the next write to it fails
    async fn block_document_file(temp_dir: &TempDir, collection: &str, id: &str) {
        let path = temp_dir.path().join(collection).join("documents").join(format!("{}.json", id));
        if path.exists() {
            tokio::fs::remove_file(&path).await.expect("Failed to remove document file");
        }
        tokio::fs::create_dir_all(&path).await.expect("Failed to create blocking directory");
    }

    /// Test a failed disk write leaves the previous document visible
    #[tokio::test]
    async fn test_failed_update_leaves_document_unchanged() {
        let (storage, temp_dir) = create_test_storage().await;
        storage
            .insert_one("files", json!({ "_id": "doc-1", "name": "a.txt", "size": 1 }))
            .await
            .expect("Failed to store document");
        block_document_file(&temp_dir, "files", "doc-1").await;

        let mut changes = Map::new();
        changes.insert("size".to_string(), json!(2));
        let result = storage.find_one_and_update("files", &Filter::eq("name", "a.txt"), changes).await;
        assert!(matches!(result, Err(StorageError::Io(_))));

        let current = storage
            .find_one("files", &Filter::eq("name", "a.txt"))
            .await
            .expect("Failed to query")
            .expect("Document should still exist");
        assert_eq!(current["size"], json!(1));
    }

    /// Test a failed insert can be retried without a duplicate key error
    #[tokio::test]
    async fn test_failed_insert_can_be_retried() {
        let (storage, temp_dir) = create_test_storage().await;
        storage
            .create_index("files", &IndexSpec::new("name_1").asc("name").unique())
            .await
            .expect("Failed to create index");
        block_document_file(&temp_dir, "files", "doc-2").await;

        let result = storage.insert_one("files", json!({ "_id": "doc-2", "name": "b.txt" })).await;
        assert!(result.is_err());
        assert!(storage.find_one("files", &Filter::eq("name", "b.txt")).await.expect("Failed to query").is_none());

        let blocked = temp_dir.path().join("files").join("documents").join("doc-2.json");
        tokio::fs::remove_dir(&blocked).await.expect("Failed to unblock document path");
        storage
            .insert_one("files", json!({ "_id": "doc-2", "name": "b.txt" }))
            .await
            .expect("Retry should succeed");
    }

    /// Test a failed delete keeps the document readable
    #[tokio::test]
    async fn test_failed_delete_keeps_document() {
        let (storage, temp_dir) = create_test_storage().await;
        storage
            .insert_one("files", json!({ "_id": "doc-3", "name": "c.txt" }))
            .await
            .expect("Failed to store document");
        block_document_file(&temp_dir, "files", "doc-3").await;

        let result = storage.delete_one("files", &Filter::eq("name", "c.txt")).await;
        assert!(result.is_err());
        assert!(storage.find_one("files", &Filter::eq("name", "c.txt")).await.expect("Failed to query").is_some());
    }

    /// Test a repository update that cannot be written keeps the previous version
    #[tokio::test]
    async fn test_repository_update_write_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&temp_dir);
        let repository = FileRepository::open(&config).await.expect("Failed to open repository");
        let file = repository.create_file("P", "notes.md", "first version").await.expect("Failed to create file");
        block_document_file(&temp_dir, &config.files_collection, &file.id.to_string()).await;

        let result = repository.update_file("P", "notes.md", "second version").await;
        assert!(matches!(result, Err(RepositoryError::Storage(_))));

        let current = repository
            .load_file("P", "notes.md")
            .await
            .expect("Failed to load file")
            .expect("File should exist");
        assert_eq!(current.metadata.version, 1);
        assert_eq!(current.content, "first version");
    }

    /// Test switching compression on leaves one current copy per document
    #[tokio::test]
    async fn test_compression_switch_replaces_stale_copy() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        {
            let storage = DiskStorage::new(temp_dir.path()).await.expect("can't create disk storage");
            storage
                .insert_one("files", json!({ "_id": "doc-4", "size": 1 }))
                .await
                .expect("Failed to store document");
        }
        {
            let storage = DiskStorage::new(temp_dir.path())
                .await
                .expect("can't create disk storage")
                .with_compression(true);
            let mut changes = Map::new();
            changes.insert("size".to_string(), json!(2));
            storage
                .find_one_and_update("files", &Filter::eq("_id", "doc-4"), changes)
                .await
                .expect("Failed to update document");
        }

        let reopened = DiskStorage::new(temp_dir.path()).await.expect("can't reopen disk storage");
        let documents = reopened
            .find("files", &Filter::All, &FindOptions::default())
            .await
            .expect("Failed to list documents");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["size"], json!(2));
    }

    /// Test sorted queries honor the result limit
    #[tokio::test]
    async fn test_find_with_sort_and_limit() {
        let (storage, _temp_dir) = create_test_storage().await;
        for (id, size) in [("a", 30), ("b", 10), ("c", 20)] {
            storage
                .insert_one("files", json!({ "_id": id, "size": size }))
                .await
                .expect("Failed to store document");
        }

        let smallest = storage
            .find("files", &Filter::All, &FindOptions::sorted_asc("size").with_limit(2))
            .await
            .expect("Failed to query");
        let sizes: Vec<_> = smallest.iter().map(|d| d["size"].clone()).collect();
        assert_eq!(sizes, vec![json!(10), json!(20)]);
    }

    /// Test invalid collection names never become paths
    #[tokio::test]
    async fn test_rejects_path_like_collection_names() {
        let (storage, _temp_dir) = create_test_storage().await;
        let result = storage.insert_one("../escape", json!({ "name": "x" })).await;
        assert!(matches!(result, Err(StorageError::Query(_))));
    }

    /// Test a repository opened from config persists files, history and stats across restarts
    #[tokio::test]
    async fn test_repository_round_trip_on_disk() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&temp_dir);

        {
            let repository = FileRepository::open(&config).await.expect("Failed to open repository");
            repository.create_file("P", "notes.md", "Hello world").await.expect("Failed to create file");
            repository
                .update_file("P", "notes.md", "Hello world again today")
                .await
                .expect("Failed to update file");
        }

        let repository = FileRepository::open(&config).await.expect("Failed to reopen repository");
        assert!(repository.provision_report().is_complete());

        let file = repository
            .load_file("P", "notes.md")
            .await
            .expect("Failed to load file")
            .expect("File should survive restart");
        assert_eq!(file.metadata.version, 2);
        assert_eq!(file.content, "Hello world again today");

        let versions = repository.list_versions("P", "notes.md").await.expect("Failed to list versions");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].content, "Hello world");

        let results = repository.search_files("P", "today").await.expect("Failed to search");
        assert_eq!(results.len(), 1);

        let backend: Arc<dyn DocumentBackend> = Arc::new(
            DiskStorage::new(&config.data_dir).await.expect("can't open disk storage"),
        );
        let stats = project_vault::repository::DocumentStatsStore::new(backend, &config.stats_collection).await;
        assert_eq!(
            stats.get("P").await.expect("Failed to read stats"),
            Some(ProjectStats { file_count: 1, total_size: 23 })
        );

        assert!(repository.delete_file("P", "notes.md").await.expect("Failed to delete file"));
        assert_eq!(
            repository.project_stats("P").await.expect("Failed to compute stats"),
            ProjectStats::default()
        );
    }
}
