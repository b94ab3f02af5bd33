//! Document store seam.
//!
//! The pipeline and annotation worker read submitted document text by
//! `(bucket, key)`. Production deployments point this at an object store;
//! [`FileStore`] maps buckets to directories for local operation and
//! [`MemoryStore`] backs tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StorageError;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_text(&self, bucket: &str, key: &str) -> Result<String, StorageError>;
}

/// Filesystem-backed store: `<root>/<bucket>/<key>`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Bucket and key come from external trigger payloads; reject anything
    /// that could escape the store root.
    fn validate_component(key: &str, component: &str) -> Result<(), StorageError> {
        if component.is_empty() {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "empty path component".to_string(),
            });
        }
        if Path::new(component).is_absolute() {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "absolute path".to_string(),
            });
        }
        if component.split(['/', '\\']).any(|part| part == "..") {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "path traversal".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn fetch_text(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        Self::validate_component(key, bucket)?;
        Self::validate_component(key, key)?;

        let path = self.root.join(bucket).join(key);
        if !path.exists() {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StorageError::ReadDocument { path, source: e })
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, text: &str) {
        self.documents
            .write()
            .expect("memory store lock")
            .insert((bucket.to_string(), key.to_string()), text.to_string());
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_text(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        self.documents
            .read()
            .expect("memory store lock")
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_fetch() {
        let tmp = TempDir::new().unwrap();
        let bucket_dir = tmp.path().join("uploads");
        std::fs::create_dir_all(&bucket_dir).unwrap();
        std::fs::write(bucket_dir.join("doc.txt"), "submitted text").unwrap();

        let store = FileStore::new(tmp.path());
        let text = store.fetch_text("uploads", "doc.txt").await.unwrap();
        assert_eq!(text, "submitted text");
    }

    #[tokio::test]
    async fn test_file_store_missing_document() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        let err = store.fetch_text("uploads", "absent.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_file_store_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());

        let err = store
            .fetch_text("uploads", "../escape.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));

        let err = store.fetch_text("..", "doc.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));

        let err = store.fetch_text("uploads", "/etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.insert("uploads", "d1.txt", "hello");

        assert_eq!(store.fetch_text("uploads", "d1.txt").await.unwrap(), "hello");
        assert!(store.fetch_text("uploads", "d2.txt").await.is_err());
    }
}
