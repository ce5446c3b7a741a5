use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ObjectStore, StorageError};

/// Filesystem-backed object store. Objects live at `root/bucket/path` and
/// are served under `public_base_url/bucket/path`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, bucket, path)
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(bucket).join(path);
        let is_safe = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_safe {
            return Err(StorageError::InvalidPath(format!("{bucket}/{path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(format!("{bucket}/{path}")));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes).await?;
        file.flush().await?;

        tracing::debug!(bucket, path, size = bytes.len(), "Stored object");
        Ok(self.public_url(bucket, path))
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(bucket, path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(bucket, path, "Object already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost:3001/storage/");

        let url = store
            .put("event-images", "abc/abc-1.png", b"png-bytes")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3001/storage/event-images/abc/abc-1.png");

        let on_disk = dir.path().join("event-images/abc/abc-1.png");
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"png-bytes");

        store.delete("event-images", "abc/abc-1.png").await.unwrap();
        assert!(!on_disk.exists());
        // Deleting twice is fine
        store.delete("event-images", "abc/abc-1.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://cdn");

        store.put("b", "x.jpg", b"one").await.unwrap();
        let err = store.put("b", "x.jpg", b"two").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://cdn");

        let err = store.put("b", "../escape.txt", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
        let err = store.delete("b", "/etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }
}
