//! On-disk object store
//!
//! One directory per bucket under `.siteflow/local/buckets/`; an object key
//! maps to a file path with `/` as separator.

use crate::error::{LocalError, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|s| s.is_empty() || s == "." || s == "..")
        {
            return Err(LocalError::InvalidKey(key.to_string()));
        }
        Ok(key
            .split('/')
            .fold(self.bucket_dir(bucket), |path, segment| path.join(segment)))
    }

    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.bucket_dir(bucket).is_dir()
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        fs::create_dir_all(self.bucket_dir(bucket)).await?;
        tracing::debug!(bucket, "Created local bucket");
        Ok(())
    }

    fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.bucket_exists(bucket) {
            Ok(())
        } else {
            Err(LocalError::BucketNotFound(bucket.to_string()))
        }
    }

    pub async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        self.require_bucket(bucket)?;
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, body).await?;
        Ok(())
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.require_bucket(bucket)?;
        let path = match self.object_path(bucket, key) {
            Ok(path) => path,
            Err(LocalError::InvalidKey(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path).await?))
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.require_bucket(bucket)?;
        let path = self.object_path(bucket, key)?;
        if path.is_file() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    /// Every object in the bucket with its SHA-256, ordered by key
    pub async fn list_objects(&self, bucket: &str) -> Result<BTreeMap<String, String>> {
        self.require_bucket(bucket)?;
        let base = self.bucket_dir(bucket);
        let mut objects = BTreeMap::new();
        let mut pending = vec![base.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&base) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                let body = fs::read(&path).await?;
                objects.insert(key, hex::encode(Sha256::digest(&body)));
            }
        }

        Ok(objects)
    }

    /// Remove the bucket. A non-empty bucket is only removed with `force`.
    pub async fn delete_bucket(&self, bucket: &str, force: bool) -> Result<usize> {
        if !self.bucket_exists(bucket) {
            return Ok(0);
        }
        let objects = self.list_objects(bucket).await?.len();
        if objects > 0 && !force {
            return Err(LocalError::BucketNotEmpty {
                bucket: bucket.to_string(),
                objects,
            });
        }
        fs::remove_dir_all(self.bucket_dir(bucket)).await?;
        tracing::debug!(bucket, objects, "Deleted local bucket");
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        store.create_bucket("site").await.unwrap();

        store.put_object("site", "index.html", b"<html>").await.unwrap();
        store.put_object("site", "assets/app.js", b"1").await.unwrap();

        assert_eq!(
            store.get_object("site", "assets/app.js").await.unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(store.get_object("site", "missing").await.unwrap(), None);

        let keys: Vec<String> = store.list_objects("site").await.unwrap().into_keys().collect();
        assert_eq!(keys, vec!["assets/app.js".to_string(), "index.html".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        store.create_bucket("site").await.unwrap();

        let err = store.put_object("site", "../outside", b"x").await.unwrap_err();
        assert!(matches!(err, LocalError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_delete_non_empty_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        store.create_bucket("site").await.unwrap();
        store.put_object("site", "index.html", b"x").await.unwrap();

        let err = store.delete_bucket("site", false).await.unwrap_err();
        assert!(matches!(err, LocalError::BucketNotEmpty { objects: 1, .. }));

        assert_eq!(store.delete_bucket("site", true).await.unwrap(), 1);
        assert!(!store.bucket_exists("site"));
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let err = store.put_object("nope", "a", b"x").await.unwrap_err();
        assert!(matches!(err, LocalError::BucketNotFound(_)));
    }
}
