//! In-process object store.
//!
//! Verifies the supplied content digest the same way a real store checks
//! `Content-MD5`, which makes it useful for tests and local smoke runs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;

use super::{ObjectBody, ObjectStore, StoreError};
use crate::executor::digest::digest_bytes;

type Buckets = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds the given (empty) buckets
    pub fn with_containers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buckets = names
            .into_iter()
            .map(|name| (name.into(), BTreeMap::new()))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
        }
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Keys stored in a bucket, sorted
    pub fn keys(&self, container: &str) -> Vec<String> {
        self.lock()
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(container)
            .and_then(|objects| objects.get(key).cloned())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buckets> {
        // poisoning is ignored, inserts are single statements
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_container(&self, name: &str, _region: &str) -> Result<(), StoreError> {
        self.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: ObjectBody,
        content_digest: &str,
    ) -> Result<(), StoreError> {
        // only the declared length is read, as with Content-Length
        let mut content = Vec::with_capacity(body.len as usize);
        body.file.take(body.len).read_to_end(&mut content).await?;

        let actual = digest_bytes(&content);
        if actual != content_digest {
            return Err(StoreError::DigestMismatch {
                key: key.to_string(),
                expected: content_digest.to_string(),
                actual,
            });
        }

        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(container)
            .ok_or_else(|| StoreError::NoSuchContainer(container.to_string()))?;
        objects.insert(key.to_string(), content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn body_for(content: &[u8]) -> std::io::Result<(NamedTempFile, ObjectBody)> {
        let temp = NamedTempFile::new()?;
        std::fs::write(temp.path(), content)?;
        let file = tokio::fs::File::open(temp.path()).await?;
        Ok((temp, ObjectBody::new(file, content.len() as u64)))
    }

    #[tokio::test]
    async fn test_put_and_read_back() -> std::io::Result<()> {
        let store = MemoryStore::new();
        store.create_container("bucket", "us-east-1").await.unwrap();

        let (_temp, body) = body_for(b"hello").await?;
        store
            .put_object("bucket", "a/b.txt", body, &digest_bytes(b"hello"))
            .await
            .unwrap();

        assert_eq!(store.keys("bucket"), vec!["a/b.txt".to_string()]);
        assert_eq!(store.object("bucket", "a/b.txt").unwrap(), b"hello");
        Ok(())
    }

    #[tokio::test]
    async fn test_digest_mismatch_rejected() -> std::io::Result<()> {
        let store = MemoryStore::with_containers(["bucket"]);
        let (_temp, body) = body_for(b"hello").await?;

        let err = store
            .put_object("bucket", "k", body, &digest_bytes(b"other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DigestMismatch { .. }));
        assert!(store.keys("bucket").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_reads_declared_length_only() -> std::io::Result<()> {
        let store = MemoryStore::with_containers(["bucket"]);
        let (_temp, mut body) = body_for(b"hello world").await?;
        body.len = 5;

        store
            .put_object("bucket", "k", body, &digest_bytes(b"hello"))
            .await
            .unwrap();
        assert_eq!(store.object("bucket", "k").unwrap(), b"hello");
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_container_rejected() -> std::io::Result<()> {
        let store = MemoryStore::new();
        let (_temp, body) = body_for(b"x").await?;

        let err = store
            .put_object("missing", "k", body, &digest_bytes(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchContainer(_)));
        assert!(store.list_containers().await.unwrap().is_empty());
        Ok(())
    }
}
