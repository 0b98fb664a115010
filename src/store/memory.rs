//! In-memory object client
//!
//! Backs tests and dry runs. Tracks put counts so tests can assert that a
//! cached artifact really skipped the upload, and supports planting delete
//! markers and access denials to exercise the adapter's error paths.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{ObjectClient, ObjectHead, ObjectTags};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct StoredObject {
    size: u64,
    tags: ObjectTags,
    version: String,
    delete_marker: bool,
}

#[derive(Default)]
pub struct MemoryObjectClient {
    objects: RwLock<HashMap<String, StoredObject>>,
    denied: RwLock<HashSet<String>>,
    puts: AtomicUsize,
    versions: AtomicU64,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through `put_object` (does not count as
    /// an upload)
    pub fn seed(&self, key: &str, size: u64, tags: ObjectTags) {
        let version = self.next_version();
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(
                key.to_string(),
                StoredObject {
                    size,
                    tags,
                    version,
                    delete_marker: false,
                },
            );
        }
    }

    /// Replace the newest version with a delete marker; `head` then reports
    /// the object as absent
    pub fn mark_deleted(&self, key: &str) {
        if let Ok(mut objects) = self.objects.write() {
            if let Some(object) = objects.get_mut(key) {
                object.delete_marker = true;
            }
        }
    }

    /// Make every access to `key` fail with `AccessDenied`
    pub fn deny(&self, key: &str) {
        if let Ok(mut denied) = self.denied.write() {
            denied.insert(key.to_string());
        }
    }

    /// Number of `put_object` calls observed
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.objects
            .read()
            .map(|o| o.values().filter(|s| !s.delete_marker).count())
            .unwrap_or(0)
    }

    fn next_version(&self) -> String {
        format!("v{}", self.versions.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_access(&self, key: &str) -> Result<(), StoreError> {
        let denied = self
            .denied
            .read()
            .map_err(|_| StoreError::Transient("lock poisoned".to_string()))?;
        if denied.contains(key) {
            return Err(StoreError::AccessDenied(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        self.check_access(key)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| StoreError::Transient("lock poisoned".to_string()))?;
        Ok(objects.get(key).and_then(|object| {
            if object.delete_marker {
                None
            } else {
                Some(ObjectHead {
                    size: object.size,
                    version: Some(object.version.clone()),
                })
            }
        }))
    }

    async fn get_tags(&self, key: &str) -> Result<ObjectTags, StoreError> {
        self.check_access(key)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| StoreError::Transient("lock poisoned".to_string()))?;
        match objects.get(key) {
            Some(object) if !object.delete_marker => Ok(object.tags.clone()),
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        body: &Path,
        tags: &ObjectTags,
    ) -> Result<Option<String>, StoreError> {
        self.check_access(key)?;
        let size = std::fs::metadata(body)
            .map_err(|e| StoreError::Transient(format!("cannot read body {}: {e}", body.display())))?
            .len();
        self.puts.fetch_add(1, Ordering::SeqCst);
        let version = self.next_version();
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StoreError::Transient("lock poisoned".to_string()))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                size,
                tags: tags.clone(),
                version: version.clone(),
                delete_marker: false,
            },
        );
        Ok(Some(version))
    }

    async fn put_tags(&self, key: &str, tags: &ObjectTags) -> Result<(), StoreError> {
        self.check_access(key)?;
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StoreError::Transient("lock poisoned".to_string()))?;
        match objects.get_mut(key) {
            Some(object) if !object.delete_marker => {
                object.tags = tags.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.check_access(key)?;
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StoreError::Transient("lock poisoned".to_string()))?;
        objects.remove(key);
        Ok(())
    }

    fn location(&self) -> String {
        "memory://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> ObjectTags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_head_absent() {
        let client = MemoryObjectClient::new();
        assert!(client.head("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seed_and_head() {
        let client = MemoryObjectClient::new();
        client.seed("k", 100, tags(&[("runtime", "python3.11")]));

        let head = client.head("k").await.unwrap().unwrap();
        assert_eq!(head.size, 100);
        assert_eq!(client.put_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_marker_reads_as_absent() {
        let client = MemoryObjectClient::new();
        client.seed("k", 100, ObjectTags::new());
        client.mark_deleted("k");

        assert!(client.head("k").await.unwrap().is_none());
        assert!(matches!(
            client.get_tags("k").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_denied_key() {
        let client = MemoryObjectClient::new();
        client.deny("secret");
        assert!(matches!(
            client.head("secret").await,
            Err(StoreError::AccessDenied(_))
        ));
    }
}
