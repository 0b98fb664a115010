//! Filesystem-backed object client
//!
//! Lays objects out under a root directory keyed by their store key, with
//! provenance tags in a `<key>.tags.json` sidecar. Body and sidecar are
//! written to temporary names and renamed into place so a crashed upload
//! never leaves a readable object without its tags.

use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ObjectClient, ObjectHead, ObjectTags};
use crate::error::StoreError;

pub struct FsObjectClient {
    root: PathBuf,
}

impl FsObjectClient {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&root).map_err(|e| map_io("store root", e))?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn tags_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.tags.json"))
    }

    fn write_tags(&self, key: &str, tags: &ObjectTags) -> Result<(), StoreError> {
        let path = self.tags_path(key);
        let tmp = path.with_extension("json.tmp");
        let rendered = serde_json::to_vec_pretty(tags)
            .map_err(|e| StoreError::Transient(format!("cannot encode tags for {key}: {e}")))?;
        fs::write(&tmp, rendered).map_err(|e| map_io(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| map_io(key, e))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectClient for FsObjectClient {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        match fs::metadata(self.object_path(key)) {
            Ok(meta) => Ok(Some(ObjectHead {
                size: meta.len(),
                version: None,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(key, e)),
        }
    }

    async fn get_tags(&self, key: &str) -> Result<ObjectTags, StoreError> {
        if !self.object_path(key).is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        match fs::read(self.tags_path(key)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Transient(format!("corrupt tag sidecar for {key}: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ObjectTags::new()),
            Err(e) => Err(map_io(key, e)),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        body: &Path,
        tags: &ObjectTags,
    ) -> Result<Option<String>, StoreError> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| map_io(key, e))?;
        }
        // Tags land before the body is renamed into place, so a visible
        // object always has its tag set
        self.write_tags(key, tags)?;
        let tmp = path.with_extension("zip.tmp");
        fs::copy(body, &tmp).map_err(|e| map_io(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| map_io(key, e))?;
        debug!(key = %key, "Stored object");
        Ok(None)
    }

    async fn put_tags(&self, key: &str, tags: &ObjectTags) -> Result<(), StoreError> {
        if !self.object_path(key).is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.write_tags(key, tags)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        for path in [self.object_path(key), self.tags_path(key)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(map_io(key, e)),
            }
        }
        Ok(())
    }

    fn location(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

fn map_io(key: &str, e: std::io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
        ErrorKind::PermissionDenied => StoreError::AccessDenied(key.to_string()),
        _ => StoreError::Transient(format!("{key}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tags(pairs: &[(&str, &str)]) -> ObjectTags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn body_file(dir: &TempDir, content: &[u8]) -> PathBuf {
        let path = dir.path().join("body.zip");
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_put_head_round_trip() {
        let store_dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let client = FsObjectClient::new(store_dir.path().join("store")).unwrap();
        let body = body_file(&scratch, b"zip-bytes");

        let key = "packages/functions/app.abc123.zip";
        client
            .put_object(key, &body, &tags(&[("runtime", "python3.11")]))
            .await
            .unwrap();

        let head = client.head(key).await.unwrap().unwrap();
        assert_eq!(head.size, 9);

        let stored = client.get_tags(key).await.unwrap();
        assert_eq!(stored.get("runtime").map(String::as_str), Some("python3.11"));
    }

    #[tokio::test]
    async fn test_get_tags_of_missing_object_is_not_found() {
        let store_dir = TempDir::new().unwrap();
        let client = FsObjectClient::new(store_dir.path().to_path_buf()).unwrap();
        assert!(matches!(
            client.get_tags("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_body_and_sidecar() {
        let store_dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let client = FsObjectClient::new(store_dir.path().to_path_buf()).unwrap();
        let body = body_file(&scratch, b"zip-bytes");

        client
            .put_object("k.zip", &body, &ObjectTags::new())
            .await
            .unwrap();
        client.delete_object("k.zip").await.unwrap();

        assert!(client.head("k.zip").await.unwrap().is_none());
        // Deleting again is a no-op
        client.delete_object("k.zip").await.unwrap();
    }
}
