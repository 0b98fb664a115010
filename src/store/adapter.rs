//! Remote artifact store adapter
//!
//! Wraps an [`ObjectClient`] with the cache semantics the pipeline relies
//! on: cheap existence probes, a per-key provenance cache, uploads that
//! never re-send bytes for objects that already exist, and deletes that
//! drop the cached provenance in the same step.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::{ObjectClient, ObjectHead, ObjectTags};
use crate::config::BuildConfig;
use crate::error::{PackError, Result};
use crate::package::Kind;

pub struct ArtifactStore {
    client: Arc<dyn ObjectClient>,
    purpose_prefix: String,
    object_prefix: Option<String>,
    tag_cache: RwLock<HashMap<String, ObjectTags>>,
}

impl ArtifactStore {
    pub fn new(
        client: Arc<dyn ObjectClient>,
        purpose_prefix: String,
        object_prefix: Option<String>,
    ) -> Self {
        Self {
            client,
            purpose_prefix,
            object_prefix,
            tag_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(client: Arc<dyn ObjectClient>, config: &BuildConfig) -> Self {
        Self::new(
            client,
            config.store_prefix.clone(),
            config.object_prefix.clone(),
        )
    }

    pub fn location(&self) -> String {
        self.client.location()
    }

    /// Deterministic key:
    /// `<purpose-prefix>/<usage-kind>s/[<object-prefix>/]<name>.<hash>.zip`
    pub fn key_for(&self, kind: Kind, name: &str, source_hash: &str) -> String {
        match &self.object_prefix {
            Some(prefix) => format!(
                "{}/{}/{}/{}.{}.zip",
                self.purpose_prefix,
                kind.plural(),
                prefix,
                name,
                source_hash
            ),
            None => format!(
                "{}/{}/{}.{}.zip",
                self.purpose_prefix,
                kind.plural(),
                name,
                source_hash
            ),
        }
    }

    /// Existence probe; `NotFound` from the client is a normal answer here,
    /// not an error
    pub async fn exists(&self, key: &str) -> Result<Option<ObjectHead>> {
        match self.client.head(key).await {
            Ok(head) => Ok(head),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Provenance tags for an existing object, cached per key
    pub async fn provenance(&self, key: &str) -> Result<ObjectTags> {
        if let Ok(cache) = self.tag_cache.read() {
            if let Some(tags) = cache.get(key) {
                return Ok(tags.clone());
            }
        }
        let tags = self.client.get_tags(key).await?;
        self.cache_tags(key, &tags);
        Ok(tags)
    }

    /// Read one required provenance tag; a missing tag is schema drift, not
    /// absence
    pub async fn tag(&self, key: &str, name: &str) -> Result<String> {
        self.provenance(key)
            .await?
            .get(name)
            .cloned()
            .ok_or_else(|| PackError::MissingProvenance {
                key: key.to_string(),
                tag: name.to_string(),
            })
    }

    /// Upload an artifact. Bytes are never re-sent for an existing object;
    /// only the tag set is reconciled, and a matching tag set is a logged
    /// no-op.
    pub async fn upload(
        &self,
        key: &str,
        body: &Path,
        tags: ObjectTags,
    ) -> Result<Option<String>> {
        if let Some(head) = self.exists(key).await? {
            let stored = self.client.get_tags(key).await?;
            if stored == tags {
                info!(key = %key, "Object already stored with matching tags, nothing to do");
            } else {
                info!(key = %key, "Object already stored, reconciling tags");
                self.client.put_tags(key, &tags).await?;
            }
            self.cache_tags(key, &tags);
            return Ok(head.version);
        }

        info!(key = %key, body = %body.display(), "Uploading artifact");
        let version = self.client.put_object(key, body, &tags).await?;
        self.cache_tags(key, &tags);
        Ok(version)
    }

    /// Remove the object and its cached provenance in one step
    pub async fn delete(&self, key: &str) -> Result<()> {
        debug!(key = %key, "Deleting stored artifact");
        self.client.delete_object(key).await?;
        if let Ok(mut cache) = self.tag_cache.write() {
            cache.remove(key);
        }
        Ok(())
    }

    fn cache_tags(&self, key: &str, tags: &ObjectTags) {
        if let Ok(mut cache) = self.tag_cache.write() {
            cache.insert(key.to_string(), tags.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryObjectClient;
    use std::fs;
    use tempfile::TempDir;

    fn tags(pairs: &[(&str, &str)]) -> ObjectTags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn store_over(client: Arc<MemoryObjectClient>) -> ArtifactStore {
        ArtifactStore::new(client, "packages".to_string(), None)
    }

    #[test]
    fn test_key_scheme() {
        let store = store_over(Arc::new(MemoryObjectClient::new()));
        assert_eq!(
            store.key_for(Kind::Function, "app", "abc123"),
            "packages/functions/app.abc123.zip"
        );
        assert_eq!(
            store.key_for(Kind::Layer, "app", "abc123"),
            "packages/layers/app.abc123.zip"
        );

        let prefixed = ArtifactStore::new(
            Arc::new(MemoryObjectClient::new()),
            "packages".to_string(),
            Some("team-a".to_string()),
        );
        assert_eq!(
            prefixed.key_for(Kind::Function, "app", "abc123"),
            "packages/functions/team-a/app.abc123.zip"
        );
    }

    #[tokio::test]
    async fn test_upload_skips_existing_bytes() {
        let client = Arc::new(MemoryObjectClient::new());
        let store = store_over(client.clone());
        let scratch = TempDir::new().unwrap();
        let body = scratch.path().join("a.zip");
        fs::write(&body, b"bytes").unwrap();

        let desired = tags(&[("runtime", "python3.11")]);
        store.upload("k", &body, desired.clone()).await.unwrap();
        assert_eq!(client.put_count(), 1);

        // Same tags: true no-op
        store.upload("k", &body, desired.clone()).await.unwrap();
        assert_eq!(client.put_count(), 1);

        // Different tags: reconcile without re-sending bytes
        let updated = tags(&[("runtime", "python3.11"), ("license", "MIT")]);
        store.upload("k", &body, updated.clone()).await.unwrap();
        assert_eq!(client.put_count(), 1);
        assert_eq!(client.get_tags("k").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_missing_tag_is_provenance_error() {
        let client = Arc::new(MemoryObjectClient::new());
        client.seed("k", 100, tags(&[("runtime", "python3.11")]));
        let store = store_over(client);

        let err = store.tag("k", "code_sha256").await.unwrap_err();
        assert!(matches!(err, PackError::MissingProvenance { .. }));

        // Present tags still read fine
        assert_eq!(store.tag("k", "runtime").await.unwrap(), "python3.11");
    }

    #[tokio::test]
    async fn test_delete_drops_cached_provenance() {
        let client = Arc::new(MemoryObjectClient::new());
        client.seed("k", 100, tags(&[("runtime", "python3.11")]));
        let store = store_over(client.clone());

        // Warm the cache, then delete and re-seed with different tags
        assert_eq!(store.tag("k", "runtime").await.unwrap(), "python3.11");
        store.delete("k").await.unwrap();
        client.seed("k", 100, tags(&[("runtime", "python3.12")]));

        assert_eq!(store.tag("k", "runtime").await.unwrap(), "python3.12");
    }

    #[tokio::test]
    async fn test_access_denied_propagates() {
        let client = Arc::new(MemoryObjectClient::new());
        client.deny("k");
        let store = store_over(client);

        let err = store.exists("k").await.unwrap_err();
        assert!(matches!(
            err,
            PackError::Store(StoreError::AccessDenied(_))
        ));
    }
}
