//! Stored artifact recovered from the cache
//!
//! When the existence probe finds an object whose runtime tag matches, no
//! build happens at all; everything the caller needs is reconstructed from
//! the object's provenance tags.

use async_trait::async_trait;

use super::{Artifact, Descriptor};
use crate::error::Result;
use crate::runtime::Runtime;
use crate::store::{
    split_tag_list, ArtifactStore, ObjectHead, TAG_CODE_SHA256, TAG_COMPATIBLE_ARCHITECTURES,
    TAG_COMPATIBLE_RUNTIMES, TAG_LICENSE, TAG_MD5_CHECKSUM,
};

pub struct RemoteArtifact<'a> {
    store: &'a ArtifactStore,
    key: String,
    runtime: Runtime,
    head: ObjectHead,
}

impl<'a> RemoteArtifact<'a> {
    pub fn new(store: &'a ArtifactStore, key: String, runtime: Runtime, head: ObjectHead) -> Self {
        Self {
            store,
            key,
            runtime,
            head,
        }
    }

    pub fn size(&self) -> u64 {
        self.head.size
    }
}

#[async_trait]
impl Artifact for RemoteArtifact<'_> {
    fn key(&self) -> &str {
        &self.key
    }

    fn runtime(&self) -> Runtime {
        self.runtime
    }

    async fn code_sha256(&self) -> Result<String> {
        self.store.tag(&self.key, TAG_CODE_SHA256).await
    }

    async fn md5_checksum(&self) -> Result<String> {
        self.store.tag(&self.key, TAG_MD5_CHECKSUM).await
    }

    async fn descriptor(&self) -> Result<Descriptor> {
        let tags = self.store.provenance(&self.key).await?;
        Ok(Descriptor {
            store: self.store.location(),
            key: self.key.clone(),
            version: self.head.version.clone(),
            code_sha256: self.code_sha256().await?,
            runtime: self.runtime.as_str().to_string(),
            license: tags.get(TAG_LICENSE).cloned(),
            compatible_architectures: tags
                .get(TAG_COMPATIBLE_ARCHITECTURES)
                .map(|v| split_tag_list(v))
                .unwrap_or_default(),
            compatible_runtimes: tags
                .get(TAG_COMPATIBLE_RUNTIMES)
                .map(|v| split_tag_list(v))
                .unwrap_or_default(),
        })
    }
}
