//! Object-store interface
//!
//! The pipeline talks to storage through [`ObjectClient`], a small
//! head/tags/put/delete surface. Two implementations ship with the crate: an
//! in-memory client for tests and dry runs, and a filesystem client for
//! credential-free local stores. The cache semantics live one level up, in
//! [`adapter::ArtifactStore`], so every client gets them for free.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::StoreError;

pub mod adapter;
pub mod fs;
pub mod memory;

pub use adapter::ArtifactStore;
pub use fs::FsObjectClient;
pub use memory::MemoryObjectClient;

/// Provenance tag names attached to every stored artifact
pub const TAG_CODE_SHA256: &str = "code_sha256";
pub const TAG_MD5_CHECKSUM: &str = "md5_checksum";
pub const TAG_RUNTIME: &str = "runtime";
pub const TAG_COMPATIBLE_ARCHITECTURES: &str = "compatible_architectures";
pub const TAG_COMPATIBLE_RUNTIMES: &str = "compatible_runtimes";
pub const TAG_LICENSE: &str = "license";
pub const TAG_SOURCE_HASH: &str = "source_code.hash";

/// Separator for multi-valued tags (tag values cannot contain commas in
/// every store, `+` is safe everywhere)
pub const TAG_LIST_SEPARATOR: &str = "+";

/// String-valued provenance tags, ordered for stable comparison
pub type ObjectTags = BTreeMap<String, String>;

/// Result of a metadata-only existence probe
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub size: u64,
    pub version: Option<String>,
}

/// Minimal object-store client surface consumed by the adapter
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Metadata-only probe. Absent objects and delete markers both map to
    /// `Ok(None)`; errors are reserved for access and transport failures.
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError>;

    /// Read the tag set of an existing object
    async fn get_tags(&self, key: &str) -> Result<ObjectTags, StoreError>;

    /// Store body and tags together; partially-tagged objects must not be
    /// observable. Returns the new version id where the store supports one.
    async fn put_object(
        &self,
        key: &str,
        body: &Path,
        tags: &ObjectTags,
    ) -> Result<Option<String>, StoreError>;

    /// Replace the tag set of an existing object
    async fn put_tags(&self, key: &str, tags: &ObjectTags) -> Result<(), StoreError>;

    /// Remove an object; removing an absent object is not an error
    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;

    /// Human-readable store location for descriptors and logs
    fn location(&self) -> String;
}

/// Join a multi-valued tag, `None` when the list is empty
pub fn join_tag_list(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join(TAG_LIST_SEPARATOR))
    }
}

/// Split a multi-valued tag back into its parts
pub fn split_tag_list(value: &str) -> Vec<String> {
    value
        .split(TAG_LIST_SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
