//! Artifact pipeline
//!
//! [`init`] is the crate's main entry point. It resolves the target runtime,
//! derives the deterministic store key from the source hash, and decides
//! between three outcomes: reuse a stored artifact whose runtime matches,
//! rebuild after deleting one whose runtime differs, or build and upload a
//! fresh one when nothing is stored.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::builder;
use crate::error::Result;
use crate::project::Project;
use crate::runtime::Runtime;
use crate::store::{ArtifactStore, TAG_RUNTIME};

pub mod local;
pub mod remote;

pub use local::LocalPackage;
pub use remote::RemoteArtifact;

/// How the artifact will be consumed; decides the archive layout and the
/// key namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Source and dependencies side by side at the archive root
    Function,
    /// Everything nested under the runtime's layer prefix
    Layer,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Function => "function",
            Kind::Layer => "layer",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Kind::Function => "functions",
            Kind::Layer => "layers",
        }
    }
}

/// Machine-readable summary of a stored artifact
#[derive(Debug, Clone, Serialize)]
pub struct Descriptor {
    pub store: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub code_sha256: String,
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compatible_architectures: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compatible_runtimes: Vec<String>,
}

/// A packaged artifact, freshly built or recovered from the store
#[async_trait]
pub trait Artifact: Send + Sync {
    /// Object-store key of the artifact
    fn key(&self) -> &str;

    /// Runtime the artifact was built for
    fn runtime(&self) -> Runtime;

    async fn code_sha256(&self) -> Result<String>;

    async fn md5_checksum(&self) -> Result<String>;

    async fn descriptor(&self) -> Result<Descriptor>;
}

/// Produce a stored artifact for the project, reusing the cached one when its
/// provenance proves it interchangeable
pub async fn init<'a>(
    project: &'a Project,
    kind: Kind,
    store: &'a ArtifactStore,
) -> Result<Box<dyn Artifact + 'a>> {
    let runtime = builder::resolve_runtime(project).await?;
    let key = store.key_for(kind, project.root_name(), &project.source_hash()?);

    if let Some(head) = store.exists(&key).await? {
        let stored_runtime = store.tag(&key, TAG_RUNTIME).await?;
        if stored_runtime == runtime.as_str() {
            info!(key = %key, runtime = %runtime, "Reusing stored artifact");
            return Ok(Box::new(RemoteArtifact::new(store, key, runtime, head)));
        }
        warn!(
            key = %key,
            stored = %stored_runtime,
            declared = %runtime,
            "Stored artifact was built for a different runtime, rebuilding"
        );
        store.delete(&key).await?;
    }

    let package = LocalPackage::new(project, store, kind, runtime, key)?;
    if let Err(e) = package.build_and_upload().await {
        project.cleanup_on_error();
        return Err(e);
    }
    Ok(Box::new(package))
}
