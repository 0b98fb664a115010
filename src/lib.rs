//! packbox - content-addressed packaging of source code and Python
//! dependencies into deployable zip artifacts
//!
//! This library turns a project directory into a deterministic zip archive
//! and keeps an idempotent cache of those archives in an object store. The
//! store key embeds a hash of the source tree, so an unchanged tree is never
//! rebuilt and never re-uploaded; provenance tags on each object prove what
//! it was built from and for which runtime.
//!
//! # Core Concepts
//!
//! - **Source hash**: sha256 over every packaged file plus pinned lockfiles,
//!   in path-sorted order. Identical trees hash identically regardless of
//!   filesystem walk order.
//! - **Dependency managers**: uv, poetry, pipenv and pip, detected by their
//!   marker files in a fixed cascade and normalized to a requirements
//!   manifest before installation.
//! - **Artifacts**: a `function` packages source and dependencies side by
//!   side; a `layer` nests everything under the runtime's prefix.
//! - **Provenance tags**: checksums, runtime and source hash attached to
//!   every stored object; the cache decision reads them instead of the bytes.
//!
//! # Example Usage
//!
//! ```ignore
//! use packbox::{init, ArtifactStore, BuildConfig, FsObjectClient, Kind, Project};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! async fn package(root: PathBuf, store_dir: PathBuf) -> packbox::Result<()> {
//!     let project = Project::new(root, BuildConfig::default())?;
//!     let client = Arc::new(FsObjectClient::new(store_dir)?);
//!     let store = ArtifactStore::from_config(client, project.config());
//!
//!     let artifact = init(&project, Kind::Function, &store).await?;
//!     println!("{}", serde_json::to_string_pretty(&artifact.descriptor().await?)?);
//!
//!     project.cleanup();
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`source`]: tree enumeration and content hashing
//! - [`manager`]: dependency-manager detection cascade and exports
//! - [`builder`]: local and container-isolated dependency installation
//! - [`archive`]: zip assembly and permission normalization
//! - [`store`]: object-store clients and the caching adapter
//! - [`package`]: the build/reuse pipeline tying it all together

// Public modules
pub mod archive;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod manager;
pub mod package;
pub mod project;
pub mod runtime;
pub mod source;
pub mod store;

// Re-export key types for convenient access
pub use config::BuildConfig;
pub use error::{PackError, Result, StoreError};
pub use manager::{DependencyManager, ManagerId, ManagerPreference, ManagerRegistry};
pub use package::{init, Artifact, Descriptor, Kind};
pub use project::Project;
pub use runtime::Runtime;
pub use source::SourceCode;
pub use store::{ArtifactStore, FsObjectClient, MemoryObjectClient, ObjectClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
