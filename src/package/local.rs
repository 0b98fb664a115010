//! Locally built package
//!
//! Owns the build-and-upload half of the pipeline: export dependencies,
//! install them, assemble the archive, normalize entry modes, then hand the
//! file to the store with its full provenance tag set. The on-disk archive is
//! itself a cache; a rebuild for the same source hash is skipped when a
//! non-empty archive is already present.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{Artifact, Descriptor, Kind};
use crate::archive::{self, ArchiveBuilder, EMPTY_ARCHIVE_SIZE};
use crate::builder::install_dependencies;
use crate::error::Result;
use crate::manager::ManagerRegistry;
use crate::project::Project;
use crate::runtime::Runtime;
use crate::source::relative_name;
use crate::store::{
    join_tag_list, ArtifactStore, ObjectTags, TAG_CODE_SHA256, TAG_COMPATIBLE_ARCHITECTURES,
    TAG_COMPATIBLE_RUNTIMES, TAG_LICENSE, TAG_MD5_CHECKSUM, TAG_RUNTIME, TAG_SOURCE_HASH,
};

pub struct LocalPackage<'a> {
    project: &'a Project,
    store: &'a ArtifactStore,
    kind: Kind,
    runtime: Runtime,
    key: String,
    archive_path: PathBuf,
    checksums: Mutex<Option<(String, String)>>,
    version: Mutex<Option<String>>,
}

impl<'a> LocalPackage<'a> {
    pub fn new(
        project: &'a Project,
        store: &'a ArtifactStore,
        kind: Kind,
        runtime: Runtime,
        key: String,
    ) -> Result<Self> {
        let infix = match kind {
            Kind::Function => String::new(),
            Kind::Layer => ".layer".to_string(),
        };
        let archive_path = project.build_dir()?.join(format!(
            "{}{}.{}.{}.zip",
            project.root_name(),
            infix,
            runtime,
            project.source_hash()?
        ));
        Ok(Self {
            project,
            store,
            kind,
            runtime,
            key,
            archive_path,
            checksums: Mutex::new(None),
            version: Mutex::new(None),
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    fn archive_exists(&self) -> bool {
        std::fs::metadata(&self.archive_path)
            .map(|m| m.len() > EMPTY_ARCHIVE_SIZE)
            .unwrap_or(false)
    }

    pub async fn build_and_upload(&self) -> Result<()> {
        self.build().await?;
        self.upload().await
    }

    /// Assemble the archive: exported dependencies first, then source files.
    /// Skipped entirely when a previous run left a usable archive for the
    /// same source hash.
    pub async fn build(&self) -> Result<()> {
        if self.archive_exists() {
            info!(archive = %self.archive_path.display(), "Archive already built, skipping");
            return Ok(());
        }

        let config = self.project.config();
        let manager =
            ManagerRegistry::with_defaults().detect(self.project.root(), config.manager);
        let has_deps = if let Some(manager) = manager {
            info!(manager = %manager.id(), "Exporting resolved dependencies");
            let requirements = self.project.requirements_path()?;
            manager.export(self.project.root(), &requirements).await?;
            install_dependencies(self.project, self.runtime, &requirements).await?;
            true
        } else {
            debug!(root = %self.project.root().display(), "No dependency manifest found, packaging source only");
            false
        };

        let prefix = match self.kind {
            Kind::Function => None,
            Kind::Layer => Some(self.runtime.layer_prefix()),
        };
        let mut builder = ArchiveBuilder::create(&self.archive_path, prefix)?;

        if has_deps {
            let deps = self.project.deps_dir()?;
            let filter = if config.slim {
                Some(archive::slim_filter(&deps, &config.slim_patterns)?)
            } else {
                None
            };
            builder.add_dir_contents(&deps, filter.as_ref())?;
        }
        for path in self.project.source().files()? {
            builder.add_file(&path, &relative_name(&path, self.project.root()))?;
        }
        let path = builder.finish()?;

        archive::normalize_entry_modes(&path)?;
        archive::validate_non_empty(&path)?;

        if let Ok(mut checksums) = self.checksums.lock() {
            *checksums = None;
        }
        info!(archive = %path.display(), "Archive built");
        Ok(())
    }

    /// Push the archive and its provenance tags to the store
    pub async fn upload(&self) -> Result<()> {
        let tags = self.provenance_tags().await?;
        let version = self.store.upload(&self.key, &self.archive_path, tags).await?;
        if let Ok(mut slot) = self.version.lock() {
            *slot = version;
        }
        Ok(())
    }

    async fn provenance_tags(&self) -> Result<ObjectTags> {
        let (sha256, md5sum) = self.compute_checksums()?;
        let config = self.project.config();

        let mut tags = ObjectTags::new();
        tags.insert(TAG_CODE_SHA256.to_string(), sha256);
        tags.insert(TAG_MD5_CHECKSUM.to_string(), md5sum);
        tags.insert(TAG_RUNTIME.to_string(), self.runtime.as_str().to_string());
        tags.insert(TAG_SOURCE_HASH.to_string(), self.project.source_hash()?);
        if let Some(license) = &config.license {
            tags.insert(TAG_LICENSE.to_string(), license.clone());
        }
        if let Some(list) = join_tag_list(&config.compatible_architectures) {
            tags.insert(TAG_COMPATIBLE_ARCHITECTURES.to_string(), list);
        }
        if let Some(list) = join_tag_list(&config.compatible_runtimes) {
            tags.insert(TAG_COMPATIBLE_RUNTIMES.to_string(), list);
        }
        Ok(tags)
    }

    /// sha256 (base64, matching the checksum format deployment services
    /// report) and md5 (hex) of the archive, computed once per build
    fn compute_checksums(&self) -> Result<(String, String)> {
        if let Ok(checksums) = self.checksums.lock() {
            if let Some(pair) = checksums.as_ref() {
                return Ok(pair.clone());
            }
        }

        let mut sha256 = Sha256::new();
        let mut md5 = md5::Context::new();
        let mut reader = BufReader::new(File::open(&self.archive_path)?);
        let mut buffer = [0u8; 8192];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            sha256.update(&buffer[..n]);
            md5.consume(&buffer[..n]);
        }
        let pair = (
            BASE64.encode(sha256.finalize()),
            format!("{:x}", md5.compute()),
        );

        if let Ok(mut checksums) = self.checksums.lock() {
            *checksums = Some(pair.clone());
        }
        Ok(pair)
    }
}

#[async_trait]
impl Artifact for LocalPackage<'_> {
    fn key(&self) -> &str {
        &self.key
    }

    fn runtime(&self) -> Runtime {
        self.runtime
    }

    async fn code_sha256(&self) -> Result<String> {
        Ok(self.compute_checksums()?.0)
    }

    async fn md5_checksum(&self) -> Result<String> {
        Ok(self.compute_checksums()?.1)
    }

    async fn descriptor(&self) -> Result<Descriptor> {
        let config = self.project.config();
        let version = self.version.lock().ok().and_then(|slot| slot.clone());
        Ok(Descriptor {
            store: self.store.location(),
            key: self.key.clone(),
            version,
            code_sha256: self.compute_checksums()?.0,
            runtime: self.runtime.as_str().to_string(),
            license: config.license.clone(),
            compatible_architectures: config.compatible_architectures.clone(),
            compatible_runtimes: config.compatible_runtimes.clone(),
        })
    }
}
