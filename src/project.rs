//! Project: one source root plus its build-time directories
//!
//! A project is constructed once per build invocation. The build directory
//! name embeds the source hash so two distinct source trees with the same
//! directory name never collide under the shared work root. All derived
//! directories are lazy and memoized; `cleanup` is best-effort by contract.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::BuildConfig;
use crate::error::{PackError, Result};
use crate::manager::ManagerRegistry;
use crate::source::SourceCode;

pub struct Project {
    root: PathBuf,
    root_name: String,
    config: BuildConfig,
    source: SourceCode,
    build_dir: OnceLock<PathBuf>,
}

impl Project {
    pub fn new(root: PathBuf, config: BuildConfig) -> Result<Self> {
        config.validate()?;

        if !root.is_dir() {
            return Err(PackError::Configuration(format!(
                "Project root is not a directory: {}",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());

        let mut source = SourceCode::new(root.clone(), root.clone())
            .with_extra_ignores(config.extra_ignores.clone());
        // Lockfiles always feed the hash, packaged or not
        for marker in ManagerRegistry::with_defaults().hash_inputs() {
            let path = root.join(marker);
            if path.is_file() {
                source.pin(path);
            }
        }

        Ok(Self {
            root,
            root_name,
            config,
            source,
            build_dir: OnceLock::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn source(&self) -> &SourceCode {
        &self.source
    }

    pub fn source_hash(&self) -> Result<String> {
        self.source.hash()
    }

    /// Transient build directory, `<work_root>/<root-name>.<source-hash>`
    pub fn build_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = self.build_dir.get() {
            return Ok(dir.clone());
        }
        let dir = self
            .config
            .work_root
            .join(format!("{}.{}", self.root_name, self.source_hash()?));
        std::fs::create_dir_all(&dir)?;
        Ok(self.build_dir.get_or_init(|| dir).clone())
    }

    /// Dependency installation target inside the build directory
    pub fn deps_dir(&self) -> Result<PathBuf> {
        let dir = self.build_dir()?.join("deps");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Transient path for the exported requirements manifest, scoped by the
    /// source hash to avoid collisions across builds
    pub fn requirements_path(&self) -> Result<PathBuf> {
        Ok(self
            .build_dir()?
            .join(format!("requirements.{}.txt", self.source_hash()?)))
    }

    /// Shared dependency download cache, `None` when caching is disabled
    pub fn cache_dir(&self) -> Result<Option<PathBuf>> {
        if !self.config.cache_enabled {
            return Ok(None);
        }
        let dir = self.config.work_root.join("cache");
        std::fs::create_dir_all(&dir)?;
        Ok(Some(dir))
    }

    /// Remove transient directories after a completed build. Failures are
    /// logged, never raised.
    pub fn cleanup(&self) {
        if let Some(dir) = self.build_dir.get() {
            debug!(dir = %dir.display(), "Removing build directory");
            if let Err(e) = std::fs::remove_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to remove build directory");
            }
        }
    }

    /// Best-effort cleanup on the failure path; must never mask the
    /// original error.
    pub fn cleanup_on_error(&self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn test_config(work: &TempDir) -> BuildConfig {
        for (key, _) in env::vars() {
            if key.starts_with("PACKBOX_") {
                env::remove_var(key);
            }
        }
        BuildConfig {
            work_root: work.path().to_path_buf(),
            ..BuildConfig::default()
        }
    }

    #[test]
    #[serial]
    fn test_build_dir_embeds_name_and_hash() {
        let work = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("app.py"), "print('hi')").unwrap();

        let project = Project::new(src.path().to_path_buf(), test_config(&work)).unwrap();
        let build_dir = project.build_dir().unwrap();
        let hash = project.source_hash().unwrap();

        let dir_name = build_dir.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(dir_name, format!("{}.{}", project.root_name(), hash));
        assert!(build_dir.is_dir());
    }

    #[test]
    #[serial]
    fn test_lockfile_pinned_into_hash() {
        let work = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("app.py"), "print('hi')").unwrap();
        fs::write(src.path().join("uv.lock"), "lock-v1").unwrap();

        let before = Project::new(src.path().to_path_buf(), test_config(&work))
            .unwrap()
            .source_hash()
            .unwrap();

        fs::write(src.path().join("uv.lock"), "lock-v2").unwrap();
        let after = Project::new(src.path().to_path_buf(), test_config(&work))
            .unwrap()
            .source_hash()
            .unwrap();

        assert_ne!(before, after);
    }

    #[test]
    #[serial]
    fn test_missing_root_rejected() {
        let work = TempDir::new().unwrap();
        let result = Project::new(PathBuf::from("/nonexistent/path"), test_config(&work));
        assert!(matches!(result, Err(PackError::Configuration(_))));
    }

    #[test]
    #[serial]
    fn test_cleanup_removes_build_dir() {
        let work = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("app.py"), "print('hi')").unwrap();

        let project = Project::new(src.path().to_path_buf(), test_config(&work)).unwrap();
        let build_dir = project.build_dir().unwrap();
        assert!(build_dir.is_dir());

        project.cleanup();
        assert!(!build_dir.exists());

        // A second cleanup is harmless
        project.cleanup();
    }
}
