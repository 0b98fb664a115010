//! Source tree enumeration and content hashing
//!
//! A [`SourceCode`] wraps one directory destined for packaging. Enumeration
//! honors gitignore-style rules from on-disk `.packboxignore` files plus
//! caller-supplied extra rules; version-control metadata and the ignore file
//! itself are always excluded. The content hash is a pure function of
//! (relative path, content) pairs, processed in path-sorted order so callers
//! never depend on walk order. Files pinned via [`SourceCode::pin`] feed the
//! hash even when the filter excludes them from packaging, keyed relative to
//! the project boundary so the digest stays stable for out-of-root metadata.

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::Result;

/// Ignore file consulted in every directory under the source root
pub const IGNORE_FILE: &str = ".packboxignore";

/// One directory to be hashed and packaged
pub struct SourceCode {
    root: PathBuf,
    boundary: PathBuf,
    extra_ignores: Vec<String>,
    pinned: Vec<PathBuf>,
    hash: OnceLock<String>,
}

impl SourceCode {
    /// `root` is the directory being packaged; `boundary` anchors relative
    /// names for pinned files that may live outside `root`.
    pub fn new(root: PathBuf, boundary: PathBuf) -> Self {
        Self {
            root,
            boundary,
            extra_ignores: Vec::new(),
            pinned: Vec::new(),
            hash: OnceLock::new(),
        }
    }

    pub fn with_extra_ignores(mut self, rules: Vec<String>) -> Self {
        self.extra_ignores = rules;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pin a file into the hash input regardless of ignore rules. Lockfiles
    /// go through here so a dependency-only change invalidates the cache.
    pub fn pin(&mut self, path: PathBuf) {
        if !self.pinned.contains(&path) {
            self.pinned.push(path);
        }
    }

    /// Included files, sorted by relative path. Finite and restartable; each
    /// call walks the tree afresh.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut override_builder = OverrideBuilder::new(&self.root);
        for rule in std::iter::once(".git/")
            .chain(std::iter::once(IGNORE_FILE))
            .chain(self.extra_ignores.iter().map(String::as_str))
        {
            override_builder
                .add(&format!("!{}", rule))
                .map_err(|e| std::io::Error::other(format!("Invalid ignore rule '{rule}': {e}")))?;
        }
        let overrides = override_builder
            .build()
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .add_custom_ignore_filename(IGNORE_FILE)
            .overrides(overrides)
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = result.map_err(|e| std::io::Error::other(e.to_string()))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.into_path());
            }
        }
        files.sort_by_key(|p| relative_name(p, &self.root));
        Ok(files)
    }

    /// Deterministic sha256 over every included file plus pinned files.
    /// Computed once and memoized.
    pub fn hash(&self) -> Result<String> {
        if let Some(hash) = self.hash.get() {
            return Ok(hash.clone());
        }
        let computed = self.compute_hash()?;
        Ok(self.hash.get_or_init(|| computed).clone())
    }

    fn compute_hash(&self) -> Result<String> {
        let mut hasher = Sha256::new();

        for path in self.files()? {
            feed_file(&mut hasher, &relative_name(&path, &self.root), &path)?;
        }

        let mut pinned = self.pinned.clone();
        pinned.sort_by_key(|p| relative_name(p, &self.boundary));
        for path in pinned {
            if !path.is_file() {
                continue;
            }
            feed_file(&mut hasher, &relative_name(&path, &self.boundary), &path)?;
        }

        let hash = hex::encode(hasher.finalize());
        debug!(root = %self.root.display(), hash = %hash, "Source hash computed");
        Ok(hash)
    }
}

/// Relative path as a stable, '/'-separated string
pub fn relative_name(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn feed_file(hasher: &mut Sha256, rel_name: &str, path: &Path) -> Result<()> {
    hasher.update(rel_name.as_bytes());
    hasher.update([0u8]);

    let mut reader = BufReader::new(File::open(path)?);
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    hasher.update([0u8]);
    Ok(())
}
