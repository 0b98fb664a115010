//! Zip assembly
//!
//! Builds the deployment archive from installed dependencies and source
//! files. Entry order is path-sorted for reproducibility. After all writes,
//! a normalization pass over the archive's entry list collapses stored
//! permission bits to 0755 (owner-execute set) or 0644 (everything else).
//! An archive no larger than the bare zip end-of-central-directory record
//! is treated as empty and removed.

use ignore::overrides::{Override, OverrideBuilder};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{PackError, Result};
use crate::source::relative_name;

/// Size of a valid but content-free zip: just the end-of-central-directory
/// record
pub const EMPTY_ARCHIVE_SIZE: u64 = 22;

const OWNER_EXECUTE: u32 = 0o100;

/// Incremental zip writer with an optional fixed entry-name prefix
/// (the layer layout inserts one directory level ahead of every entry)
pub struct ArchiveBuilder {
    path: PathBuf,
    prefix: Option<String>,
    writer: ZipWriter<File>,
}

impl ArchiveBuilder {
    pub fn create(path: &Path, prefix: Option<&str>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            prefix: prefix.map(|p| p.to_string()),
            writer: ZipWriter::new(File::create(path)?),
        })
    }

    /// Add one on-disk file under `entry_name` ('/'-separated, prefix applied
    /// here). The stored mode mirrors the on-disk mode; normalization runs
    /// as a separate pass once the archive is complete.
    pub fn add_file(&mut self, disk: &Path, entry_name: &str) -> Result<()> {
        let name = match &self.prefix {
            Some(prefix) => format!("{prefix}/{entry_name}"),
            None => entry_name.to_string(),
        };
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(disk_mode(disk)?);
        self.writer.start_file(name, options)?;
        let mut file = File::open(disk)?;
        std::io::copy(&mut file, &mut self.writer)?;
        Ok(())
    }

    /// Add every file under `dir`, path-sorted, skipping entries the slim
    /// filter matches
    pub fn add_dir_contents(&mut self, dir: &Path, slim: Option<&Override>) -> Result<()> {
        for path in walk_sorted(dir)? {
            if let Some(filter) = slim {
                if filter.matched(&path, false).is_ignore() {
                    continue;
                }
            }
            self.add_file(&path, &relative_name(&path, dir))?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.finish()?;
        Ok(self.path)
    }
}

/// Build the slim filter from gitignore-style exclusion patterns
pub fn slim_filter(root: &Path, patterns: &[String]) -> Result<Override> {
    let mut builder = OverrideBuilder::new(root);
    for pattern in patterns {
        builder
            .add(&format!("!{pattern}"))
            .map_err(|e| PackError::Configuration(format!("Invalid slim pattern '{pattern}': {e}")))?;
    }
    builder
        .build()
        .map_err(|e| PackError::Configuration(e.to_string()))
}

/// Normalization pass over the finished archive's entry list: owner-execute
/// becomes 0755, everything else 0644. No-op when every entry already
/// carries its normalized mode.
pub fn normalize_entry_modes(path: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut entries = Vec::with_capacity(archive.len());
    let mut dirty = false;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mode = entry.unix_mode().unwrap_or(0o644) & 0o777;
        let normalized = if mode & OWNER_EXECUTE != 0 { 0o755 } else { 0o644 };
        if mode != normalized {
            dirty = true;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        entries.push((name, normalized, bytes));
    }
    drop(archive);

    if !dirty {
        return Ok(());
    }
    debug!(path = %path.display(), "Normalizing archive entry modes");

    let tmp = path.with_extension("zip.tmp");
    let mut writer = ZipWriter::new(File::create(&tmp)?);
    for (name, mode, bytes) in entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode);
        writer.start_file(name, options)?;
        writer.write_all(&bytes)?;
    }
    writer.finish()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reject archives with no usable content, deleting the file so a broken
/// build never looks valid on a later existence check
pub fn validate_non_empty(path: &Path) -> Result<()> {
    let size = fs::metadata(path)?.len();
    if size <= EMPTY_ARCHIVE_SIZE {
        fs::remove_file(path)?;
        return Err(PackError::EmptyArtifact(path.to_path_buf()));
    }
    Ok(())
}

fn walk_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort_by_key(|p| relative_name(p, dir));
    Ok(files)
}

#[cfg(unix)]
fn disk_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn disk_mode(_path: &Path) -> Result<u32> {
    Ok(0o644)
}
