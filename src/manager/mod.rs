//! Dependency-manager detection and export
//!
//! Managers are first-class entities evaluated in a fixed priority order:
//! lock-based managers first (uv, poetry, pipenv), plain requirements last.
//! Each manager knows its marker file and how to export a normalized
//! requirements manifest by invoking its own CLI. Detection is side-effect
//! free; export writes to a caller-chosen transient path.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::error::{PackError, Result};

pub mod pip;
pub mod pipenv;
pub mod poetry;
pub mod uv;

pub use pip::PipManager;
pub use pipenv::PipenvManager;
pub use poetry::PoetryManager;
pub use uv::UvManager;

/// Known dependency managers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerId {
    Uv,
    Poetry,
    Pipenv,
    Pip,
}

impl ManagerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerId::Uv => "uv",
            ManagerId::Poetry => "poetry",
            ManagerId::Pipenv => "pipenv",
            ManagerId::Pip => "pip",
        }
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagerId {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uv" => Ok(ManagerId::Uv),
            "poetry" => Ok(ManagerId::Poetry),
            "pipenv" => Ok(ManagerId::Pipenv),
            "pip" => Ok(ManagerId::Pip),
            other => Err(PackError::Configuration(format!(
                "Unknown dependency manager '{other}'. Valid options: uv, poetry, pipenv, pip"
            ))),
        }
    }
}

/// Auto-detect through the cascade, or force a specific manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerPreference {
    #[default]
    Auto,
    Force(ManagerId),
}

impl FromStr for ManagerPreference {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(ManagerPreference::Auto)
        } else {
            Ok(ManagerPreference::Force(s.parse()?))
        }
    }
}

/// One dependency-manager strategy: a marker-file check plus an export
/// command normalizing to the requirements format
#[async_trait]
pub trait DependencyManager: Send + Sync {
    fn id(&self) -> ManagerId;

    /// Marker file whose presence selects this manager
    fn marker(&self) -> &'static str;

    /// Files that must influence the source hash even when excluded from
    /// packaging (lockfiles and their companions)
    fn hash_inputs(&self) -> Vec<&'static str> {
        vec![self.marker()]
    }

    fn detect(&self, root: &Path) -> bool {
        root.join(self.marker()).is_file()
    }

    /// Export the resolved dependency set as a requirements file at `out`
    async fn export(&self, root: &Path, out: &Path) -> Result<()>;
}

/// Ordered registry of managers, most specific first
#[derive(Clone)]
pub struct ManagerRegistry {
    managers: Vec<Arc<dyn DependencyManager>>,
}

impl ManagerRegistry {
    pub fn with_defaults() -> Self {
        Self {
            managers: vec![
                Arc::new(UvManager),
                Arc::new(PoetryManager),
                Arc::new(PipenvManager),
                Arc::new(PipManager),
            ],
        }
    }

    pub fn get(&self, id: ManagerId) -> Option<Arc<dyn DependencyManager>> {
        self.managers.iter().find(|m| m.id() == id).cloned()
    }

    /// Walk the cascade in priority order; `None` means no dependency marker
    /// was found and installation is a no-op.
    pub fn detect(
        &self,
        root: &Path,
        preference: ManagerPreference,
    ) -> Option<Arc<dyn DependencyManager>> {
        let found = match preference {
            ManagerPreference::Force(id) => self.get(id),
            ManagerPreference::Auto => self.managers.iter().find(|m| m.detect(root)).cloned(),
        };
        if let Some(manager) = &found {
            debug!(manager = %manager.id(), root = %root.display(), "Dependency manager selected");
        }
        found
    }

    /// Union of every manager's hash inputs, in cascade order
    pub fn hash_inputs(&self) -> Vec<&'static str> {
        let mut inputs = Vec::new();
        for manager in &self.managers {
            for file in manager.hash_inputs() {
                if !inputs.contains(&file) {
                    inputs.push(file);
                }
            }
        }
        inputs
    }
}

/// Resolve a manager executable, failing with a configuration error that
/// names the missing tool
pub(crate) fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| {
        PackError::Configuration(format!("'{name}' executable not found on PATH"))
    })
}
