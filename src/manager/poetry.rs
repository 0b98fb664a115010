//! poetry dependency manager

use async_trait::async_trait;
use std::path::Path;

use super::{require_tool, DependencyManager, ManagerId};
use crate::error::Result;
use crate::exec;

pub struct PoetryManager;

#[async_trait]
impl DependencyManager for PoetryManager {
    fn id(&self) -> ManagerId {
        ManagerId::Poetry
    }

    fn marker(&self) -> &'static str {
        "poetry.lock"
    }

    fn hash_inputs(&self) -> Vec<&'static str> {
        vec!["poetry.lock", "pyproject.toml"]
    }

    async fn export(&self, root: &Path, out: &Path) -> Result<()> {
        require_tool("poetry")?;
        let out = out.to_string_lossy().into_owned();
        exec::run_streamed(
            "poetry",
            &[
                "export",
                "-f",
                "requirements.txt",
                "--without-hashes",
                "-o",
                &out,
            ],
            root,
            &[],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detects_lockfile() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pyproject.toml"), "[tool.poetry]").unwrap();
        // pyproject alone is not enough; the lockfile is the marker
        assert!(!PoetryManager.detect(dir.path()));
        fs::write(dir.path().join("poetry.lock"), "").unwrap();
        assert!(PoetryManager.detect(dir.path()));
    }
}
