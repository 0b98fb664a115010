//! uv dependency manager

use async_trait::async_trait;
use std::path::Path;

use super::{require_tool, DependencyManager, ManagerId};
use crate::error::Result;
use crate::exec;

pub struct UvManager;

#[async_trait]
impl DependencyManager for UvManager {
    fn id(&self) -> ManagerId {
        ManagerId::Uv
    }

    fn marker(&self) -> &'static str {
        "uv.lock"
    }

    fn hash_inputs(&self) -> Vec<&'static str> {
        vec!["uv.lock", "pyproject.toml"]
    }

    async fn export(&self, root: &Path, out: &Path) -> Result<()> {
        require_tool("uv")?;
        let out = out.to_string_lossy().into_owned();
        exec::run_streamed(
            "uv",
            &[
                "export",
                "--frozen",
                "--no-dev",
                "--no-hashes",
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
        assert!(!UvManager.detect(dir.path()));
        fs::write(dir.path().join("uv.lock"), "").unwrap();
        assert!(UvManager.detect(dir.path()));
    }
}
