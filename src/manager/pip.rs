//! Plain requirements fallback
//!
//! The last stop in the cascade: no lockfile, just a requirements.txt that
//! is already in the normalized format, so export is a copy.

use async_trait::async_trait;
use std::path::Path;

use super::{DependencyManager, ManagerId};
use crate::error::Result;

pub struct PipManager;

#[async_trait]
impl DependencyManager for PipManager {
    fn id(&self) -> ManagerId {
        ManagerId::Pip
    }

    fn marker(&self) -> &'static str {
        "requirements.txt"
    }

    async fn export(&self, root: &Path, out: &Path) -> Result<()> {
        std::fs::copy(root.join(self.marker()), out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detects_requirements() {
        let dir = TempDir::new().unwrap();
        assert!(!PipManager.detect(dir.path()));
        fs::write(dir.path().join("requirements.txt"), "requests==2.31\n").unwrap();
        assert!(PipManager.detect(dir.path()));
    }

    #[tokio::test]
    async fn test_export_copies_requirements() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("requirements.txt"), "requests==2.31\n").unwrap();
        let out = dir.path().join("out.txt");

        PipManager.export(dir.path(), &out).await.unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "requests==2.31\n");
    }
}
