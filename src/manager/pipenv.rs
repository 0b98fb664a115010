//! pipenv dependency manager

use async_trait::async_trait;
use std::path::Path;

use super::{require_tool, DependencyManager, ManagerId};
use crate::error::Result;
use crate::exec;

pub struct PipenvManager;

#[async_trait]
impl DependencyManager for PipenvManager {
    fn id(&self) -> ManagerId {
        ManagerId::Pipenv
    }

    fn marker(&self) -> &'static str {
        "Pipfile.lock"
    }

    fn hash_inputs(&self) -> Vec<&'static str> {
        vec!["Pipfile.lock", "Pipfile"]
    }

    // `pipenv requirements` prints to stdout, so the export is captured
    // rather than streamed.
    async fn export(&self, root: &Path, out: &Path) -> Result<()> {
        require_tool("pipenv")?;
        let requirements = exec::run_capture("pipenv", &["requirements"], root).await?;
        std::fs::write(out, requirements)?;
        Ok(())
    }
}
