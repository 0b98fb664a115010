//! Error taxonomy for the packaging pipeline
//!
//! Every error here is fatal for the build that raised it; the pipeline never
//! continues in a degraded state. The only exception is cleanup, whose own
//! failures are logged and dropped so they never mask the original error.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the crate
pub type Result<T, E = PackError> = std::result::Result<T, E>;

/// Top-level error type for packaging operations
#[derive(Debug, Error)]
pub enum PackError {
    /// Required build inputs missing or mutually exclusive options both set
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Declared runtime disagrees with the runtime the installer detected
    #[error("Declared runtime '{declared}' does not match detected runtime '{detected}'")]
    RuntimeMismatch { declared: String, detected: String },

    /// A build produced zero usable content
    #[error("Archive {0} is empty; check the source directory and ignore rules")]
    EmptyArtifact(PathBuf),

    /// A stored object exists but lacks an expected provenance tag
    #[error("Object '{key}' is missing required provenance tag '{tag}'")]
    MissingProvenance { key: String, tag: String },

    /// Object store access failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The isolated builder's container runtime is unreachable or misconfigured
    #[error("Build environment unavailable: {0}")]
    BuildEnvironment(String),

    /// A dependency-manager or container command exited non-zero
    #[error("Command `{command}` exited with status {status}:\n{output}")]
    CommandFailure {
        command: String,
        status: i32,
        output: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Object-store access failures, split by how the caller should react:
/// `NotFound` triggers a fresh build, `AccessDenied` is a permissions
/// misconfiguration, `Transient` should be retried by the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied for object: {0}")]
    AccessDenied(String),

    #[error("Transient store failure: {0}")]
    Transient(String),
}

impl StoreError {
    /// True when the error means "build needed" rather than a hard failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_mismatch_display() {
        let err = PackError::RuntimeMismatch {
            declared: "python3.11".to_string(),
            detected: "python3.10".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("python3.11"));
        assert!(msg.contains("python3.10"));
    }

    #[test]
    fn test_missing_provenance_names_tag() {
        let err = PackError::MissingProvenance {
            key: "packages/functions/app.abc.zip".to_string(),
            tag: "code_sha256".to_string(),
        };
        assert!(err.to_string().contains("code_sha256"));
    }

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::NotFound("k".into()).is_not_found());
        assert!(!StoreError::AccessDenied("k".into()).is_not_found());
        assert!(!StoreError::Transient("k".into()).is_not_found());
    }
}
