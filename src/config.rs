//! Build configuration
//!
//! Loads settings from `PACKBOX_*` environment variables with sensible
//! defaults; the CLI layer overrides individual fields on top of that.
//!
//! # Environment Variables
//!
//! - `PACKBOX_RUNTIME`: target runtime, e.g. "python3.11"
//! - `PACKBOX_MANAGER`: dependency manager (auto|uv|poetry|pipenv|pip) - default: "auto"
//! - `PACKBOX_IGNORE`: extra ignore rules, comma-separated
//! - `PACKBOX_SLIM`: strip bytecode and caches from the archive - default: "true"
//! - `PACKBOX_DOCKER`: install dependencies in an isolated container - default: "false"
//! - `PACKBOX_DOCKERFILE`: path to a Dockerfile for the build image
//! - `PACKBOX_IMAGE`: explicit build image reference
//! - `PACKBOX_ENV_PREFIXES`: env prefixes passed into the container - default: "PIP_,PACKBOX_"
//! - `PACKBOX_CACHE_ENABLED`: keep a dependency download cache - default: "true"
//! - `PACKBOX_WORK_DIR`: working directory root - default: system temp dir + "packbox"
//! - `PACKBOX_STORE_PREFIX`: purpose prefix for object keys - default: "packages"
//! - `PACKBOX_OBJECT_PREFIX`: optional extra key prefix
//! - `PACKBOX_LICENSE`, `PACKBOX_COMPATIBLE_RUNTIMES`, `PACKBOX_COMPATIBLE_ARCHITECTURES`:
//!   provenance metadata attached to uploaded artifacts

use std::env;
use std::path::PathBuf;

use crate::error::{PackError, Result};
use crate::manager::ManagerPreference;
use crate::runtime::Runtime;

const DEFAULT_STORE_PREFIX: &str = "packages";
const DEFAULT_ENV_PREFIXES: [&str; 2] = ["PIP_", "PACKBOX_"];
const DEFAULT_SLIM_PATTERNS: [&str; 3] = ["**/__pycache__/**", "*.pyc", "*.pyo"];

/// Parameters for one packaging invocation
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Target runtime; when unset, detected from the local interpreter
    pub runtime: Option<Runtime>,

    /// Dependency-manager preference (auto-detect by default)
    pub manager: ManagerPreference,

    /// Extra gitignore-style rules applied on top of on-disk ignore files
    pub extra_ignores: Vec<String>,

    /// Strip bytecode and cache directories from the packaged dependencies
    pub slim: bool,

    /// Patterns the slim filter excludes from packaged dependencies
    pub slim_patterns: Vec<String>,

    /// Install dependencies inside a throwaway container
    pub docker_enabled: bool,

    /// Dockerfile used to build the isolated-build image (wins over `image`)
    pub dockerfile: Option<PathBuf>,

    /// Explicit isolated-build image reference
    pub image: Option<String>,

    /// Only ambient env vars matching these prefixes reach the container
    pub env_prefixes: Vec<String>,

    /// Keep a dependency download cache between builds
    pub cache_enabled: bool,

    /// Root for transient build directories
    pub work_root: PathBuf,

    /// Purpose prefix for object-store keys
    pub store_prefix: String,

    /// Optional extra prefix between the usage kind and the object name
    pub object_prefix: Option<String>,

    /// License identifier recorded in provenance tags
    pub license: Option<String>,

    /// Runtimes a layer artifact is compatible with
    pub compatible_runtimes: Vec<String>,

    /// Architectures the artifact is compatible with
    pub compatible_architectures: Vec<String>,
}

impl Default for BuildConfig {
    /// Creates a configuration by loading `PACKBOX_*` environment variables,
    /// falling back to defaults for anything unset.
    fn default() -> Self {
        let runtime = env::var("PACKBOX_RUNTIME").ok().and_then(|s| s.parse().ok());

        let manager = env::var("PACKBOX_MANAGER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let work_root = env::var("PACKBOX_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("packbox"));

        Self {
            runtime,
            manager,
            extra_ignores: read_list("PACKBOX_IGNORE"),
            slim: read_bool("PACKBOX_SLIM", true),
            slim_patterns: DEFAULT_SLIM_PATTERNS.iter().map(|s| s.to_string()).collect(),
            docker_enabled: read_bool("PACKBOX_DOCKER", false),
            dockerfile: env::var("PACKBOX_DOCKERFILE").ok().map(PathBuf::from),
            image: env::var("PACKBOX_IMAGE").ok(),
            env_prefixes: {
                let prefixes = read_list("PACKBOX_ENV_PREFIXES");
                if prefixes.is_empty() {
                    DEFAULT_ENV_PREFIXES.iter().map(|s| s.to_string()).collect()
                } else {
                    prefixes
                }
            },
            cache_enabled: read_bool("PACKBOX_CACHE_ENABLED", true),
            work_root,
            store_prefix: env::var("PACKBOX_STORE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_STORE_PREFIX.to_string()),
            object_prefix: env::var("PACKBOX_OBJECT_PREFIX").ok(),
            license: env::var("PACKBOX_LICENSE").ok(),
            compatible_runtimes: read_list("PACKBOX_COMPATIBLE_RUNTIMES"),
            compatible_architectures: read_list("PACKBOX_COMPATIBLE_ARCHITECTURES"),
        }
    }
}

impl BuildConfig {
    /// Check for missing or mutually exclusive options before any work starts
    pub fn validate(&self) -> Result<()> {
        if self.dockerfile.is_some() && self.image.is_some() {
            return Err(PackError::Configuration(
                "PACKBOX_DOCKERFILE and PACKBOX_IMAGE are mutually exclusive".to_string(),
            ));
        }

        if let Some(dockerfile) = &self.dockerfile {
            if !dockerfile.is_file() {
                return Err(PackError::Configuration(format!(
                    "Dockerfile not found: {}",
                    dockerfile.display()
                )));
            }
        }

        if self.docker_enabled
            && self.runtime.is_none()
            && self.image.is_none()
            && self.dockerfile.is_none()
        {
            return Err(PackError::Configuration(
                "Isolated building needs a runtime, an image reference, or a Dockerfile"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

fn read_bool(var: &str, default: bool) -> bool {
    env::var(var)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn read_list(var: &str) -> Vec<String> {
    env::var(var)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
