//! Target runtime identifiers
//!
//! A runtime names the interpreter the packaged artifact will execute under.
//! It participates in archive naming, provenance tags, and the selection of
//! the default isolated-build image.

use std::fmt;
use std::str::FromStr;

use crate::error::PackError;

/// Supported Python runtimes, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Runtime {
    Python39,
    Python310,
    Python311,
    Python312,
    Python313,
}

impl Runtime {
    pub const ALL: [Runtime; 5] = [
        Runtime::Python39,
        Runtime::Python310,
        Runtime::Python311,
        Runtime::Python312,
        Runtime::Python313,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Python39 => "python3.9",
            Runtime::Python310 => "python3.10",
            Runtime::Python311 => "python3.11",
            Runtime::Python312 => "python3.12",
            Runtime::Python313 => "python3.13",
        }
    }

    /// Default public build image used when neither a Dockerfile nor an
    /// explicit image reference is configured
    pub fn default_build_image(&self) -> String {
        format!("public.ecr.aws/sam/build-{}:latest", self.as_str())
    }

    /// Subdirectory prefix inserted ahead of every entry when packaging with
    /// the layer layout
    pub fn layer_prefix(&self) -> &'static str {
        "python"
    }

    /// Parse interpreter version output, e.g. "Python 3.11.9"
    pub fn from_interpreter_version(output: &str) -> Option<Runtime> {
        let version = output.trim().strip_prefix("Python ")?;
        let mut parts = version.split('.');
        let major: u32 = parts.next()?.parse().ok()?;
        let minor: u32 = parts.next()?.parse().ok()?;
        if major != 3 {
            return None;
        }
        match minor {
            9 => Some(Runtime::Python39),
            10 => Some(Runtime::Python310),
            11 => Some(Runtime::Python311),
            12 => Some(Runtime::Python312),
            13 => Some(Runtime::Python313),
            _ => None,
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runtime {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Runtime::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| {
                PackError::Configuration(format!(
                    "Unknown runtime '{}'. Valid options: {}",
                    s,
                    Runtime::ALL
                        .iter()
                        .map(|r| r.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for runtime in Runtime::ALL {
            assert_eq!(runtime.as_str().parse::<Runtime>().unwrap(), runtime);
        }
    }

    #[test]
    fn test_unknown_runtime_is_configuration_error() {
        let err = "python2.7".parse::<Runtime>().unwrap_err();
        assert!(matches!(err, PackError::Configuration(_)));
    }

    #[test]
    fn test_from_interpreter_version() {
        assert_eq!(
            Runtime::from_interpreter_version("Python 3.11.9\n"),
            Some(Runtime::Python311)
        );
        assert_eq!(
            Runtime::from_interpreter_version("Python 3.13.0"),
            Some(Runtime::Python313)
        );
        assert_eq!(Runtime::from_interpreter_version("Python 2.7.18"), None);
        assert_eq!(Runtime::from_interpreter_version("garbage"), None);
    }

    #[test]
    fn test_default_build_image() {
        assert_eq!(
            Runtime::Python310.default_build_image(),
            "public.ecr.aws/sam/build-python3.10:latest"
        );
    }
}
