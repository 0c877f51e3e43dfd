//! Per-target builds.
//!
//! - [`native`] - build command on the host, cross-compiling within an OS family
//! - [`container`] - build command inside an architecture-pinned linux container
//! - [`cross`] - toolchain overrides for same-OS, different-arch native builds
//!
//! Builders never return `Err`: every failure becomes a [`BuildResult`] with a
//! [`BuildError`] so the batch keeps going.

pub mod container;
pub mod cross;
pub mod native;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::platform::PlatformIdentifier;
use crate::registry::BuildStrategy;

pub use container::ContainerBuilder;
pub use cross::CrossCompileParameters;
pub use native::NativeBuilder;

/// Why a target did not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// No viable strategy for this target on this host.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A required external tool is absent.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The build command ran but exited non-zero or left no binary.
    #[error("build failed: {0}")]
    BuildFailure(String),

    /// A binary reported as built could not be read or packaged.
    #[error("artifact I/O failed: {0}")]
    IoFailure(String),

    /// Remote sync or permission grant failed.
    #[error("publish failed: {0}")]
    PublishFailure(String),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::Unsupported(_) => ErrorKind::Unsupported,
            BuildError::MissingDependency(_) => ErrorKind::MissingDependency,
            BuildError::BuildFailure(_) => ErrorKind::BuildFailure,
            BuildError::IoFailure(_) => ErrorKind::IoFailure,
            BuildError::PublishFailure(_) => ErrorKind::PublishFailure,
        }
    }

    pub fn diagnostic(&self) -> &str {
        match self {
            BuildError::Unsupported(d)
            | BuildError::MissingDependency(d)
            | BuildError::BuildFailure(d)
            | BuildError::IoFailure(d)
            | BuildError::PublishFailure(d) => d,
        }
    }
}

/// Discriminant of [`BuildError`] for summaries and the run manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unsupported,
    MissingDependency,
    BuildFailure,
    IoFailure,
    PublishFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::MissingDependency => "missing dependency",
            ErrorKind::BuildFailure => "build failure",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::PublishFailure => "publish failure",
        })
    }
}

/// Success carries the path of the produced binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success { binary: PathBuf },
    Failure(BuildError),
}

/// Outcome of building one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub platform: PlatformIdentifier,
    pub strategy: BuildStrategy,
    pub outcome: BuildOutcome,
}

impl BuildResult {
    pub fn success(platform: PlatformIdentifier, strategy: BuildStrategy, binary: PathBuf) -> Self {
        Self {
            platform,
            strategy,
            outcome: BuildOutcome::Success { binary },
        }
    }

    pub fn failure(platform: PlatformIdentifier, strategy: BuildStrategy, error: BuildError) -> Self {
        Self {
            platform,
            strategy,
            outcome: BuildOutcome::Failure(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BuildOutcome::Success { .. })
    }

    /// Produced binary, if the build succeeded.
    pub fn binary(&self) -> Option<&Path> {
        match &self.outcome {
            BuildOutcome::Success { binary } => Some(binary),
            BuildOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BuildError> {
        match &self.outcome {
            BuildOutcome::Success { .. } => None,
            BuildOutcome::Failure(e) => Some(e),
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            BuildOutcome::Success { .. } => write!(f, "{} ok ({})", self.platform, self.strategy),
            BuildOutcome::Failure(e) => write!(f, "{} FAILED ({}): {}", self.platform, self.strategy, e),
        }
    }
}

/// Render an `anyhow` chain on one line for a diagnostic.
pub(crate) fn chain_message(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
