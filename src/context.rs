//! Build context and the exclusive build-output directory.
//!
//! Every native or container build writes into one shared build directory.
//! [`BuildDirLease`] makes ownership of that directory explicit: acquiring it
//! takes an advisory lock and clears the directory, and the produced binary
//! stays readable after the lease drops until the next acquisition.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fallback parallelism when the CPU count cannot be detected.
const FALLBACK_JOBS: usize = 4;

/// Everything a builder needs to run one build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Source checkout the build command runs in.
    pub work_dir: PathBuf,
    /// Build-output directory, cleared before each build.
    pub build_dir: PathBuf,
    /// Expected binary, relative to `work_dir`.
    pub artifact_path: PathBuf,
    /// Base name used for the published artifact.
    pub artifact_name: String,
    /// Build command argv; `{jobs}` is replaced by the parallelism hint.
    pub build_command: Vec<String>,
    /// Static environment overrides for every build.
    pub env: BTreeMap<String, String>,
    /// Parallelism hint for a single compile job.
    pub jobs: usize,
    /// Stream build output to the terminal instead of capturing it.
    pub interactive: bool,
}

impl BuildContext {
    pub fn new(
        work_dir: PathBuf,
        build_dir: PathBuf,
        artifact_path: PathBuf,
        artifact_name: impl Into<String>,
        build_command: Vec<String>,
    ) -> Self {
        Self {
            work_dir,
            build_dir,
            artifact_path,
            artifact_name: artifact_name.into(),
            build_command,
            env: BTreeMap::new(),
            jobs: default_jobs(),
            interactive: false,
        }
    }

    /// Absolute path where a finished build leaves the binary.
    pub fn expected_artifact(&self) -> PathBuf {
        self.work_dir.join(&self.artifact_path)
    }

    /// Delete a binary left at the expected path by an earlier build.
    ///
    /// The lease only clears the build directory; this also covers an
    /// artifact path outside it.
    pub fn remove_stale_artifact(&self) -> Result<()> {
        let binary = self.expected_artifact();
        match fs::remove_file(&binary) {
            Ok(()) => {
                debug!(binary = %binary.display(), "removed stale binary");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing stale binary '{}'", binary.display())),
        }
    }

    /// Build directory relative to `work_dir`, when it lives inside it.
    pub fn build_dir_in_work_dir(&self) -> Option<&Path> {
        self.build_dir.strip_prefix(&self.work_dir).ok()
    }

    /// Build command argv with the parallelism hint substituted.
    pub fn resolved_build_command(&self) -> Vec<String> {
        let jobs = self.jobs.to_string();
        self.build_command
            .iter()
            .map(|arg| arg.replace("{jobs}", &jobs))
            .collect()
    }
}

/// Available parallelism, or a fixed fallback.
pub fn default_jobs() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            warn!("could not detect CPU count ({e}), using {FALLBACK_JOBS} jobs");
            FALLBACK_JOBS
        }
    }
}

/// Exclusive, freshly cleared build directory.
///
/// The lock lives in a hidden `.<name>.lock` file beside the directory so clearing the
/// directory never touches it.
#[derive(Debug)]
pub struct BuildDirLease {
    file: File,
    lock_path: PathBuf,
}

impl BuildDirLease {
    pub fn acquire(build_dir: &Path) -> Result<Self> {
        let lock_path = lock_path_for(build_dir)?;
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }

        // Never unlink the lock file while another holder may have it open:
        // a second process could then lock a fresh inode at the same path.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("opening build lock '{}'", lock_path.display()))?;

        if file.try_lock_exclusive().is_err() {
            bail!(
                "build directory '{}' is locked by another build ({})",
                build_dir.display(),
                lock_path.display()
            );
        }

        if build_dir.exists() {
            fs::remove_dir_all(build_dir).with_context(|| {
                format!("clearing build directory '{}'", build_dir.display())
            })?;
        }
        fs::create_dir_all(build_dir)
            .with_context(|| format!("creating build directory '{}'", build_dir.display()))?;
        debug!(dir = %build_dir.display(), "build directory leased");

        Ok(Self { file, lock_path })
    }
}

impl Drop for BuildDirLease {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!(lock = %self.lock_path.display(), "build directory released");
    }
}

fn lock_path_for(build_dir: &Path) -> Result<PathBuf> {
    let Some(name) = build_dir.file_name().and_then(|n| n.to_str()) else {
        bail!(
            "build directory '{}' has no usable final component",
            build_dir.display()
        );
    };
    Ok(build_dir.with_file_name(format!(".{name}.lock")))
}
