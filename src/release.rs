//! End-to-end release: select targets, build each, package successes, write
//! the manifest, publish.
//!
//! Only setup problems (bad version tag, unwritable output root, missing
//! destination) return `Err`. Once building starts, per-target, manifest and
//! publish failures are reported in the [`ReleaseReport`].

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::batch::{run_all_with, summary_lines, BatchSummary, ResultMap};
use crate::build::container::ContainerSettings;
use crate::build::{BuildError, ContainerBuilder, NativeBuilder};
use crate::context::BuildContext;
use crate::dispatch::Dispatcher;
use crate::manifest::{manifest_path, now_utc_compact, RunManifest};
use crate::package::{ArtifactPackager, OutputArtifact};
use crate::platform::{HostPlatform, PlatformIdentifier};
use crate::process::CommandRunner;
use crate::publish::Publisher;
use crate::targets::select_targets;

/// What the caller asked for.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    /// Explicit targets; empty means the host's default set.
    pub targets: Vec<PlatformIdentifier>,
    /// Externally supplied version tag, e.g. `v0.1.2`.
    pub version: String,
    /// Publish after building.
    pub upload: bool,
    pub destination: Option<String>,
}

/// Collaborators and locations a release runs with.
pub struct ReleasePipeline<'a> {
    pub ctx: &'a BuildContext,
    pub container: &'a ContainerSettings,
    pub output_root: &'a Path,
    pub runner: &'a dyn CommandRunner,
    pub publisher: &'a dyn Publisher,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    /// Upload was turned off by the caller.
    Suppressed,
    /// Nothing was packaged, so there was nothing to upload.
    Skipped,
    Published { destination: String },
    Failed(BuildError),
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStatus::Suppressed => f.write_str("publish: suppressed"),
            PublishStatus::Skipped => f.write_str("publish: skipped (no artifacts)"),
            PublishStatus::Published { destination } => write!(f, "publish: ok -> {destination}"),
            PublishStatus::Failed(e) => write!(f, "publish: FAILED: {e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReleaseReport {
    pub host: HostPlatform,
    pub version: String,
    pub results: ResultMap,
    pub artifacts: BTreeMap<PlatformIdentifier, OutputArtifact>,
    /// Targets that built but could not be packaged.
    pub packaging_failures: BTreeMap<PlatformIdentifier, BuildError>,
    /// Where the run manifest was written, or why it could not be.
    pub manifest: Result<PathBuf, String>,
    pub publish: PublishStatus,
}

impl ReleaseReport {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary::of(&self.results)
    }

    /// False if any target failed to build or package, the manifest was not
    /// written, or publish failed.
    pub fn succeeded(&self) -> bool {
        self.summary().all_succeeded()
            && self.packaging_failures.is_empty()
            && self.manifest.is_ok()
            && !matches!(self.publish, PublishStatus::Failed(_))
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("release {} on host {}", self.version, self.host)];
        lines.extend(summary_lines(&self.results));
        for artifact in self.artifacts.values() {
            lines.push(format!(
                "packaged {} ({} bytes, sha256 {})",
                artifact.relative_path.display(),
                artifact.compressed_bytes,
                artifact.sha256
            ));
        }
        for (platform, error) in &self.packaging_failures {
            lines.push(format!("{platform} packaging FAILED: {error}"));
        }
        match &self.manifest {
            Ok(path) => lines.push(format!("manifest: {}", path.display())),
            Err(e) => lines.push(format!("manifest: FAILED: {e}")),
        }
        lines.push(self.publish.to_string());
        lines
    }
}

/// Run a full release on `host`.
pub fn run_release(
    pipeline: &ReleasePipeline<'_>,
    host: HostPlatform,
    request: &ReleaseRequest,
) -> Result<ReleaseReport> {
    let packager = ArtifactPackager::new(
        pipeline.output_root,
        request.version.as_str(),
        pipeline.ctx.artifact_name.as_str(),
    )?;
    let destination = match (request.upload, request.destination.as_deref()) {
        (false, _) => None,
        (true, Some(dest)) if !dest.trim().is_empty() => Some(dest),
        (true, _) => bail!("upload requested but no publish destination is configured"),
    };

    let version_dir = packager.version_dir();
    if version_dir.exists() {
        info!(dir = %version_dir.display(), "clearing previous output for this version");
        fs::remove_dir_all(&version_dir)
            .with_context(|| format!("clearing '{}'", version_dir.display()))?;
    }

    let targets = select_targets(&request.targets, host);
    info!(
        %host,
        version = %request.version,
        targets = %targets.iter().map(|t| t.tag()).collect::<Vec<_>>().join(","),
        "starting release"
    );

    let started_at_utc = now_utc_compact();
    let dispatcher = Dispatcher::new(
        NativeBuilder::new(pipeline.ctx, pipeline.runner),
        ContainerBuilder::new(pipeline.ctx, pipeline.container, pipeline.runner),
    );

    let mut artifacts = BTreeMap::new();
    let mut packaging_failures = BTreeMap::new();
    let results = run_all_with(&targets, host, &dispatcher, &mut |result| {
        match packager.package(result) {
            Ok(Some(artifact)) => {
                artifacts.insert(result.platform, artifact);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(platform = %result.platform, error = %e, "packaging failed");
                packaging_failures.insert(result.platform, e);
            }
        }
    });
    let finished_at_utc = now_utc_compact();

    let manifest = RunManifest::from_run(
        &request.version,
        host,
        started_at_utc,
        finished_at_utc,
        &results,
        &artifacts,
        &packaging_failures,
    );
    let manifest_path = manifest_path(&version_dir);
    let manifest = match manifest.write(&manifest_path) {
        Ok(()) => Ok(manifest_path),
        Err(e) => {
            let message = format!("{e:#}");
            warn!(error = %message, "could not write run manifest");
            Err(message)
        }
    };

    let publish = match destination {
        None => {
            info!("upload suppressed");
            PublishStatus::Suppressed
        }
        Some(_) if artifacts.is_empty() => {
            warn!("no artifacts were packaged; not publishing");
            PublishStatus::Skipped
        }
        Some(dest) => match pipeline.publisher.publish(pipeline.output_root, dest) {
            Ok(()) => PublishStatus::Published {
                destination: dest.to_string(),
            },
            Err(e) => PublishStatus::Failed(e),
        },
    };

    Ok(ReleaseReport {
        host,
        version: request.version.clone(),
        results,
        artifacts,
        packaging_failures,
        manifest,
        publish,
    })
}
