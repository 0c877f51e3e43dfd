//! Run manifest written beside the artifacts.
//!
//! `<output_root>/<version>/manifest.json` records what every requested target
//! ended as. It is written before publish, so it ships with the artifacts.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::batch::ResultMap;
use crate::build::{BuildError, ErrorKind};
use crate::package::OutputArtifact;
use crate::platform::{HostPlatform, PlatformIdentifier};
use crate::registry::BuildStrategy;

const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub platform: String,
    pub status: TargetStatus,
    pub strategy: BuildStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Artifact path relative to the output root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: String,
    pub host: String,
    pub started_at_utc: String,
    pub finished_at_utc: String,
    pub targets: Vec<TargetRecord>,
}

impl RunManifest {
    /// Combine build results with packaging outcomes, one record per target.
    ///
    /// A target whose build succeeded but whose packaging failed is recorded
    /// as failed with the packaging error.
    pub fn from_run(
        version: &str,
        host: HostPlatform,
        started_at_utc: String,
        finished_at_utc: String,
        results: &ResultMap,
        artifacts: &BTreeMap<PlatformIdentifier, OutputArtifact>,
        packaging_failures: &BTreeMap<PlatformIdentifier, BuildError>,
    ) -> Self {
        let targets = results
            .values()
            .map(|result| {
                let error = packaging_failures
                    .get(&result.platform)
                    .or_else(|| result.error());
                let artifact = artifacts.get(&result.platform);
                TargetRecord {
                    platform: result.platform.tag(),
                    status: if error.is_none() {
                        TargetStatus::Success
                    } else {
                        TargetStatus::Failed
                    },
                    strategy: result.strategy,
                    error_kind: error.map(BuildError::kind),
                    diagnostic: error.map(|e| e.diagnostic().to_string()),
                    artifact: artifact.map(|a| a.relative_path.display().to_string()),
                    sha256: artifact.map(|a| a.sha256.clone()),
                }
            })
            .collect();

        Self {
            version: version.to_string(),
            host: host.to_string(),
            started_at_utc,
            finished_at_utc,
            targets,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
            .with_context(|| format!("writing run manifest '{}'", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("reading run manifest '{}'", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing run manifest '{}'", path.display()))
    }
}

pub fn manifest_path(version_dir: &Path) -> PathBuf {
    version_dir.join(MANIFEST_FILENAME)
}

/// Current UTC time as `YYYYMMDDTHHMMSSZ`.
pub fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).context("serializing run manifest")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}
