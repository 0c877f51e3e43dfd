//! `release-builder.toml` loading.
//!
//! ```toml
//! [artifact]
//! name = "vss0"
//! path = "dist/release/vss0.so"
//! build_dir = "dist"
//!
//! [build]
//! command = ["make", "loadable-release", "-j{jobs}"]
//!
//! [output]
//! root = "release"
//!
//! [publish]
//! destination = "gs://example-releases/vss"
//! ```
//!
//! Relative paths resolve against the working directory, not the config file.
//! Environment overrides are applied after the file is parsed.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::build::container::ContainerSettings;
use crate::context::BuildContext;
use crate::package::validate_segment;
use crate::publish::{DEFAULT_GRANT, DEFAULT_SYNC};

pub const CONFIG_FILENAME: &str = "release-builder.toml";
pub const EXECUTOR_ENV: &str = "RELEASE_BUILDER_CONTAINER_EXECUTOR";
pub const JOBS_ENV: &str = "RELEASE_BUILDER_JOBS";
pub const DESTINATION_ENV: &str = "RELEASE_BUILDER_DESTINATION";

const DEFAULT_BUILD_DIR: &str = "build";
const DEFAULT_OUTPUT_ROOT: &str = "dist";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    artifact: ArtifactToml,
    build: BuildToml,
    container: Option<ContainerToml>,
    output: Option<OutputToml>,
    publish: Option<PublishToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArtifactToml {
    name: String,
    path: String,
    build_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildToml {
    command: Vec<String>,
    jobs: Option<usize>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContainerToml {
    executor: Option<String>,
    image: Option<String>,
    provision: Option<Vec<String>>,
    cache_volume: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputToml {
    root: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PublishToml {
    destination: Option<String>,
    sync: Option<Vec<String>>,
    grant: Option<Vec<String>>,
}

/// Publish settings after defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    pub destination: Option<String>,
    pub sync: Vec<String>,
    pub grant: Vec<String>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// File the configuration came from.
    pub origin: PathBuf,
    pub work_dir: PathBuf,
    pub artifact_name: String,
    /// Expected binary, relative to `work_dir`.
    pub artifact_path: PathBuf,
    pub build_dir: PathBuf,
    pub build_command: Vec<String>,
    /// Explicit parallelism; `None` means detect.
    pub jobs: Option<usize>,
    pub env: BTreeMap<String, String>,
    pub container: ContainerSettings,
    pub output_root: PathBuf,
    pub publish: PublishConfig,
}

impl ReleaseConfig {
    /// Load from `explicit`, else `./release-builder.toml`, else the user
    /// config directory. Environment overrides are applied and the result
    /// validated.
    pub fn load(explicit: Option<&Path>, work_dir: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => discover(work_dir)?,
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        let mut config = Self::from_toml_str(&raw, &path, work_dir)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        debug!(config = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse without environment overrides or cross-field validation.
    pub fn from_toml_str(raw: &str, origin: &Path, work_dir: &Path) -> Result<Self> {
        let parsed: ConfigToml = toml::from_str(raw)
            .with_context(|| format!("parsing config '{}'", origin.display()))?;

        let invalid = || format!("invalid config '{}'", origin.display());
        let artifact_path =
            parse_relative_path(&parsed.artifact.path, "artifact.path").with_context(invalid)?;
        let build_dir = parse_relative_path(
            parsed.artifact.build_dir.as_deref().unwrap_or(DEFAULT_BUILD_DIR),
            "artifact.build_dir",
        )
        .with_context(invalid)?;

        let mut container = ContainerSettings::default();
        if let Some(c) = parsed.container {
            if let Some(executor) = c.executor {
                container.executor = executor;
            }
            if let Some(image) = c.image {
                container.image = image;
            }
            if let Some(provision) = c.provision {
                container.provision = provision;
            }
            container.cache_volume = c.cache_volume;
        }

        let output_root = parse_relative_path(
            parsed
                .output
                .and_then(|o| o.root)
                .as_deref()
                .unwrap_or(DEFAULT_OUTPUT_ROOT),
            "output.root",
        )
        .with_context(invalid)?;

        let publish = parsed.publish.unwrap_or(PublishToml {
            destination: None,
            sync: None,
            grant: None,
        });
        let publish = PublishConfig {
            destination: publish.destination,
            sync: publish.sync.unwrap_or_else(|| owned(DEFAULT_SYNC)),
            grant: publish.grant.unwrap_or_else(|| owned(DEFAULT_GRANT)),
        };

        Ok(Self {
            origin: origin.to_path_buf(),
            work_dir: work_dir.to_path_buf(),
            artifact_name: parsed.artifact.name,
            artifact_path,
            build_dir: work_dir.join(build_dir),
            build_command: parsed.build.command,
            jobs: parsed.build.jobs,
            env: parsed.build.env,
            container,
            output_root: work_dir.join(output_root),
            publish,
        })
    }

    /// Apply `RELEASE_BUILDER_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(executor) = lookup(EXECUTOR_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(executor = %executor, "container executor overridden from environment");
            self.container.executor = executor;
        }
        if let Some(raw) = lookup(JOBS_ENV).filter(|v| !v.trim().is_empty()) {
            let jobs = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{JOBS_ENV}='{raw}' is not a number"))?;
            self.jobs = Some(jobs);
        }
        if let Some(destination) = lookup(DESTINATION_ENV).filter(|v| !v.trim().is_empty()) {
            self.publish.destination = Some(destination);
        }
        Ok(())
    }

    /// Replace the output root with `raw`, relative to the working directory.
    pub fn set_output_root(&mut self, raw: &str) -> Result<()> {
        self.output_root = self.work_dir.join(parse_relative_path(raw, "output root")?);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let origin = self.origin.display();
        validate_segment("artifact.name", &self.artifact_name)
            .with_context(|| format!("invalid config '{origin}'"))?;
        if self.build_command.first().map_or(true, |p| p.trim().is_empty()) {
            bail!("invalid config '{origin}': build.command must name a program");
        }
        if self.jobs == Some(0) {
            bail!("invalid config '{origin}': jobs must be at least 1");
        }
        if self.container.executor.trim().is_empty() {
            bail!("invalid config '{origin}': container.executor must not be empty");
        }
        if self.publish.sync.is_empty() || self.publish.grant.is_empty() {
            bail!("invalid config '{origin}': publish.sync and publish.grant must not be empty");
        }
        for (field, dir) in [("build dir", &self.build_dir), ("output root", &self.output_root)] {
            if dir.components().any(|c| c == Component::ParentDir) {
                bail!(
                    "invalid config '{origin}': {field} '{}' must not contain '..'",
                    dir.display()
                );
            }
        }
        if self.work_dir.starts_with(&self.build_dir) {
            bail!(
                "invalid config '{origin}': build dir '{}' would clear the working directory",
                self.build_dir.display()
            );
        }
        if self.output_root.starts_with(&self.build_dir) || self.build_dir.starts_with(&self.output_root) {
            bail!(
                "invalid config '{origin}': output root '{}' and build dir '{}' must not overlap; \
                 the build dir is cleared before every build",
                self.output_root.display(),
                self.build_dir.display()
            );
        }
        let binary = self.work_dir.join(&self.artifact_path);
        if !binary.starts_with(&self.build_dir) || binary == self.build_dir {
            bail!(
                "invalid config '{origin}': artifact.path '{}' must lie inside build dir '{}'; \
                 only the build dir is cleared between builds",
                self.artifact_path.display(),
                self.build_dir.display()
            );
        }
        Ok(())
    }

    pub fn build_context(&self) -> BuildContext {
        let mut ctx = BuildContext::new(
            self.work_dir.clone(),
            self.build_dir.clone(),
            self.artifact_path.clone(),
            self.artifact_name.clone(),
            self.build_command.clone(),
        );
        ctx.env = self.env.clone();
        if let Some(jobs) = self.jobs {
            ctx.jobs = jobs;
        }
        ctx
    }
}

fn discover(work_dir: &Path) -> Result<PathBuf> {
    let local = work_dir.join(CONFIG_FILENAME);
    if local.is_file() {
        return Ok(local);
    }
    let user = dirs::config_dir().map(|d| d.join("release-builder").join("config.toml"));
    if let Some(user) = &user {
        if user.is_file() {
            return Ok(user.clone());
        }
    }
    bail!(
        "no configuration found; looked for '{}'{} (use --config)",
        local.display(),
        user.map(|u| format!(" and '{}'", u.display()))
            .unwrap_or_default()
    )
}

fn parse_relative_path(raw: &str, field: &str) -> Result<PathBuf> {
    let candidate = Path::new(raw);
    if raw.trim().is_empty() {
        bail!("{field} must not be empty");
    }
    if candidate.is_absolute() {
        bail!("{field} must be relative, got absolute path '{raw}'");
    }
    for component in candidate.components() {
        if matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        ) {
            bail!("{field} contains invalid traversal/root component in '{raw}'");
        }
    }
    Ok(candidate.to_path_buf())
}

fn owned(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|s| s.to_string()).collect()
}
