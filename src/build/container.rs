//! Container builds: the build command runs inside an architecture-pinned
//! linux container with the working directory mounted at `/work`.
//!
//! The script provisions the toolchain, runs the build, and hands ownership of
//! the build directory back to the invoking user so the next native build can
//! clear it. The binary reaches the host through the mount.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::build::native::JOBS_ENV;
use crate::build::{chain_message, BuildError, BuildResult};
use crate::context::{BuildContext, BuildDirLease};
use crate::platform::{Os, PlatformIdentifier};
use crate::process::{shell_quote, CommandRunner, ExternalCommand};
use crate::registry::BuildStrategy;

/// Mount point of the working directory inside the container.
const CONTAINER_WORK_DIR: &str = "/work";

/// Mount point of the optional toolchain cache volume.
const CONTAINER_CACHE_DIR: &str = "/var/cache/release-builder";

/// How to reach the container runtime and what to run in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    /// Executor program, e.g. `docker` or `podman`.
    pub executor: String,
    /// Image reference the build runs in.
    pub image: String,
    /// Shell lines run before the build to install the toolchain.
    pub provision: Vec<String>,
    /// Named volume holding cached toolchain state between runs.
    pub cache_volume: Option<String>,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            executor: "docker".to_string(),
            image: "debian:bookworm".to_string(),
            provision: vec![
                "apt-get update -qq".to_string(),
                "apt-get install -y -qq build-essential cmake git >/dev/null".to_string(),
            ],
            cache_volume: None,
        }
    }
}

pub struct ContainerBuilder<'a> {
    ctx: &'a BuildContext,
    settings: &'a ContainerSettings,
    runner: &'a dyn CommandRunner,
}

impl<'a> ContainerBuilder<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        settings: &'a ContainerSettings,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            ctx,
            settings,
            runner,
        }
    }

    /// Build a linux `target` inside a container pinned to its architecture.
    pub fn build(&self, target: PlatformIdentifier) -> BuildResult {
        if target.os != Os::Linux {
            return BuildResult::failure(
                target,
                BuildStrategy::Container,
                BuildError::Unsupported(format!(
                    "container builds only produce linux binaries, not {target}"
                )),
            );
        }

        let Some(executor) = self.runner.locate(&self.settings.executor) else {
            warn!(platform = %target, executor = %self.settings.executor, "container executor not found");
            return BuildResult::failure(
                target,
                BuildStrategy::Container,
                BuildError::MissingDependency(format!(
                    "container executor '{}' not found on PATH",
                    self.settings.executor
                )),
            );
        };

        match self.try_build(target, &executor) {
            Ok(result) => result,
            Err(e) => BuildResult::failure(
                target,
                BuildStrategy::Container,
                BuildError::BuildFailure(chain_message(&e)),
            ),
        }
    }

    fn try_build(&self, target: PlatformIdentifier, executor: &Path) -> anyhow::Result<BuildResult> {
        let _lease = BuildDirLease::acquire(&self.ctx.build_dir)?;
        self.ctx.remove_stale_artifact()?;

        let cmd = self.command(target, executor)?;
        info!(
            platform = %target,
            image = %self.settings.image,
            executor = %executor.display(),
            "running container build"
        );
        let output = self.runner.run(&cmd)?;

        if !output.success() {
            warn!(platform = %target, exit = %output.exit_label(), "container build failed");
            return Ok(BuildResult::failure(
                target,
                BuildStrategy::Container,
                BuildError::BuildFailure(format!(
                    "container exited with {}\n{}",
                    output.exit_label(),
                    output.diagnostic_tail(20)
                )),
            ));
        }

        let binary = self.ctx.expected_artifact();
        if !binary.is_file() {
            return Ok(BuildResult::failure(
                target,
                BuildStrategy::Container,
                BuildError::BuildFailure(format!(
                    "container finished but binary is missing: {}",
                    binary.display()
                )),
            ));
        }

        info!(platform = %target, binary = %binary.display(), "container build succeeded");
        Ok(BuildResult::success(target, BuildStrategy::Container, binary))
    }

    fn command(&self, target: PlatformIdentifier, executor: &Path) -> anyhow::Result<ExternalCommand> {
        let mut cmd = ExternalCommand::new(executor.display().to_string())
            .args(["run", "--rm", "--platform"])
            .arg(format!("linux/{}", target.arch.tag()))
            .arg("-v")
            .arg(format!("{}:{CONTAINER_WORK_DIR}", self.ctx.work_dir.display()))
            .args(["-w", CONTAINER_WORK_DIR]);

        let build_dir_in_container = self.container_build_dir();
        if self.ctx.build_dir_in_work_dir().is_none() {
            let dir = self.ctx.build_dir.display();
            cmd = cmd.arg("-v").arg(format!("{dir}:{dir}"));
        }
        if let Some(volume) = &self.settings.cache_volume {
            cmd = cmd.arg("-v").arg(format!("{volume}:{CONTAINER_CACHE_DIR}"));
        }

        cmd = cmd.arg("-e").arg(format!("{JOBS_ENV}={}", self.ctx.jobs));
        for (key, value) in &self.ctx.env {
            cmd = cmd.arg("-e").arg(format!("{key}={value}"));
        }

        let script = self.script(&build_dir_in_container)?;
        cmd = cmd
            .arg(self.settings.image.as_str())
            .args(["sh", "-euc"])
            .arg(script);
        if self.ctx.interactive {
            cmd = cmd.interactive();
        }
        Ok(cmd)
    }

    fn container_build_dir(&self) -> PathBuf {
        match self.ctx.build_dir_in_work_dir() {
            Some(rel) => Path::new(CONTAINER_WORK_DIR).join(rel),
            None => self.ctx.build_dir.clone(),
        }
    }

    fn script(&self, build_dir: &Path) -> anyhow::Result<String> {
        let argv = self.ctx.resolved_build_command();
        if argv.is_empty() {
            anyhow::bail!("build command is empty");
        }

        let mut lines: Vec<String> = self.settings.provision.clone();
        lines.push(
            argv.iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" "),
        );
        if let Some((uid, gid)) = invoking_user() {
            lines.push(format!(
                "chown -R {uid}:{gid} {}",
                shell_quote(&build_dir.display().to_string())
            ));
        }
        Ok(lines.join("\n"))
    }
}

#[cfg(unix)]
fn invoking_user() -> Option<(u32, u32)> {
    // SAFETY: getuid/getgid cannot fail and touch no memory.
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    Some((uid, gid))
}

#[cfg(not(unix))]
fn invoking_user() -> Option<(u32, u32)> {
    None
}
