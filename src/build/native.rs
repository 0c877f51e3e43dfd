//! Native builds: the build command runs directly on the host.

use tracing::{info, warn};

use crate::build::{chain_message, BuildError, BuildResult, CrossCompileParameters};
use crate::context::{BuildContext, BuildDirLease};
use crate::platform::{HostPlatform, PlatformIdentifier};
use crate::process::{CommandRunner, ExternalCommand};
use crate::registry::BuildStrategy;

/// Environment variable carrying the parallelism hint.
pub const JOBS_ENV: &str = "BUILD_JOBS";

pub struct NativeBuilder<'a> {
    ctx: &'a BuildContext,
    runner: &'a dyn CommandRunner,
}

impl<'a> NativeBuilder<'a> {
    pub fn new(ctx: &'a BuildContext, runner: &'a dyn CommandRunner) -> Self {
        Self { ctx, runner }
    }

    /// Build `target` on `host`, cross-compiling within the OS family.
    ///
    /// The build directory is cleared first. A non-zero exit or a missing
    /// binary at the expected path is a `BuildFailure`.
    pub fn build(&self, target: PlatformIdentifier, host: HostPlatform) -> BuildResult {
        match self.try_build(target, host) {
            Ok(result) => result,
            Err(e) => BuildResult::failure(
                target,
                BuildStrategy::Native,
                BuildError::BuildFailure(chain_message(&e)),
            ),
        }
    }

    fn try_build(
        &self,
        target: PlatformIdentifier,
        host: HostPlatform,
    ) -> anyhow::Result<BuildResult> {
        let _lease = BuildDirLease::acquire(&self.ctx.build_dir)?;
        self.ctx.remove_stale_artifact()?;

        let cross = CrossCompileParameters::derive(target, host);
        if let Some(params) = &cross {
            info!(
                platform = %target,
                target_triplet = %params.target_triplet,
                host_triplet = %params.host_triplet,
                "cross-compiling natively"
            );
        }

        let cmd = self.command(cross.as_ref())?;
        info!(platform = %target, command = %cmd, jobs = self.ctx.jobs, "running native build");
        let output = self.runner.run(&cmd)?;

        if !output.success() {
            warn!(platform = %target, exit = %output.exit_label(), "native build failed");
            return Ok(BuildResult::failure(
                target,
                BuildStrategy::Native,
                BuildError::BuildFailure(format!(
                    "'{}' exited with {}\n{}",
                    cmd,
                    output.exit_label(),
                    output.diagnostic_tail(20)
                )),
            ));
        }

        let binary = self.ctx.expected_artifact();
        if !binary.is_file() {
            return Ok(BuildResult::failure(
                target,
                BuildStrategy::Native,
                BuildError::BuildFailure(format!(
                    "build finished but binary is missing: {}",
                    binary.display()
                )),
            ));
        }

        info!(platform = %target, binary = %binary.display(), "native build succeeded");
        Ok(BuildResult::success(target, BuildStrategy::Native, binary))
    }

    fn command(&self, cross: Option<&CrossCompileParameters>) -> anyhow::Result<ExternalCommand> {
        let argv = self.ctx.resolved_build_command();
        let Some((program, args)) = argv.split_first() else {
            anyhow::bail!("build command is empty");
        };

        let mut cmd = ExternalCommand::new(program.as_str())
            .args(args.iter().cloned())
            .current_dir(&self.ctx.work_dir)
            .envs(self.ctx.env.clone())
            .env(JOBS_ENV, self.ctx.jobs.to_string());
        if let Some(params) = cross {
            cmd = cmd.envs(params.env());
        }
        if self.ctx.interactive {
            cmd = cmd.interactive();
        }
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::ErrorKind;
    use crate::process::CommandOutput;
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Records invocations; writes the binary when `produce` is set.
    struct FakeBuild {
        calls: RefCell<Vec<ExternalCommand>>,
        exit: i32,
        produce: Option<PathBuf>,
    }

    impl CommandRunner for FakeBuild {
        fn run(&self, cmd: &ExternalCommand) -> anyhow::Result<CommandOutput> {
            self.calls.borrow_mut().push(cmd.clone());
            if let Some(path) = &self.produce {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, b"\x7fELF").unwrap();
            }
            Ok(CommandOutput {
                code: Some(self.exit),
                stderr: "ld: symbol not found".into(),
                ..CommandOutput::default()
            })
        }
    }

    fn context(tmp: &TempDir) -> BuildContext {
        let work = tmp.path().to_path_buf();
        let mut ctx = BuildContext::new(
            work.clone(),
            work.join("dist"),
            PathBuf::from("dist/release/vss0.so"),
            "vss0",
            vec!["make".into(), "loadable-release".into(), "-j{jobs}".into()],
        );
        ctx.jobs = 8;
        ctx
    }

    #[test]
    fn same_platform_build_has_no_cross_overrides() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let runner = FakeBuild {
            calls: RefCell::new(Vec::new()),
            exit: 0,
            produce: Some(ctx.expected_artifact()),
        };

        let host = HostPlatform::Known(PlatformIdentifier::LINUX_AMD64);
        let result = NativeBuilder::new(&ctx, &runner).build(PlatformIdentifier::LINUX_AMD64, host);

        assert!(result.is_success(), "{result}");
        assert_eq!(result.binary(), Some(ctx.expected_artifact().as_path()));
        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "make");
        assert_eq!(calls[0].args, vec!["loadable-release", "-j8"]);
        assert_eq!(calls[0].env[JOBS_ENV], "8");
        assert!(!calls[0].env.contains_key("CMAKE_OSX_ARCHITECTURES"));
    }

    #[test]
    fn cross_arch_mac_build_injects_overrides() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let runner = FakeBuild {
            calls: RefCell::new(Vec::new()),
            exit: 0,
            produce: Some(ctx.expected_artifact()),
        };

        let host = HostPlatform::Known(PlatformIdentifier::OSX_ARM64);
        let result = NativeBuilder::new(&ctx, &runner).build(PlatformIdentifier::OSX_AMD64, host);

        assert!(result.is_success());
        let calls = runner.calls.borrow();
        assert_eq!(calls[0].env["CMAKE_OSX_ARCHITECTURES"], "x86_64");
        assert_eq!(calls[0].env["VCPKG_TARGET_TRIPLET"], "x64-osx");
        assert_eq!(calls[0].env["VCPKG_HOST_TRIPLET"], "arm64-osx");
    }

    #[test]
    fn nonzero_exit_is_build_failure() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let runner = FakeBuild {
            calls: RefCell::new(Vec::new()),
            exit: 2,
            produce: None,
        };

        let host = HostPlatform::Known(PlatformIdentifier::OSX_ARM64);
        let result = NativeBuilder::new(&ctx, &runner).build(PlatformIdentifier::OSX_AMD64, host);

        let err = result.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::BuildFailure);
        assert!(err.diagnostic().contains("ld: symbol not found"));
    }

    #[test]
    fn missing_binary_after_clean_exit_is_build_failure() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let runner = FakeBuild {
            calls: RefCell::new(Vec::new()),
            exit: 0,
            produce: None,
        };

        let host = HostPlatform::Known(PlatformIdentifier::LINUX_AMD64);
        let result = NativeBuilder::new(&ctx, &runner).build(PlatformIdentifier::LINUX_AMD64, host);

        let err = result.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::BuildFailure);
        assert!(err.diagnostic().contains("binary is missing"));
    }

    #[test]
    fn stale_binary_is_cleared_before_building() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        fs::create_dir_all(ctx.expected_artifact().parent().unwrap()).unwrap();
        fs::write(ctx.expected_artifact(), b"stale").unwrap();
        let runner = FakeBuild {
            calls: RefCell::new(Vec::new()),
            exit: 0,
            produce: None,
        };

        let host = HostPlatform::Known(PlatformIdentifier::LINUX_AMD64);
        let result = NativeBuilder::new(&ctx, &runner).build(PlatformIdentifier::LINUX_AMD64, host);

        assert!(!result.is_success());
        assert!(!ctx.expected_artifact().exists());
    }
}
