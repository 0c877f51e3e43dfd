//! End-to-end runs of the release pipeline against fake collaborators.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use release_builder::build::container::ContainerSettings;
use release_builder::manifest::{RunManifest, TargetStatus};
use release_builder::process::{CommandOutput, CommandRunner, ExternalCommand};
use release_builder::publish::Publisher;
use release_builder::release::PublishStatus;
use release_builder::{
    run_release, BuildContext, BuildError, BuildStrategy, ErrorKind, HostPlatform,
    PlatformIdentifier, ReleasePipeline, ReleaseRequest,
};
use tempfile::TempDir;

/// Pretends to be `make` and `docker`: both leave a binary behind unless told
/// to fail. Records every invocation.
struct FakeToolchain {
    binary: PathBuf,
    docker_installed: bool,
    make_exit: i32,
    calls: RefCell<Vec<ExternalCommand>>,
}

impl FakeToolchain {
    fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            docker_installed: true,
            make_exit: 0,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.program.clone()).collect()
    }
}

impl CommandRunner for FakeToolchain {
    fn run(&self, cmd: &ExternalCommand) -> anyhow::Result<CommandOutput> {
        self.calls.borrow_mut().push(cmd.clone());
        let exit = if cmd.program == "make" { self.make_exit } else { 0 };
        if exit == 0 {
            fs::create_dir_all(self.binary.parent().unwrap())?;
            let arch = cmd
                .env
                .get("CMAKE_OSX_ARCHITECTURES")
                .cloned()
                .unwrap_or_else(|| cmd.args.join(" "));
            fs::write(&self.binary, format!("binary for {arch}"))?;
        }
        Ok(CommandOutput {
            code: Some(exit),
            stderr: if exit == 0 { String::new() } else { "clang: error: linker command failed".into() },
            ..CommandOutput::default()
        })
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        match program {
            "docker" if !self.docker_installed => None,
            other => Some(PathBuf::from("/usr/bin").join(other)),
        }
    }
}

#[derive(Default)]
struct FakeStore {
    uploads: RefCell<Vec<Vec<PathBuf>>>,
}

impl Publisher for FakeStore {
    fn publish(&self, output_root: &Path, _destination: &str) -> Result<(), BuildError> {
        let mut files: Vec<PathBuf> = walk(output_root)
            .into_iter()
            .map(|p| p.strip_prefix(output_root).unwrap().to_path_buf())
            .collect();
        files.sort();
        self.uploads.borrow_mut().push(files);
        Ok(())
    }
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}

struct Workspace {
    tmp: TempDir,
    ctx: BuildContext,
    container: ContainerSettings,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("sqlite-vss");
        fs::create_dir_all(&src).unwrap();
        let mut ctx = BuildContext::new(
            src.clone(),
            src.join("dist"),
            PathBuf::from("dist/release/vss0.so"),
            "vss0",
            vec!["make".into(), "loadable-release".into()],
        );
        ctx.jobs = 4;
        Self {
            tmp,
            ctx,
            container: ContainerSettings::default(),
        }
    }

    fn output_root(&self) -> PathBuf {
        self.tmp.path().join("release")
    }

    fn toolchain(&self) -> FakeToolchain {
        FakeToolchain::new(self.ctx.expected_artifact())
    }

    fn release(
        &self,
        runner: &FakeToolchain,
        store: &FakeStore,
        host: PlatformIdentifier,
        targets: Vec<PlatformIdentifier>,
        upload: bool,
    ) -> release_builder::ReleaseReport {
        let output_root = self.output_root();
        let pipeline = ReleasePipeline {
            ctx: &self.ctx,
            container: &self.container,
            output_root: &output_root,
            runner,
            publisher: store,
        };
        run_release(
            &pipeline,
            HostPlatform::Known(host),
            &ReleaseRequest {
                targets,
                version: "v0.1.2".into(),
                upload,
                destination: Some("gs://static.example.com/vss".into()),
            },
        )
        .unwrap()
    }
}

#[test]
fn linux_host_builds_linux_and_rejects_macos() {
    let ws = Workspace::new();
    let runner = ws.toolchain();
    let store = FakeStore::default();

    let report = ws.release(
        &runner,
        &store,
        PlatformIdentifier::LINUX_AMD64,
        vec![
            PlatformIdentifier::LINUX_AMD64,
            PlatformIdentifier::LINUX_ARM64,
            PlatformIdentifier::OSX_ARM64,
        ],
        true,
    );

    assert_eq!(report.results[&PlatformIdentifier::LINUX_AMD64].strategy, BuildStrategy::Native);
    assert_eq!(report.results[&PlatformIdentifier::LINUX_ARM64].strategy, BuildStrategy::Container);
    assert_eq!(
        report.results[&PlatformIdentifier::OSX_ARM64].error().map(BuildError::kind),
        Some(ErrorKind::Unsupported)
    );

    let summary = report.summary();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.unsupported, 1);
    assert_eq!(summary.succeeded, 2);
    assert!(!report.succeeded());

    assert_eq!(runner.programs(), ["make", "/usr/bin/docker"]);

    assert!(matches!(report.publish, PublishStatus::Published { .. }));
    let uploads = store.uploads.borrow();
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        uploads[0],
        [
            "v0.1.2/linux_amd64/vss0.gz",
            "v0.1.2/linux_amd64/vss0.gz.sha256",
            "v0.1.2/linux_arm64/vss0.gz",
            "v0.1.2/linux_arm64/vss0.gz.sha256",
            "v0.1.2/manifest.json",
        ]
        .map(PathBuf::from)
    );

    let manifest = RunManifest::load(report.manifest.as_ref().unwrap()).unwrap();
    assert_eq!(manifest.host, "linux_amd64");
    let statuses: Vec<_> = manifest
        .targets
        .iter()
        .map(|t| (t.platform.as_str(), t.status))
        .collect();
    assert_eq!(
        statuses,
        [
            ("linux_amd64", TargetStatus::Success),
            ("linux_arm64", TargetStatus::Success),
            ("osx_arm64", TargetStatus::Failed),
        ]
    );
}

#[test]
fn each_artifact_holds_its_own_build() {
    let ws = Workspace::new();
    let runner = ws.toolchain();
    let store = FakeStore::default();

    let report = ws.release(
        &runner,
        &store,
        PlatformIdentifier::OSX_ARM64,
        vec![PlatformIdentifier::OSX_ARM64, PlatformIdentifier::OSX_AMD64],
        false,
    );

    assert!(report.succeeded());
    assert_eq!(report.publish, PublishStatus::Suppressed);
    let arm = &report.artifacts[&PlatformIdentifier::OSX_ARM64];
    let intel = &report.artifacts[&PlatformIdentifier::OSX_AMD64];
    assert_ne!(arm.sha256, intel.sha256);
}

#[test]
fn failed_cross_mac_build_is_a_build_failure() {
    let ws = Workspace::new();
    let mut runner = ws.toolchain();
    runner.make_exit = 2;
    let store = FakeStore::default();

    let report = ws.release(
        &runner,
        &store,
        PlatformIdentifier::OSX_ARM64,
        vec![PlatformIdentifier::OSX_AMD64],
        true,
    );

    let result = &report.results[&PlatformIdentifier::OSX_AMD64];
    assert_eq!(result.strategy, BuildStrategy::Native);
    let err = result.error().unwrap();
    assert_eq!(err.kind(), ErrorKind::BuildFailure);
    assert!(err.diagnostic().contains("linker command failed"));

    let calls = runner.calls.borrow();
    assert_eq!(calls[0].env["CMAKE_OSX_ARCHITECTURES"], "x86_64");
    assert_eq!(calls[0].env["VCPKG_TARGET_TRIPLET"], "x64-osx");
    assert_eq!(calls[0].env["VCPKG_HOST_TRIPLET"], "arm64-osx");

    assert_eq!(report.publish, PublishStatus::Skipped);
    assert!(store.uploads.borrow().is_empty());
}

#[test]
fn absent_executor_fails_before_any_container_work() {
    let ws = Workspace::new();
    let mut runner = ws.toolchain();
    runner.docker_installed = false;
    let store = FakeStore::default();

    let report = ws.release(
        &runner,
        &store,
        PlatformIdentifier::OSX_ARM64,
        vec![PlatformIdentifier::LINUX_ARM64],
        true,
    );

    let result = &report.results[&PlatformIdentifier::LINUX_ARM64];
    assert_eq!(result.strategy, BuildStrategy::Container);
    assert_eq!(result.error().map(BuildError::kind), Some(ErrorKind::MissingDependency));
    assert!(runner.calls.borrow().is_empty());
    assert!(!report.succeeded());
}
