//! Multi-platform build-and-publish orchestration for a native extension binary.
//!
//! Given one artifact and a set of OS/arch targets, the crate picks a build
//! strategy per target (native, containerized, or unsupported), builds each
//! target in turn without letting one failure stop the rest, gzips the
//! successes into a versioned layout and publishes that layout.
//!
//! # Architecture
//!
//! ```text
//! ReleaseRequest
//!     │
//!     ├── targets::select_targets        (host::describe_host)
//!     ├── batch::run_all_with
//!     │       └── dispatch::Dispatcher   (registry::capability_of)
//!     │               ├── build::NativeBuilder     (+ build::CrossCompileParameters)
//!     │               └── build::ContainerBuilder
//!     ├── package::ArtifactPackager      <root>/<version>/<os_arch>/<name>.gz
//!     ├── manifest::RunManifest          <root>/<version>/manifest.json
//!     └── publish::Publisher             sync + public-read grant
//! ```
//!
//! Every external program goes through [`process::CommandRunner`], so the
//! whole pipeline runs against fakes in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use release_builder::config::ReleaseConfig;
//! use release_builder::process::SystemRunner;
//! use release_builder::publish::CommandPublisher;
//! use release_builder::release::{run_release, ReleasePipeline, ReleaseRequest};
//!
//! let config = ReleaseConfig::load(None, &std::env::current_dir()?)?;
//! let ctx = config.build_context();
//! let publisher = CommandPublisher::new(&SystemRunner, config.publish.sync.clone(), config.publish.grant.clone());
//! let pipeline = ReleasePipeline {
//!     ctx: &ctx,
//!     container: &config.container,
//!     output_root: &config.output_root,
//!     runner: &SystemRunner,
//!     publisher: &publisher,
//! };
//! let report = run_release(&pipeline, release_builder::describe_host(), &ReleaseRequest {
//!     targets: vec![],
//!     version: "v0.1.2".into(),
//!     upload: false,
//!     destination: None,
//! })?;
//! ```

pub mod batch;
pub mod build;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod host;
pub mod logging;
pub mod manifest;
pub mod package;
pub mod platform;
pub mod preflight;
pub mod process;
pub mod publish;
pub mod registry;
pub mod release;
pub mod targets;

pub use batch::{run_all, BatchSummary, ResultMap};
pub use build::{BuildError, BuildOutcome, BuildResult, ErrorKind};
pub use context::{BuildContext, BuildDirLease};
pub use dispatch::Dispatcher;
pub use host::{describe_host, detect_host};
pub use package::{ArtifactPackager, OutputArtifact};
pub use platform::{Arch, HostPlatform, Os, PlatformIdentifier};
pub use registry::{capability_of, BuildStrategy};
pub use release::{run_release, ReleasePipeline, ReleaseReport, ReleaseRequest};
pub use targets::select_targets;
