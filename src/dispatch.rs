//! Build strategy dispatch.
//!
//! The one place where the registry's policy turns into work: new target
//! support lands in [`capability_of`] and here, never in the builders.

use tracing::{info, warn};

use crate::build::{BuildError, BuildResult, ContainerBuilder, NativeBuilder};
use crate::platform::{HostPlatform, PlatformIdentifier};
use crate::registry::{capability_of, BuildStrategy};

pub struct Dispatcher<'a> {
    native: NativeBuilder<'a>,
    container: ContainerBuilder<'a>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(native: NativeBuilder<'a>, container: ContainerBuilder<'a>) -> Self {
        Self { native, container }
    }

    /// Route `target` to the builder its strategy requires.
    ///
    /// Unsupported targets fail immediately without invoking any builder.
    pub fn dispatch(&self, target: PlatformIdentifier, host: HostPlatform) -> BuildResult {
        let strategy = capability_of(target, host);
        info!(platform = %target, %host, %strategy, "dispatching");

        match strategy {
            BuildStrategy::Native => self.native.build(target, host),
            BuildStrategy::Container => self.container.build(target),
            BuildStrategy::Unsupported => {
                warn!(platform = %target, %host, "no build strategy; skipping");
                BuildResult::failure(
                    target,
                    BuildStrategy::Unsupported,
                    BuildError::Unsupported(format!("{target} cannot be built on host {host}")),
                )
            }
        }
    }
}
