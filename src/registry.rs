//! Platform registry: which build strategy reaches a target from a host.
//!
//! The capability table is an exhaustive match over the platform enums, so a
//! new OS or architecture fails to compile until it is placed in the table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::platform::{HostPlatform, Os, PlatformIdentifier};

/// How a target gets built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStrategy {
    /// Toolchain runs directly on the host, cross-compiling when needed.
    Native,
    /// Toolchain runs inside an architecture-pinned linux container.
    Container,
    /// No viable path from this host.
    Unsupported,
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStrategy::Native => "native",
            BuildStrategy::Container => "container",
            BuildStrategy::Unsupported => "unsupported",
        })
    }
}

/// Strategy required to build `target` on `host`.
///
/// macos targets need the Apple SDK, so they build natively on a macos host
/// (either architecture) and are never eligible for containers. Linux targets
/// build natively only on an identical host and go through a container
/// otherwise, including from an unknown host.
pub fn capability_of(target: PlatformIdentifier, host: HostPlatform) -> BuildStrategy {
    if host.platform() == Some(target) {
        return BuildStrategy::Native;
    }

    match target.os {
        Os::Macos => match host.os() {
            Some(Os::Macos) => BuildStrategy::Native,
            Some(Os::Linux) | None => BuildStrategy::Unsupported,
        },
        Os::Linux => BuildStrategy::Container,
    }
}
