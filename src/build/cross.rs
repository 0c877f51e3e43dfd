//! Cross-compilation parameters for native builds.
//!
//! Only a native build whose target shares the host's OS but not its
//! architecture gets overrides. The override names below match the macos
//! CMake/vcpkg toolchain; the mechanism is what matters, not the literal keys.

use std::collections::BTreeMap;

use crate::platform::{Arch, HostPlatform, Os, PlatformIdentifier};

/// Toolchain overrides injected into the build command's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossCompileParameters {
    /// Architecture the toolchain should emit code for.
    pub target_arch: Arch,
    /// vcpkg-style triplet for the target.
    pub target_triplet: String,
    /// vcpkg-style triplet for the machine running the toolchain.
    pub host_triplet: String,
}

impl CrossCompileParameters {
    /// Derive overrides, or `None` when no cross-compilation is involved.
    pub fn derive(target: PlatformIdentifier, host: HostPlatform) -> Option<Self> {
        let host = host.platform()?;
        if target.os != host.os || target.arch == host.arch {
            return None;
        }

        Some(Self {
            target_arch: target.arch,
            target_triplet: triplet(target),
            host_triplet: triplet(host),
        })
    }

    /// Environment variables handed to the build command.
    pub fn env(&self) -> BTreeMap<String, String> {
        let arch = self.target_arch.toolchain_name();
        BTreeMap::from([
            ("CMAKE_OSX_ARCHITECTURES".to_string(), arch.to_string()),
            ("ARCHFLAGS".to_string(), format!("-arch {arch}")),
            ("VCPKG_TARGET_TRIPLET".to_string(), self.target_triplet.clone()),
            ("VCPKG_HOST_TRIPLET".to_string(), self.host_triplet.clone()),
        ])
    }
}

fn triplet(platform: PlatformIdentifier) -> String {
    let arch = match platform.arch {
        Arch::Amd64 => "x64",
        Arch::Arm64 => "arm64",
    };
    let os = match platform.os {
        Os::Macos => "osx",
        Os::Linux => "linux",
    };
    format!("{arch}-{os}")
}
