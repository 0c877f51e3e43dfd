//! Host platform detection.
//!
//! Runs `uname -s` / `uname -m` and maps the raw kernel name and machine
//! strings onto the closed platform set. `RELEASE_BUILDER_HOST` forces
//! the answer, which CI runners under emulation need.

use crate::platform::{Arch, HostPlatform, Os, PlatformIdentifier};
use crate::process::{CommandRunner, ExternalCommand, SystemRunner};
use tracing::{debug, warn};

/// Environment variable that overrides host detection.
pub const HOST_OVERRIDE_ENV: &str = "RELEASE_BUILDER_HOST";

/// Describe the machine running the orchestration.
pub fn describe_host() -> HostPlatform {
    if let Ok(forced) = std::env::var(HOST_OVERRIDE_ENV) {
        match forced.parse::<PlatformIdentifier>() {
            Ok(platform) => {
                debug!(host = %platform, "host forced via {HOST_OVERRIDE_ENV}");
                return HostPlatform::Known(platform);
            }
            Err(e) => warn!("ignoring {HOST_OVERRIDE_ENV}: {e:#}"),
        }
    }
    detect_host(&SystemRunner)
}

/// Ask `uname` through `runner`, falling back to the compile-time target
/// when it cannot be run.
pub fn detect_host(runner: &dyn CommandRunner) -> HostPlatform {
    let sysname = uname(runner, "-s").unwrap_or_else(|| std::env::consts::OS.to_string());
    let machine = uname(runner, "-m").unwrap_or_else(|| std::env::consts::ARCH.to_string());
    let host = classify_host(&sysname, &machine);
    debug!(%sysname, %machine, %host, "detected host platform");
    host
}

fn uname(runner: &dyn CommandRunner, flag: &str) -> Option<String> {
    let output = match runner.run(&ExternalCommand::new("uname").arg(flag)) {
        Ok(output) => output,
        Err(e) => {
            debug!("uname {flag} unavailable: {e:#}");
            return None;
        }
    };
    let value = output.stdout.trim();
    (output.success() && !value.is_empty()).then(|| value.to_string())
}

/// Map raw OS name and machine architecture strings to a host platform.
pub fn classify_host(sysname: &str, machine: &str) -> HostPlatform {
    let os = match sysname.trim().to_ascii_lowercase().as_str() {
        "darwin" | "macos" => Some(Os::Macos),
        "linux" => Some(Os::Linux),
        _ => None,
    };
    let arch = match machine.trim().to_ascii_lowercase().as_str() {
        "x86_64" | "amd64" => Some(Arch::Amd64),
        "arm64" | "aarch64" => Some(Arch::Arm64),
        _ => None,
    };

    match (os, arch) {
        (Some(os), Some(arch)) => HostPlatform::Known(PlatformIdentifier::new(os, arch)),
        _ => HostPlatform::Unknown,
    }
}
