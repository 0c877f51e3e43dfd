//! Target selection.

use crate::platform::{HostPlatform, Os, PlatformIdentifier};

/// Resolve the targets to build.
///
/// An explicit request passes through untouched; supportability is judged per
/// target by the dispatcher so a bad entry fails alone instead of blocking the
/// batch. With nothing requested, a macos host builds everything and any other
/// host (including an unknown one) builds both linux architectures.
pub fn select_targets(
    requested: &[PlatformIdentifier],
    host: HostPlatform,
) -> Vec<PlatformIdentifier> {
    if !requested.is_empty() {
        return requested.to_vec();
    }

    match host.os() {
        Some(Os::Macos) => PlatformIdentifier::ALL.to_vec(),
        Some(Os::Linux) | None => vec![
            PlatformIdentifier::LINUX_AMD64,
            PlatformIdentifier::LINUX_ARM64,
        ],
    }
}
