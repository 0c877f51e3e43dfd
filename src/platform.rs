//! Platform identifiers.
//!
//! A [`PlatformIdentifier`] is the closed product of [`Os`] and [`Arch`]. Its
//! canonical tag (`os_arch`, e.g. `osx_arm64`) names the artifact directory in
//! the publish layout and is what the CLI accepts.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Os {
    Linux,
    Macos,
}

impl Os {
    pub const ALL: [Os; 2] = [Os::Macos, Os::Linux];

    /// Tag used in platform identifiers.
    pub const fn tag(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "osx",
        }
    }

    fn parse_tag(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "linux" => Some(Os::Linux),
            "osx" | "macos" | "darwin" => Some(Os::Macos),
            _ => None,
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::Amd64, Arch::Arm64];

    /// Tag used in platform identifiers and container `--platform` pins.
    pub const fn tag(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Name the compiler toolchains use for this architecture.
    pub const fn toolchain_name(self) -> &'static str {
        match self {
            Arch::Amd64 => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    fn parse_tag(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" | "x64" => Some(Arch::Amd64),
            "arm64" | "aarch64" => Some(Arch::Arm64),
            _ => None,
        }
    }
}

/// A build target or host: operating system x architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlatformIdentifier {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformIdentifier {
    pub const LINUX_AMD64: Self = Self::new(Os::Linux, Arch::Amd64);
    pub const LINUX_ARM64: Self = Self::new(Os::Linux, Arch::Arm64);
    pub const OSX_AMD64: Self = Self::new(Os::Macos, Arch::Amd64);
    pub const OSX_ARM64: Self = Self::new(Os::Macos, Arch::Arm64);

    /// Every identifier in the closed set, macos first.
    pub const ALL: [Self; 4] = [
        Self::OSX_AMD64,
        Self::OSX_ARM64,
        Self::LINUX_AMD64,
        Self::LINUX_ARM64,
    ];

    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Canonical `os_arch` tag.
    pub fn tag(&self) -> String {
        format!("{}_{}", self.os.tag(), self.arch.tag())
    }

    /// Parse a list of CLI tokens, rejecting the first unknown one.
    pub fn parse_all<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Self>> {
        tokens.iter().map(|t| t.as_ref().parse()).collect()
    }
}

impl fmt::Display for PlatformIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os.tag(), self.arch.tag())
    }
}

impl FromStr for PlatformIdentifier {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let parsed = raw
            .trim()
            .split_once(['_', '-'])
            .and_then(|(os, arch)| Some(Self::new(Os::parse_tag(os)?, Arch::parse_tag(arch)?)));

        match parsed {
            Some(platform) => Ok(platform),
            None => bail!(
                "unknown platform '{}'; expected one of: {}",
                raw,
                Self::ALL
                    .iter()
                    .map(|p| p.tag())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// The machine running the orchestration.
///
/// `Unknown` means the raw OS/arch pair is outside the closed set: no native
/// capability at all, and only linux targets remain reachable (via container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPlatform {
    Known(PlatformIdentifier),
    Unknown,
}

impl HostPlatform {
    pub fn platform(&self) -> Option<PlatformIdentifier> {
        match self {
            HostPlatform::Known(p) => Some(*p),
            HostPlatform::Unknown => None,
        }
    }

    pub fn os(&self) -> Option<Os> {
        self.platform().map(|p| p.os)
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPlatform::Known(p) => p.fmt(f),
            HostPlatform::Unknown => f.write_str("unknown"),
        }
    }
}
