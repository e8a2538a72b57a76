//! Platform tag resolution
//!
//! This module maps a packaging platform tag (`manylinux_2_17_x86_64`,
//! `macosx_11_0_arm64`, `win_amd64`, ...) to the operating system and
//! architecture pair the upstream release is published for.

mod detection;

use anyhow::Result;
use log::warn;
use std::fmt;

use crate::error::ProvisionError;

pub use detection::{native_tag, normalize_tag};

/// Operating system of a release target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOs {
    Linux,
    Darwin,
    Windows,
}

impl TargetOs {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOs::Linux => "linux",
            TargetOs::Darwin => "darwin",
            TargetOs::Windows => "windows",
        }
    }

    /// Whether binaries for this OS need the POSIX executable bits.
    pub fn is_posix(&self) -> bool {
        !matches!(self, TargetOs::Windows)
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture of a release target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetArch {
    Amd64,
    Arm64,
}

impl TargetArch {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetArch::Amd64 => "amd64",
            TargetArch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved `{os, arch}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetTriple {
    pub os: TargetOs,
    pub arch: TargetArch,
}

impl TargetTriple {
    pub fn new(os: TargetOs, arch: TargetArch) -> Self {
        Self { os, arch }
    }
}

impl fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Resolves a platform tag to the target the binary must be built for.
///
/// Matching is case-insensitive and works on tag families:
/// - `manylinux*`, `musllinux*`, `linux_*`
/// - `macosx_*`
/// - `win_*`
///
/// A tag outside these families, or a family member whose CPU is not
/// published upstream, is an error. There is no fallback target.
///
/// `macosx_*_universal2` resolves to `darwin/amd64`: only one architecture is
/// built, so a universal wheel will not actually run natively on arm64.
pub fn resolve(platform_tag: &str) -> Result<TargetTriple> {
    let tag = platform_tag.trim();
    if tag.is_empty() {
        return Err(ProvisionError::Config("platform tag is empty".to_string()).into());
    }
    if !tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(ProvisionError::Config(format!(
            "malformed platform tag: {:?}",
            platform_tag
        ))
        .into());
    }

    let p = tag.to_lowercase();
    let unsupported = || -> anyhow::Error {
        ProvisionError::UnsupportedPlatform {
            tag: platform_tag.to_string(),
        }
        .into()
    };

    if p.starts_with("manylinux") || p.starts_with("musllinux") || p.starts_with("linux_") {
        if p.contains("x86_64") || p.contains("amd64") {
            return Ok(TargetTriple::new(TargetOs::Linux, TargetArch::Amd64));
        }
        if p.contains("aarch64") || p.contains("arm64") {
            return Ok(TargetTriple::new(TargetOs::Linux, TargetArch::Arm64));
        }
        return Err(unsupported());
    }

    if p.starts_with("macosx_") {
        if p.contains("universal2") {
            warn!(
                "{} is a multi-architecture tag; only a darwin/amd64 binary will be provided",
                platform_tag
            );
            return Ok(TargetTriple::new(TargetOs::Darwin, TargetArch::Amd64));
        }
        if p.contains("x86_64") || p.contains("intel") {
            return Ok(TargetTriple::new(TargetOs::Darwin, TargetArch::Amd64));
        }
        if p.contains("arm64") {
            return Ok(TargetTriple::new(TargetOs::Darwin, TargetArch::Arm64));
        }
        return Err(unsupported());
    }

    if p.starts_with("win_") {
        if p.contains("amd64") || p.contains("x86_64") {
            return Ok(TargetTriple::new(TargetOs::Windows, TargetArch::Amd64));
        }
        return Err(unsupported());
    }

    Err(unsupported())
}
