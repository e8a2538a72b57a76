//! Release naming: versions, prebuilt assets and source tarballs.

use anyhow::Result;
use std::fmt;
use std::str::FromStr;

use crate::config::UpstreamConfig;
use crate::error::ProvisionError;
use crate::platform::TargetTriple;

/// A normalized release version (`1.2.3`), without the `v` tag prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseVersion(String);

impl ReleaseVersion {
    /// Normalizes a version string to its base release.
    ///
    /// A leading `v` is dropped, and so is everything after the dotted numeric
    /// release segment: pre-release, post-release, dev and local labels.
    /// An epoch (`1!2.0`) is kept.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let unprefixed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let (epoch, rest) = match unprefixed.split_once('!') {
            Some((epoch, rest)) if !epoch.is_empty() && epoch.chars().all(|c| c.is_ascii_digit()) => {
                (Some(epoch), rest)
            }
            _ => (None, unprefixed),
        };

        let mut segments = Vec::new();
        for part in rest.split('.') {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            let complete = digits.len() == part.len();
            segments.push(trim_leading_zeros(&digits));
            if !complete {
                break;
            }
        }

        if segments.is_empty() {
            return Err(ProvisionError::Config(format!("invalid release version: {:?}", raw)).into());
        }

        let release = segments.join(".");
        Ok(match epoch {
            Some(epoch) if trim_leading_zeros(epoch) != "0" => {
                Self(format!("{}!{}", trim_leading_zeros(epoch), release))
            }
            _ => Self(release),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The git tag upstream publishes this version under.
    pub fn tag(&self) -> String {
        format!("v{}", self.0)
    }
}

fn trim_leading_zeros(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

impl FromStr for ReleaseVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A prebuilt archive published on the upstream release page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
}

impl ReleaseAsset {
    /// `<binary>-v<version>-<os>-<arch>.tar.gz` under the `v<version>` release.
    pub fn for_target(
        upstream: &UpstreamConfig,
        version: &ReleaseVersion,
        target: &TargetTriple,
    ) -> Self {
        let name = format!(
            "{}-{}-{}-{}.tar.gz",
            upstream.binary_name,
            version.tag(),
            target.os,
            target.arch
        );
        let url = format!(
            "{}/{}/releases/download/{}/{}",
            upstream.release_host.trim_end_matches('/'),
            upstream.repo,
            version.tag(),
            name
        );
        Self { name, url }
    }
}

/// URL of the source tarball the hosting API generates for a version tag.
pub fn source_tarball_url(upstream: &UpstreamConfig, version: &ReleaseVersion) -> String {
    format!(
        "{}/repos/{}/tarball/{}",
        upstream.api_url.trim_end_matches('/'),
        upstream.repo,
        version.tag()
    )
}
