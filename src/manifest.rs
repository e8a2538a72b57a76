//! Reading the project version from `pyproject.toml`.

use anyhow::Result;
use log::debug;
use serde::Deserialize;
use std::path::Path;

use crate::error::ProvisionError;
use crate::release::ReleaseVersion;
use crate::runtime::Runtime;

#[derive(Debug, Deserialize)]
struct PyProject {
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    version: Option<String>,
}

/// Reads `[project].version` from the manifest at `path`, normalized to its
/// base release.
#[tracing::instrument(skip(runtime))]
pub fn read_project_version<R: Runtime>(runtime: &R, path: &Path) -> Result<ReleaseVersion> {
    let content = runtime.read_to_string(path).map_err(|e| {
        ProvisionError::Config(format!("cannot read manifest {}: {:#}", path.display(), e))
    })?;

    let manifest: PyProject = toml::from_str(&content).map_err(|e| {
        ProvisionError::Config(format!("invalid manifest {}: {}", path.display(), e))
    })?;

    let raw = manifest
        .project
        .and_then(|p| p.version)
        .ok_or_else(|| {
            ProvisionError::Config(format!(
                "{} has no [project].version; pass --release-version",
                path.display()
            ))
        })?;

    let version = ReleaseVersion::parse(&raw)?;
    debug!("Manifest version {:?} normalized to {}", raw, version);
    Ok(version)
}
