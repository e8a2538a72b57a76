use crate::error::ProvisionError;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use super::{ArchiveExtractor, ExtractMode, Extracted};

/// Extractor for .tar.gz archives
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        dest_root: &Path,
        mode: &ExtractMode,
    ) -> Result<Extracted> {
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        let mut archive = Archive::new(GzDecoder::new(file));

        match mode {
            ExtractMode::SingleBinary { name } => {
                extract_binary(runtime, &mut archive, archive_path, dest_root, name)
            }
            ExtractMode::SourceTree => extract_tree(runtime, &mut archive, archive_path, dest_root),
        }
    }
}

fn extract_binary<R: Runtime, A: Read>(
    runtime: &R,
    archive: &mut Archive<A>,
    archive_path: &Path,
    dest_root: &Path,
    name: &str,
) -> Result<Extracted> {
    let mut name_components = Path::new(name).components();
    if !matches!(
        (name_components.next(), name_components.next()),
        (Some(Component::Normal(_)), None)
    ) {
        return Err(ProvisionError::Config(format!("invalid binary name: {:?}", name)).into());
    }

    debug!("Looking for {} in {:?}...", name, archive_path);
    let entries = archive
        .entries()
        .map_err(|e| ProvisionError::extraction(archive_path, e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ProvisionError::extraction(archive_path, e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_path = entry
            .path()
            .map_err(|e| ProvisionError::extraction(archive_path, e.to_string()))?
            .into_owned();
        if entry_path.file_name() != Some(OsStr::new(name)) {
            continue;
        }

        debug!("Found {:?}", entry_path);
        let out_path = dest_root.join(name);
        runtime
            .create_dir_all(dest_root)
            .map_err(|e| write_failure(archive_path, e))?;
        let mut dest_file = runtime
            .create_file(&out_path)
            .map_err(|e| write_failure(archive_path, e))?;
        std::io::copy(&mut entry, &mut dest_file)
            .map_err(|e| ProvisionError::extraction(archive_path, e.to_string()))?;

        info!("Extracted {:?}.", out_path);
        return Ok(Extracted::Binary(out_path));
    }

    Err(ProvisionError::extraction(archive_path, format!("archive has no '{}' entry", name)).into())
}

fn extract_tree<R: Runtime, A: Read>(
    runtime: &R,
    archive: &mut Archive<A>,
    archive_path: &Path,
    dest_root: &Path,
) -> Result<Extracted> {
    debug!("Extracting source tree to {:?}...", dest_root);
    runtime.create_dir_all(dest_root)?;

    let entries = archive
        .entries()
        .map_err(|e| ProvisionError::extraction(archive_path, e.to_string()))?;

    let mut files = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| ProvisionError::extraction(archive_path, e.to_string()))?;
        let entry_type = entry.header().entry_type();
        let entry_path = entry
            .path()
            .map_err(|e| ProvisionError::extraction(archive_path, e.to_string()))?
            .into_owned();

        // Links, devices and metadata records are never materialized.
        if !entry_type.is_file() && !entry_type.is_dir() {
            debug!("Skipping {:?} entry {:?}", entry_type, entry_path);
            continue;
        }

        let relative = match strip_top_level(&entry_path)
            .map_err(|reason| ProvisionError::extraction(archive_path, reason))?
        {
            Some(relative) => relative,
            None => continue,
        };
        let full_path = dest_root.join(&relative);

        if entry_type.is_dir() {
            runtime
                .create_dir_all(&full_path)
                .map_err(|e| write_failure(archive_path, e))?;
            continue;
        }

        if let Some(parent) = full_path.parent() {
            runtime
                .create_dir_all(parent)
                .map_err(|e| write_failure(archive_path, e))?;
        }
        {
            let mut dest_file = runtime
                .create_file(&full_path)
                .map_err(|e| write_failure(archive_path, e))?;
            std::io::copy(&mut entry, &mut dest_file)
                .map_err(|e| ProvisionError::extraction(archive_path, e.to_string()))?;
        }

        // Keep the permission bits only; setuid/setgid/sticky are dropped.
        #[cfg(unix)]
        if let Ok(mode) = entry.header().mode()
            && let Err(e) = runtime.set_permissions(&full_path, mode & 0o777)
        {
            debug!("Failed to set permissions on {:?}: {}", full_path, e);
        }

        files += 1;
    }

    info!("Extracted {} files.", files);
    Ok(Extracted::Tree {
        root: dest_root.to_path_buf(),
        files,
    })
}

/// An entry that cannot be materialized, e.g. a path running through a file
/// written by an earlier entry.
fn write_failure(archive_path: &Path, err: anyhow::Error) -> ProvisionError {
    ProvisionError::extraction(archive_path, format!("{:#}", err))
}

/// Drops the single wrapping directory from an entry path.
///
/// Returns `Ok(None)` for entries that are nothing but the wrapper itself, and
/// `Err` for paths that could land outside the destination.
fn strip_top_level(entry_path: &Path) -> std::result::Result<Option<PathBuf>, String> {
    let mut parts = Vec::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!(
                    "entry {:?} contains a parent directory reference",
                    entry_path
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("entry {:?} is an absolute path", entry_path));
            }
        }
    }

    if parts.len() < 2 {
        return Ok(None);
    }
    Ok(Some(parts[1..].iter().collect()))
}
