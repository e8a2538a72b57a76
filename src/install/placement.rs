use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::platform::TargetOs;
use crate::runtime::Runtime;

const EXECUTABLE_MODE: u32 = 0o755;

/// Moves a produced binary to its final location.
///
/// The destination name is only ever written by a rename. When the produced
/// file cannot be renamed directly (scratch on another file system), it is
/// copied next to the destination first and that copy is renamed into place.
/// On POSIX targets the binary ends up with mode 0755; Windows targets keep
/// whatever permissions the file system gives them.
#[tracing::instrument(skip(runtime))]
pub fn place_binary<R: Runtime>(
    runtime: &R,
    produced: &Path,
    destination: &Path,
    os: TargetOs,
) -> Result<()> {
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        runtime
            .create_dir_all(parent)
            .with_context(|| format!("Failed to create install directory {:?}", parent))?;
    }

    if os.is_posix() {
        runtime.set_permissions(produced, EXECUTABLE_MODE)?;
    }

    if let Err(e) = runtime.rename(produced, destination) {
        debug!("Direct rename failed ({:#}), staging next to destination", e);
        let staging = staging_path(destination);
        if let Err(e) = runtime.copy(produced, &staging) {
            let _ = runtime.remove_file(&staging);
            return Err(e).with_context(|| format!("Failed to stage binary at {:?}", staging));
        }
        if let Err(e) = runtime.rename(&staging, destination) {
            let _ = runtime.remove_file(&staging);
            return Err(e).with_context(|| format!("Failed to install {:?}", destination));
        }
    }

    info!("Installed {:?}.", destination);
    Ok(())
}

/// Sibling path used while copying: `<dir>/.<name>.tmp`.
fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.tmp", name))
}
