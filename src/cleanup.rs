use anyhow::Result;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::runtime::Runtime;

const SCRATCH_PREFIX: &str = "gnetcli-provision-";

/// Tracks paths that need cleanup on interruption
#[derive(Default)]
pub struct CleanupContext {
    #[cfg(test)]
    pub paths: Vec<PathBuf>,
    #[cfg(not(test))]
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path to be cleaned up on interruption
    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Remove a path from cleanup list (e.g., when it was already removed)
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Clean up all registered paths
    pub fn cleanup(&self) {
        for path in &self.paths {
            debug!("Cleaning up: {:?}", path);
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(path);
            } else {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// Type alias for shared cleanup context
pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

/// Create a new shared cleanup context
pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Exclusively owned temporary directory for one provisioning run.
///
/// The directory is registered with the cleanup context while it exists and
/// removed recursively when the workspace is dropped, whatever the outcome
/// of the run.
pub struct ScratchWorkspace<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
    cleanup_ctx: SharedCleanupContext,
}

impl<'a, R: Runtime> ScratchWorkspace<'a, R> {
    pub fn create(
        runtime: &'a R,
        parent: Option<PathBuf>,
        cleanup_ctx: SharedCleanupContext,
    ) -> Result<Self> {
        let path = runtime.create_temp_dir(parent, SCRATCH_PREFIX)?;
        debug!("Created scratch workspace {:?}", path);
        if let Ok(mut ctx) = cleanup_ctx.lock() {
            ctx.add(path.clone());
        }
        Ok(Self {
            runtime,
            path,
            cleanup_ctx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }
}

impl<R: Runtime> Drop for ScratchWorkspace<'_, R> {
    fn drop(&mut self) {
        debug!("Removing scratch workspace {:?}", self.path);
        if let Err(e) = self.runtime.remove_dir_all(&self.path) {
            warn!("Failed to remove scratch workspace {:?}: {:#}", self.path, e);
            return;
        }
        if let Ok(mut ctx) = self.cleanup_ctx.lock() {
            ctx.remove(&self.path);
        }
    }
}
