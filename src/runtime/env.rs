//! Environment and scratch directory operations.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn env_var_impl(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_temp_dir_impl(
        &self,
        parent: Option<PathBuf>,
        prefix: &str,
    ) -> Result<PathBuf> {
        let parent = parent.unwrap_or_else(env::temp_dir);
        // Callers hand paths inside the workspace to child processes with another cwd
        let parent = std::path::absolute(&parent)
            .with_context(|| format!("Failed to resolve scratch parent {:?}", parent))?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&parent)
            .with_context(|| format!("Failed to create scratch directory in {:?}", parent))?;
        Ok(dir.keep())
    }
}
