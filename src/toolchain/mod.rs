//! External compiler invocation for the build-from-source strategy.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::ProvisionError;
use crate::platform::TargetTriple;

/// Cross-compilation target handed to the compiler.
///
/// This is the only place that knows how a target is spelled in the child
/// environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossTarget {
    pub goos: &'static str,
    pub goarch: &'static str,
}

impl CrossTarget {
    pub fn env(&self) -> [(&'static str, &'static str); 2] {
        [("GOOS", self.goos), ("GOARCH", self.goarch)]
    }
}

impl From<&TargetTriple> for CrossTarget {
    fn from(target: &TargetTriple) -> Self {
        Self {
            goos: target.os.as_str(),
            goarch: target.arch.as_str(),
        }
    }
}

/// Trait for producing a binary from an extracted source tree.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolchainBuilder: Send + Sync {
    /// Check that the compiler can be invoked at all.
    async fn probe(&self) -> Result<()>;

    /// Compile the entry point under `source_root` for `target`, writing the
    /// binary to `output`.
    async fn build(&self, source_root: &Path, target: &CrossTarget, output: &Path)
    -> Result<PathBuf>;
}

/// The Go toolchain (`go build`).
#[derive(Debug, Clone)]
pub struct GoToolchain {
    program: String,
    entry_point: String,
}

impl GoToolchain {
    /// `entry_point` is the package to build, relative to the source root.
    pub fn new(program: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            entry_point: entry_point.into(),
        }
    }

    /// Builds `./cmd/<binary_name>` with the `go` found on `PATH`.
    pub fn for_binary(binary_name: &str) -> Self {
        Self::new("go", format!("./cmd/{}", binary_name))
    }

    fn missing(&self) -> ProvisionError {
        ProvisionError::ToolchainMissing {
            program: self.program.clone(),
        }
    }
}

#[async_trait]
impl ToolchainBuilder for GoToolchain {
    #[tracing::instrument(skip(self))]
    async fn probe(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                debug!("{} help exited with {}", self.program, status);
                Err(self.missing().into())
            }
            Err(e) => {
                debug!("Failed to spawn {}: {}", self.program, e);
                Err(self.missing().into())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn build(
        &self,
        source_root: &Path,
        target: &CrossTarget,
        output: &Path,
    ) -> Result<PathBuf> {
        eprintln!(
            "    building {} (GOOS={} GOARCH={}) in {}",
            self.entry_point,
            target.goos,
            target.goarch,
            source_root.display()
        );

        let status = Command::new(&self.program)
            .arg("build")
            .arg("-o")
            .arg(output)
            .arg(&self.entry_point)
            .current_dir(source_root)
            .envs(target.env())
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                debug!("Failed to spawn {}: {}", self.program, e);
                self.missing()
            })?;

        if !status.success() {
            return Err(ProvisionError::Toolchain {
                program: self.program.clone(),
                status: status.code(),
            }
            .into());
        }

        info!("Built {:?}.", output);
        Ok(output.to_path_buf())
    }
}
