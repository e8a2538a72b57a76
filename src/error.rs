//! Failure taxonomy for provisioning.
//!
//! Every operation returns `anyhow::Result`; the root cause of a classified
//! failure is always a [`ProvisionError`], so callers can branch on it with
//! [`ProvisionError::find`] even after context has been attached.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// Required input missing or malformed (platform tag, version, manifest)
    Config(String),
    /// Tag is well formed but maps to no supported target
    UnsupportedPlatform { tag: String },
    /// Transport failure or unexpected HTTP status
    Network { url: String, reason: String },
    /// The server explicitly reported the resource as absent
    NotFound { url: String },
    /// Malformed archive, missing entry, or an entry escaping the destination
    Extraction { archive: PathBuf, reason: String },
    /// The compiler could not be invoked at all
    ToolchainMissing { program: String },
    /// The compiler ran and exited unsuccessfully
    Toolchain {
        program: String,
        status: Option<i32>,
    },
}

impl ProvisionError {
    /// Finds the classified failure anywhere in an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&ProvisionError> {
        err.chain().find_map(|cause| cause.downcast_ref::<ProvisionError>())
    }

    /// Whether a caller may reasonably try the same request again.
    ///
    /// Only transport failures qualify; a missing asset stays missing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Network { .. })
    }

    pub(crate) fn extraction(archive: &std::path::Path, reason: impl Into<String>) -> Self {
        ProvisionError::Extraction {
            archive: archive.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ProvisionError::UnsupportedPlatform { tag } => {
                write!(f, "Unsupported platform tag: {:?}", tag)
            }
            ProvisionError::Network { url, reason } => {
                write!(f, "Network error while fetching {}: {}", url, reason)
            }
            ProvisionError::NotFound { url } => write!(f, "Not found: {}", url),
            ProvisionError::Extraction { archive, reason } => {
                write!(f, "Failed to extract {}: {}", archive.display(), reason)
            }
            ProvisionError::ToolchainMissing { program } => {
                write!(f, "Compiler '{}' is not available", program)
            }
            ProvisionError::Toolchain { program, status } => match status {
                Some(code) => write!(f, "'{}' exited with status {}", program, code),
                None => write!(f, "'{}' was terminated by a signal", program),
            },
        }
    }
}

impl std::error::Error for ProvisionError {}
