mod tar_gz;

use crate::runtime::Runtime;
use anyhow::Result;
use std::path::{Path, PathBuf};

pub use tar_gz::TarGzExtractor;

/// What to take out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractMode {
    /// Only the regular file whose name is `name`, written to `<dest>/<name>`
    SingleBinary { name: String },
    /// Regular files and directories, with the wrapping top-level directory removed
    SourceTree,
}

/// What an extraction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Binary(PathBuf),
    Tree { root: PathBuf, files: usize },
}

impl Extracted {
    /// Path to hand to the next pipeline step.
    pub fn path(&self) -> &Path {
        match self {
            Extracted::Binary(path) => path,
            Extracted::Tree { root, .. } => root,
        }
    }
}

/// Trait for archive extractors
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive_path` under `dest_root` according to `mode`.
    ///
    /// Implementations never write outside `dest_root`.
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        dest_root: &Path,
        mode: &ExtractMode,
    ) -> Result<Extracted>;
}
