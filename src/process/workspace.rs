//! Per-invocation scratch directories.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory owned by one subprocess invocation.
///
/// The directory is removed when the workspace is closed or dropped,
/// including when the owning future is cancelled.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    /// Create a fresh directory under the system temp dir.
    pub fn new(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        tracing::trace!(path = %dir.path().display(), "Created workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the workspace. Does not create the file.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory, reporting any failure.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::trace!(path = %path.display(), "Removed workspace");
        Ok(())
    }
}
