use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Result, VidscribeError};

/// Scratch directory shared by every task of one run.
///
/// Backed by a `TempDir`, so the directory and everything in it is removed
/// when the workspace is dropped, whether the batch succeeded, some tasks
/// failed, or the run unwound early.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vidscribe-");

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| VidscribeError::Setup(format!("Failed to create workspace: {}", e)))?;

        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the workspace now and report failures instead of ignoring them.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
            VidscribeError::Io(e)
        })?;
        debug!("Removed workspace {}", path.display());
        Ok(())
    }
}
