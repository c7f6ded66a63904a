use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};

/// private scratch directory, removed with everything in it when dropped
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// create a fresh directory under the system temp dir
    pub fn new(prefix: &str) -> Result<Self> {
        Self::new_in(&std::env::temp_dir(), prefix)
    }

    /// create a fresh directory under `base`
    pub fn new_in(base: &Path, prefix: &str) -> Result<Self> {
        let path = base.join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        fs::create_dir(&path).with_path(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// create a uniquely named child directory
    pub fn subdir(&self, prefix: &str) -> Result<PathBuf> {
        let path = self
            .path
            .join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        fs::create_dir(&path).with_path(&path)?;
        Ok(path)
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove work dir {}: {}", self.path.display(), e);
            }
        }
    }
}
