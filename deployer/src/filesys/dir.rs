//! Directory operations

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;

use crate::errors::DeployerError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents). Succeeds if it already exists.
    pub async fn create(&self) -> Result<(), DeployerError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// List files in the directory with the given extension, oldest modification first
    pub async fn list_files_by_modified(&self, extension: &str) -> Result<Vec<PathBuf>, DeployerError> {
        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }

            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((modified, path));
            }
        }

        files.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}
