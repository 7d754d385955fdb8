//! Shared storage reached through local EFS mounts.
//!
//! The Lambda mounts each file system it may write to under a local
//! directory; with `fs-1` at `/mnt/efs`, the EFS path
//! `fs-1:/scratch/run-1/.demand.env` is written to
//! `/mnt/efs/scratch/run-1/.demand.env`. File systems without a local mount
//! are not writable.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{EfsPath, MountConfig};
use crate::storage::SharedStorage;

/// Local mount backend.
#[derive(Debug, Clone, Default)]
pub struct MountedStorage {
    roots: IndexMap<String, PathBuf>,
}

impl MountedStorage {
    /// Storage with no file systems mounted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage for the local mounts listed in `config`.
    pub fn from_config(config: &MountConfig) -> Self {
        config
            .local_mounts
            .iter()
            .fold(Self::new(), |storage, (id, root)| {
                storage.with_file_system(id.clone(), root.clone())
            })
    }

    /// Mount one file system at its own local root.
    pub fn with_file_system(
        mut self,
        file_system_id: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Self {
        self.roots.insert(file_system_id.into(), root.into());
        self
    }

    /// Whether `file_system_id` has a local mount.
    pub fn is_mounted(&self, file_system_id: &str) -> bool {
        self.roots.contains_key(file_system_id)
    }

    /// Local path for an EFS path.
    pub fn local_path(&self, path: &EfsPath) -> Result<PathBuf> {
        let root = self.roots.get(path.file_system_id()).ok_or_else(|| {
            AppError::config(format!(
                "no local mount for file system {}",
                path.file_system_id()
            ))
        })?;

        let mut local = root.clone();
        for component in path.path().components() {
            match component {
                Component::Normal(part) => local.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(AppError::invalid_input(format!(
                        "EFS path {path} escapes the mount root"
                    )));
                }
            }
        }
        Ok(local)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.ensure_dir(path).await?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl SharedStorage for MountedStorage {
    async fn write_file(&self, path: &EfsPath, content: &str) -> Result<()> {
        let local = self.local_path(path)?;
        self.write_bytes(&local, content.as_bytes()).await?;
        debug!("Wrote {} bytes to {} ({})", content.len(), path, local.display());
        Ok(())
    }
}
