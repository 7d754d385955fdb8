//! Storage abstractions.
//!
//! The scaffolding writes exactly one kind of file: the sourced environment
//! file placed in an execution's working directory on EFS.
//!
//! ```text
//! {scratch access point root}/
//! └── {execution_id}/
//!     └── .demand.env
//! ```

pub mod local;
#[cfg(feature = "aws")]
pub mod s3;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::EfsPath;

// Re-export for convenience
pub use local::MountedStorage;

/// Writer for files on shared (EFS) storage.
#[async_trait]
pub trait SharedStorage: Send + Sync {
    /// Create or replace the file at `path`, creating parent directories.
    async fn write_file(&self, path: &EfsPath, content: &str) -> Result<()>;
}
