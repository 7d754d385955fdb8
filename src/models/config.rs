//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, Result};

/// Root scaffolding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaffoldingConfig {
    /// Environment label: tag filter for EFS lookups and job name prefix
    #[serde(default = "defaults::env_base")]
    pub env_base: String,

    /// Region exported to the job as `AWS_REGION`
    #[serde(default = "defaults::aws_region")]
    pub aws_region: String,

    /// Mount locations
    #[serde(default)]
    pub mount: MountConfig,

    /// Access point names used when a role gives no identifier
    #[serde(default)]
    pub access_points: AccessPointNames,

    /// Environment materialization settings
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Batch job settings
    #[serde(default)]
    pub batch: BatchConfig,
}

impl ScaffoldingConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Override values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(env_base) = std::env::var("ENV_BASE") {
            self.env_base = env_base;
        }

        if let Ok(region) = std::env::var("AWS_REGION").or_else(|_| std::env::var("AWS_DEFAULT_REGION")) {
            self.aws_region = region;
        }

        if let Ok(mounts) = std::env::var("EFS_LOCAL_MOUNTS") {
            for entry in mounts.split(',').filter(|entry| !entry.trim().is_empty()) {
                match parse_local_mount(entry) {
                    Ok((id, root)) => {
                        self.mount.local_mounts.insert(id, root);
                    }
                    Err(e) => warn!("Ignoring EFS_LOCAL_MOUNTS entry: {}", e),
                }
            }
        }

        if let Ok(threshold) = std::env::var("ENV_FILE_THRESHOLD_BYTES") {
            if let Ok(bytes) = threshold.parse() {
                self.environment.file_threshold_bytes = bytes;
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.env_base.trim().is_empty() {
            return Err(AppError::config("env_base is empty"));
        }
        if self.aws_region.trim().is_empty() {
            return Err(AppError::config("aws_region is empty"));
        }
        if self.environment.file_threshold_bytes == 0 {
            return Err(AppError::config(
                "environment.file_threshold_bytes must be > 0",
            ));
        }
        if self.batch.retry_attempts == 0 || self.batch.retry_attempts > 10 {
            return Err(AppError::config("batch.retry_attempts must be in 1..=10"));
        }
        for (name, path) in [
            ("mount.shared_path", &self.mount.shared_path),
            ("mount.scratch_path", &self.mount.scratch_path),
            ("mount.tmp_path", &self.mount.tmp_path),
        ] {
            if !path.is_absolute() {
                return Err(AppError::config(format!(
                    "{name} must be absolute, got {}",
                    path.display()
                )));
            }
        }
        for (id, root) in &self.mount.local_mounts {
            if !root.is_absolute() {
                return Err(AppError::config(format!(
                    "mount.local_mounts.{id} must be absolute, got {}",
                    root.display()
                )));
            }
        }
        Ok(())
    }
}

/// Parse a `FILE_SYSTEM_ID=LOCAL_ROOT` mount entry.
pub fn parse_local_mount(entry: &str) -> Result<(String, PathBuf)> {
    match entry.split_once('=') {
        Some((id, root)) if !id.trim().is_empty() && !root.trim().is_empty() => {
            Ok((id.trim().to_string(), PathBuf::from(root.trim())))
        }
        _ => Err(AppError::config(format!(
            "local mount '{entry}' must look like fs-12345678=/mnt/efs"
        ))),
    }
}

impl Default for ScaffoldingConfig {
    fn default() -> Self {
        Self {
            env_base: defaults::env_base(),
            aws_region: defaults::aws_region(),
            mount: MountConfig::default(),
            access_points: AccessPointNames::default(),
            environment: EnvironmentConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Where file systems are mounted, inside the job container and locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Local directory where this process sees each file system's root,
    /// keyed by file system id. Only these file systems can be written.
    #[serde(default)]
    pub local_mounts: IndexMap<String, PathBuf>,

    #[serde(default = "defaults::shared_path")]
    pub shared_path: PathBuf,

    #[serde(default = "defaults::scratch_path")]
    pub scratch_path: PathBuf,

    #[serde(default = "defaults::tmp_path")]
    pub tmp_path: PathBuf,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            local_mounts: IndexMap::new(),
            shared_path: defaults::shared_path(),
            scratch_path: defaults::scratch_path(),
            tmp_path: defaults::tmp_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPointNames {
    #[serde(default = "defaults::shared_access_point")]
    pub shared: String,

    #[serde(default = "defaults::scratch_access_point")]
    pub scratch: String,

    #[serde(default = "defaults::tmp_access_point")]
    pub tmp: String,
}

impl Default for AccessPointNames {
    fn default() -> Self {
        Self {
            shared: defaults::shared_access_point(),
            scratch: defaults::scratch_access_point(),
            tmp: defaults::tmp_access_point(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Inline environment size (bytes) at which IF_REQUIRED switches to a file
    #[serde(default = "defaults::file_threshold_bytes")]
    pub file_threshold_bytes: usize,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            file_threshold_bytes: defaults::file_threshold_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            retry_attempts: defaults::retry_attempts(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn env_base() -> String {
        "dev".into()
    }
    pub fn aws_region() -> String {
        "us-west-2".into()
    }

    // Mount defaults
    pub fn shared_path() -> PathBuf {
        PathBuf::from("/opt/efs/shared")
    }
    pub fn scratch_path() -> PathBuf {
        PathBuf::from("/opt/efs/scratch")
    }
    pub fn tmp_path() -> PathBuf {
        PathBuf::from("/opt/efs/tmp")
    }

    // Access point defaults
    pub fn shared_access_point() -> String {
        "shared".into()
    }
    pub fn scratch_access_point() -> String {
        "scratch".into()
    }
    pub fn tmp_access_point() -> String {
        "tmp".into()
    }

    pub fn file_threshold_bytes() -> usize {
        crate::pipeline::environment::DEFAULT_FILE_THRESHOLD_BYTES
    }
    pub fn retry_attempts() -> u32 {
        5
    }
}
