// src/config.rs

//! Configuration loading for the Lambda environment.

use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::ScaffoldingConfig;
use crate::storage::s3::S3Storage;

/// Name of the configuration object under the config prefix.
pub const CONFIG_FILE_NAME: &str = "scaffolding.toml";

/// Config loader reading TOML from S3.
pub struct S3ConfigLoader {
    storage: S3Storage,
}

impl S3ConfigLoader {
    pub fn new(storage: S3Storage) -> Self {
        Self { storage }
    }

    pub async fn load_config(&self) -> Result<ScaffoldingConfig> {
        let key = self.storage.key(CONFIG_FILE_NAME);
        info!("Loading config file from S3: s3://{}/{}", self.storage.bucket(), key);
        let bytes = self
            .storage
            .read_bytes_optional(&key)
            .await?
            .ok_or_else(|| AppError::Config(format!("Config file not found in S3: {key}")))?;

        let s = String::from_utf8(bytes).map_err(|e| {
            AppError::Config(format!("Config file {key} is not valid UTF-8: {e}"))
        })?;
        ScaffoldingConfig::from_toml(&s)
    }
}

/// Configuration for a Lambda invocation.
///
/// Reads `scaffolding.toml` from S3 when `CONFIG_S3_BUCKET` is set, otherwise
/// starts from defaults. Environment overrides apply in both cases.
pub async fn load_lambda_config() -> Result<ScaffoldingConfig> {
    let mut config = match S3Storage::from_env().await {
        Some(storage) => S3ConfigLoader::new(storage).load_config().await?,
        None => {
            warn!("CONFIG_S3_BUCKET not set. Using default configuration.");
            ScaffoldingConfig::default()
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
