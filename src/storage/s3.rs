//! AWS S3 object access, used to fetch configuration in Lambda.

use aws_sdk_s3::Client;
use tracing::info;

use crate::error::{AppError, Result};

/// S3 bucket plus key prefix.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create S3 storage from `CONFIG_S3_BUCKET` / `CONFIG_S3_PREFIX`.
    ///
    /// Returns `None` when no bucket is configured.
    pub async fn from_env() -> Option<Self> {
        let bucket = std::env::var("CONFIG_S3_BUCKET").ok()?;
        let prefix = std::env::var("CONFIG_S3_PREFIX").unwrap_or_default();
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Some(Self::new(Client::new(&config), bucket, prefix))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Full object key for a name under the prefix.
    pub fn key(&self, name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        }
    }

    /// Read an object, returning `None` if it does not exist.
    pub async fn read_bytes_optional(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::S3(format!("s3://{}/{}: {}", self.bucket, key, e)))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    info!("No object at s3://{}/{}", self.bucket, key);
                    Ok(None)
                } else {
                    Err(AppError::S3(format!(
                        "s3://{}/{}: {}",
                        self.bucket, key, service_err
                    )))
                }
            }
        }
    }
}
