//! Per-request context manager settings.

use serde::{Deserialize, Serialize};

use crate::models::S3Uri;

/// When to move job environment variables into a sourced file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvFileWriteMode {
    Never,
    #[default]
    Always,
    /// Only when the inline environment would exceed the size threshold
    IfRequired,
}

/// Knobs forwarded to every data-sync request in one direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSyncConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate_s3_path: Option<S3Uri>,

    #[serde(default)]
    pub force: bool,

    #[serde(default = "default_size_only")]
    pub size_only: bool,
}

fn default_size_only() -> bool {
    true
}

impl Default for DataSyncConfiguration {
    fn default() -> Self {
        Self {
            intermediate_s3_path: None,
            force: false,
            size_only: default_size_only(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextManagerConfiguration {
    /// Copy inputs into the execution working directory instead of the shared mount
    #[serde(default)]
    pub isolate_inputs: bool,

    /// Remove synced inputs once the job finishes
    #[serde(default)]
    pub cleanup_inputs: bool,

    /// Remove the execution working directory once the job finishes
    #[serde(default)]
    pub cleanup_working_dir: bool,

    #[serde(default)]
    pub env_file_write_mode: EnvFileWriteMode,

    /// Deprecated: use the per-direction sync configurations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate_s3_path: Option<S3Uri>,

    #[serde(default)]
    pub input_data_sync_configuration: DataSyncConfiguration,

    #[serde(default)]
    pub output_data_sync_configuration: DataSyncConfiguration,
}

impl ContextManagerConfiguration {
    /// Effective settings for pre-execution (input) syncs.
    pub fn input_sync(&self) -> DataSyncConfiguration {
        self.with_legacy_fallback(&self.input_data_sync_configuration)
    }

    /// Effective settings for post-execution (output) syncs.
    pub fn output_sync(&self) -> DataSyncConfiguration {
        self.with_legacy_fallback(&self.output_data_sync_configuration)
    }

    fn with_legacy_fallback(&self, config: &DataSyncConfiguration) -> DataSyncConfiguration {
        let mut config = config.clone();
        if config.intermediate_s3_path.is_none() {
            config.intermediate_s3_path = self.intermediate_s3_path.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ContextManagerConfiguration = serde_json::from_str("{}").unwrap();
        assert!(!config.isolate_inputs);
        assert!(!config.cleanup_working_dir);
        assert_eq!(config.env_file_write_mode, EnvFileWriteMode::Always);
        assert!(config.input_sync().size_only);
        assert!(!config.output_sync().force);
    }

    #[test]
    fn test_legacy_intermediate_path_fills_unset_directions() {
        let json = r#"{
            "intermediate_s3_path": "s3://bucket/legacy",
            "output_data_sync_configuration": {"intermediate_s3_path": "s3://bucket/out", "force": true}
        }"#;
        let config: ContextManagerConfiguration = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.input_sync().intermediate_s3_path.unwrap().to_string(),
            "s3://bucket/legacy"
        );
        let output = config.output_sync();
        assert_eq!(
            output.intermediate_s3_path.unwrap().to_string(),
            "s3://bucket/out"
        );
        assert!(output.force);
        assert!(output.size_only);
    }

    #[test]
    fn test_write_mode_names() {
        let mode: EnvFileWriteMode = serde_json::from_str(r#""IF_REQUIRED""#).unwrap();
        assert_eq!(mode, EnvFileWriteMode::IfRequired);
        assert_eq!(serde_json::to_string(&EnvFileWriteMode::Never).unwrap(), r#""NEVER""#);
    }
}
