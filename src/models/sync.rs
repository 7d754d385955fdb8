//! Data movement requests handed to the downstream data-sync service.

use serde::{Deserialize, Serialize};

use crate::models::{DataPath, DataSyncConfiguration, S3Uri};

/// Copy `source_path` to `destination_path`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSyncRequest {
    pub source_path: DataPath,
    pub destination_path: DataPath,

    /// Keep the source after a successful copy
    #[serde(default = "default_retain")]
    pub retain_source_data: bool,

    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub size_only: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate_s3_path: Option<S3Uri>,
}

fn default_retain() -> bool {
    true
}

impl DataSyncRequest {
    pub fn new(
        source_path: DataPath,
        destination_path: DataPath,
        retain_source_data: bool,
        config: &DataSyncConfiguration,
    ) -> Self {
        Self {
            source_path,
            destination_path,
            retain_source_data,
            force: config.force,
            size_only: config.size_only,
            intermediate_s3_path: config.intermediate_s3_path.clone(),
        }
    }
}

/// Delete every listed path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoveDataPathsRequest {
    #[serde(default)]
    pub paths: Vec<DataPath>,
}
