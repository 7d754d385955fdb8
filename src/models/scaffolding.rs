//! Request and response payloads of the scaffolding handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    BatchJobSpec, ContextManagerConfiguration, DataSyncRequest, DemandExecution,
    DemandFileSystemConfigurations, RemoveDataPathsRequest, SelectionStrategy,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrepareDemandScaffoldingRequest {
    pub demand_execution: DemandExecution,

    #[serde(default)]
    pub file_system_configurations: DemandFileSystemConfigurations,

    #[serde(default)]
    pub context_manager_configuration: ContextManagerConfiguration,
}

impl PrepareDemandScaffoldingRequest {
    /// Parse a raw invocation payload.
    ///
    /// An unknown selection strategy is `InvalidInput`; any other shape
    /// problem is `Serialization`.
    pub fn from_value(mut value: Value) -> Result<Self> {
        if let Some(slot) = value.pointer_mut("/file_system_configurations/selection_strategy") {
            if let Some(name) = slot.as_str() {
                let strategy: SelectionStrategy = name.parse()?;
                *slot = Value::String(strategy.to_string());
            }
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Work to do before the job starts, plus the job itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemandExecutionSetupConfigs {
    pub data_sync_requests: Vec<DataSyncRequest>,
    pub batch_create_request: BatchJobSpec,
}

/// Work to do after the job finishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DemandExecutionCleanupConfigs {
    #[serde(default)]
    pub data_sync_requests: Vec<DataSyncRequest>,

    #[serde(default)]
    pub remove_data_paths_requests: Vec<RemoveDataPathsRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrepareDemandScaffoldingResponse {
    /// The execution with parameter values rewritten to container paths
    pub demand_execution: DemandExecution,
    pub setup_configs: DemandExecutionSetupConfigs,
    pub cleanup_configs: DemandExecutionCleanupConfigs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::EnvFileWriteMode;
    use serde_json::json;

    #[test]
    fn test_request_deserialize() {
        let request = PrepareDemandScaffoldingRequest::from_value(json!({
            "demand_execution": {
                "execution_id": "run-1",
                "execution_image": "image:latest",
                "execution_platform": {"aws_batch": {"job_queue_name": "queue"}}
            },
            "file_system_configurations": {
                "scratch": [{"file_system": "fs-123456789012", "access_point": "fsap-123456789012", "container_path": "/opt/efs/scratch"}],
                "shared": [{"file_system": "fs-123456789012", "access_point": "fsap-123456789012", "container_path": "/opt/efs/shared"}],
                "selection_strategy": "LEAST_UTILIZED"
            },
            "context_manager_configuration": {
                "isolate_inputs": true,
                "env_file_write_mode": "NEVER",
                "input_data_sync_configuration": {"force": false, "size_only": true},
                "output_data_sync_configuration": {"force": false, "size_only": true}
            }
        }))
        .unwrap();

        assert_eq!(request.demand_execution.execution_id, "run-1");
        assert_eq!(
            request.file_system_configurations.selection_strategy,
            SelectionStrategy::LeastUtilized
        );
        assert!(request.context_manager_configuration.isolate_inputs);
        assert_eq!(
            request.context_manager_configuration.env_file_write_mode,
            EnvFileWriteMode::Never
        );
    }

    #[test]
    fn test_malformed_request_is_serialization_error() {
        let err = PrepareDemandScaffoldingRequest::from_value(json!({"demand_execution": 5}))
            .unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn test_unknown_strategy_is_invalid_input_with_its_name() {
        let err = PrepareDemandScaffoldingRequest::from_value(json!({
            "demand_execution": {"execution_id": "x", "execution_image": "i"},
            "file_system_configurations": {"selection_strategy": "MOST_UTILIZED"}
        }))
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(err.is_client_error());
        assert!(err.to_string().contains("MOST_UTILIZED"));
    }

    #[test]
    fn test_strategy_name_is_case_insensitive() {
        let request = PrepareDemandScaffoldingRequest::from_value(json!({
            "demand_execution": {"execution_id": "x", "execution_image": "i"},
            "file_system_configurations": {"selection_strategy": "least_utilized"}
        }))
        .unwrap();
        assert_eq!(
            request.file_system_configurations.selection_strategy,
            SelectionStrategy::LeastUtilized
        );
    }

    #[test]
    fn test_non_string_strategy_is_serialization_error() {
        let err = PrepareDemandScaffoldingRequest::from_value(json!({
            "demand_execution": {"execution_id": "x", "execution_image": "i"},
            "file_system_configurations": {"selection_strategy": 3}
        }))
        .unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn test_cleanup_configs_serialization() {
        let configs = DemandExecutionCleanupConfigs {
            data_sync_requests: Vec::new(),
            remove_data_paths_requests: vec![RemoveDataPathsRequest {
                paths: vec!["fs-1:/scratch/run-1".parse().unwrap()],
            }],
        };
        assert_eq!(
            serde_json::to_value(&configs).unwrap(),
            json!({
                "data_sync_requests": [],
                "remove_data_paths_requests": [{"paths": ["fs-1:/scratch/run-1"]}]
            })
        );
    }
}
