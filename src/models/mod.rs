// src/models/mod.rs

//! Domain models for demand scaffolding.
//!
//! Request payloads, Batch job shapes, data-sync requests, and the
//! application configuration, grouped by purpose.

mod batch;
mod config;
mod context;
mod data_path;
mod execution;
mod filesystem;
mod scaffolding;
mod sync;

// Re-export all public types
pub use batch::{
    BatchJobSpec, EfsAuthorizationConfig, EfsVolumeConfiguration, EvaluateOnExit, MountPoint,
    ResourceRequirement, ResourceType, RetryAction, RetryStrategy, Volume,
};
pub use config::{
    AccessPointNames, BatchConfig, EnvironmentConfig, MountConfig, ScaffoldingConfig,
    parse_local_mount,
};
pub use context::{ContextManagerConfiguration, DataSyncConfiguration, EnvFileWriteMode};
pub use data_path::{DataPath, EfsPath, S3Uri};
pub use execution::{
    AwsBatchExecutionPlatform, DemandExecution, DemandExecutionParameters,
    DemandResourceRequirements, ExecutionPlatform, ParamPair, ParamValue,
};
pub use filesystem::{DemandFileSystemConfigurations, FileSystemConfiguration, SelectionStrategy};
pub use scaffolding::{
    DemandExecutionCleanupConfigs, DemandExecutionSetupConfigs, PrepareDemandScaffoldingRequest,
    PrepareDemandScaffoldingResponse,
};
pub use sync::{DataSyncRequest, RemoveDataPathsRequest};
