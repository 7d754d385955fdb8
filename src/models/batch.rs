//! AWS Batch job-definition shapes.
//!
//! Nested structures use the camelCase field names of the Batch API so they
//! can be handed to `RegisterJobDefinition` unchanged.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::DemandResourceRequirements;

/// Everything needed to register a job definition and submit one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchJobSpec {
    pub image: String,
    pub job_definition_name: String,
    pub job_name: String,
    pub job_queue_name: String,

    #[serde(default)]
    pub job_definition_tags: IndexMap<String, String>,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub environment: IndexMap<String, String>,

    #[serde(default)]
    pub resource_requirements: Vec<ResourceRequirement>,

    #[serde(default)]
    pub mount_points: Vec<MountPoint>,

    #[serde(default)]
    pub volumes: Vec<Volume>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_strategy: Option<RetryStrategy>,

    #[serde(default)]
    pub privileged: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    Vcpu,
    Memory,
    Gpu,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRequirement {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub value: String,
}

impl ResourceRequirement {
    pub fn new(kind: ResourceType, value: u32) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }

    /// Batch resource list for a demand's requirements; GPU only when requested.
    pub fn from_demand(requirements: &DemandResourceRequirements) -> Vec<Self> {
        let mut resources = vec![
            Self::new(ResourceType::Vcpu, requirements.vcpus),
            Self::new(ResourceType::Memory, requirements.memory),
        ];
        if let Some(gpu) = requirements.gpu.filter(|count| *count > 0) {
            resources.push(Self::new(ResourceType::Gpu, gpu));
        }
        resources
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MountPoint {
    pub container_path: String,
    pub read_only: bool,
    pub source_volume: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub efs_volume_configuration: EfsVolumeConfiguration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EfsVolumeConfiguration {
    pub file_system_id: String,
    pub root_directory: String,
    pub transit_encryption: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_config: Option<EfsAuthorizationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EfsAuthorizationConfig {
    pub access_point_id: String,
    pub iam: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategy {
    pub attempts: u32,

    #[serde(default)]
    pub evaluate_on_exit: Vec<EvaluateOnExit>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetryAction {
    Retry,
    Exit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnExit {
    pub action: RetryAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_status_reason: Option<String>,
}

impl RetryStrategy {
    /// Retry infrastructure failures (image pull timeouts, lost hosts) and
    /// exit on everything else.
    pub fn infrastructure_only(attempts: u32) -> Self {
        Self {
            attempts,
            evaluate_on_exit: vec![
                EvaluateOnExit {
                    action: RetryAction::Retry,
                    on_reason: Some("DockerTimeoutError*".to_string()),
                    on_status_reason: Some("Task failed to start".to_string()),
                },
                EvaluateOnExit {
                    action: RetryAction::Retry,
                    on_reason: None,
                    on_status_reason: Some("Host EC2*".to_string()),
                },
                EvaluateOnExit {
                    action: RetryAction::Exit,
                    on_reason: None,
                    on_status_reason: Some("*".to_string()),
                },
            ],
        }
    }
}
