//! Demand execution aggregate.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{DataPath, S3Uri};

/// A single logical request to run a containerized job against input/output data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemandExecution {
    pub execution_id: String,

    /// Free-form job family (e.g. "custom"), used in job naming
    #[serde(default = "default_execution_type")]
    pub execution_type: String,

    pub execution_image: String,

    #[serde(default)]
    pub execution_parameters: DemandExecutionParameters,

    #[serde(default)]
    pub resource_requirements: DemandResourceRequirements,

    /// Opaque caller metadata, passed through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub execution_metadata: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub execution_platform: ExecutionPlatform,
}

fn default_execution_type() -> String {
    "custom".to_string()
}

impl DemandExecution {
    /// Batch queue this execution must be submitted to.
    pub fn job_queue_name(&self) -> Result<&str> {
        self.execution_platform
            .aws_batch
            .as_ref()
            .map(|batch| batch.job_queue_name.as_str())
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                AppError::invalid_input(format!(
                    "execution {} has no execution_platform.aws_batch.job_queue_name",
                    self.execution_id
                ))
            })
    }
}

/// Where the execution runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionPlatform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_batch: Option<AwsBatchExecutionPlatform>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwsBatchExecutionPlatform {
    pub job_queue_name: String,
}

/// Compute resources requested by the execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemandResourceRequirements {
    #[serde(default = "default_vcpus")]
    pub vcpus: u32,

    /// Memory in MiB
    #[serde(default = "default_memory")]
    pub memory: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<u32>,
}

fn default_vcpus() -> u32 {
    1
}

fn default_memory() -> u32 {
    1024
}

impl Default for DemandResourceRequirements {
    fn default() -> Self {
        Self {
            vcpus: default_vcpus(),
            memory: default_memory(),
            gpu: None,
        }
    }
}

/// Command template plus named parameters.
///
/// Command tokens reference parameters as `${NAME}`; the container shell
/// expands them at runtime from the job environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DemandExecutionParameters {
    #[serde(default)]
    pub command: Vec<String>,

    /// Parameter names that are job inputs
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Parameter names that are job outputs
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub params: IndexMap<String, ParamValue>,

    /// Default destination prefix for outputs without an explicit remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_s3_prefix: Option<S3Uri>,

    #[serde(default)]
    pub verbosity: bool,
}

/// Raw value of a named parameter.
///
/// Accepted JSON forms:
/// - `"literal"` or `"s3://bucket/key"`
/// - `"local @ s3://bucket/key"`
/// - `{"local": "...", "remote": "s3://bucket/key"}`
/// - numbers and booleans, passed to the job as their JSON text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Pair(ParamPair),
    Literal(String),
    Number(serde_json::Number),
    Bool(bool),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParamPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<DataPath>,
}

impl ParamValue {
    /// Split the value into its local and remote halves.
    pub fn binding(&self) -> Result<ParamPair> {
        match self {
            ParamValue::Pair(pair) => Ok(pair.clone()),
            ParamValue::Literal(raw) => {
                if let Some((local, remote)) = raw.split_once(" @ ") {
                    let local = local.trim();
                    return Ok(ParamPair {
                        local: (!local.is_empty()).then(|| local.to_string()),
                        remote: Some(remote.trim().parse()?),
                    });
                }
                match raw.parse::<DataPath>()? {
                    DataPath::Local(_) => Ok(ParamPair {
                        local: Some(raw.clone()),
                        remote: None,
                    }),
                    remote => Ok(ParamPair {
                        local: None,
                        remote: Some(remote),
                    }),
                }
            }
            ParamValue::Number(_) | ParamValue::Bool(_) => Ok(ParamPair {
                local: Some(self.as_env_value()),
                remote: None,
            }),
        }
    }

    /// Value as it would appear in the container environment when not rewritten.
    pub fn as_env_value(&self) -> String {
        match self {
            ParamValue::Literal(raw) => raw.clone(),
            ParamValue::Number(number) => number.to_string(),
            ParamValue::Bool(flag) => flag.to_string(),
            ParamValue::Pair(pair) => pair
                .local
                .clone()
                .or_else(|| pair.remote.as_ref().map(ToString::to_string))
                .unwrap_or_default(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(raw: &str) -> Self {
        ParamValue::Literal(raw.to_string())
    }
}
