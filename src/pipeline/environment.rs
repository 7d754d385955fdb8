//! Job environment materialization.
//!
//! Job variables either travel inline in the Batch container environment, or
//! are written to `.demand.env` in the working directory and sourced by the
//! startup command:
//!
//! ```text
//! export EXECUTION_ID="run-1"
//! export INPUT="/opt/efs/shared/558ca153..."
//! ```

use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{DemandExecutionParameters, EfsPath, EnvFileWriteMode};
use crate::pipeline::paths::MountedPath;
use crate::storage::SharedStorage;
use crate::utils::is_valid_env_var_name;

pub const ENV_FILE_NAME: &str = ".demand.env";

pub const EXECUTION_ID: &str = "EXECUTION_ID";
pub const ENVIRONMENT_FILE: &str = "_ENVIRONMENT_FILE";
pub const ENV_BASE: &str = "ENV_BASE";
pub const AWS_REGION: &str = "AWS_REGION";
pub const WORKING_DIR: &str = "WORKING_DIR";
pub const TMPDIR: &str = "TMPDIR";

/// Names the scaffolding sets itself; job parameters may not use them.
pub const RESERVED_NAMES: &[&str] = &[
    EXECUTION_ID,
    ENVIRONMENT_FILE,
    ENV_BASE,
    AWS_REGION,
    WORKING_DIR,
    TMPDIR,
];

/// Default inline size (bytes) from which IF_REQUIRED writes a file.
pub const DEFAULT_FILE_THRESHOLD_BYTES: usize = 8192;

/// Variables describing where the job runs, always inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfrastructureEnv {
    pub env_base: String,
    pub aws_region: String,
    pub working_dir: PathBuf,
    pub tmp_dir: PathBuf,
}

/// A pending `.demand.env` write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    pub path: EfsPath,
    pub content: String,
}

/// Outcome of materializing a job environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// Inline container environment, in order
    pub environment: IndexMap<String, String>,
    /// Tokens to run before the job command
    pub command_prefix: Option<Vec<String>>,
    pub env_file: Option<EnvFile>,
}

impl Materialized {
    pub fn uses_file(&self) -> bool {
        self.env_file.is_some()
    }
}

/// Job variables from (already rewritten) execution parameters.
pub fn job_environment(parameters: &DemandExecutionParameters) -> Result<IndexMap<String, String>> {
    parameters
        .params
        .iter()
        .map(|(name, value)| {
            if !is_valid_env_var_name(name) {
                return Err(AppError::invalid_input(format!(
                    "parameter name '{name}' is not a valid environment variable name"
                )));
            }
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(AppError::invalid_input(format!(
                    "parameter name '{name}' is reserved"
                )));
            }
            Ok((name.clone(), value.as_env_value()))
        })
        .collect()
}

/// Inline size of `NAME=VALUE` entries, one separator byte each.
pub fn environment_size<'a>(entries: impl IntoIterator<Item = (&'a String, &'a String)>) -> usize {
    entries
        .into_iter()
        .map(|(name, value)| name.len() + value.len() + 1)
        .sum()
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `export NAME="VALUE"` lines, newline separated.
pub fn render_env_file(entries: &IndexMap<String, String>) -> String {
    entries
        .iter()
        .map(|(name, value)| format!("export {}=\"{}\"", name, escape_value(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the output of [`render_env_file`].
pub fn parse_env_file(content: &str) -> Result<IndexMap<String, String>> {
    let mut entries = IndexMap::new();
    for line in content.lines().filter(|line| !line.trim().is_empty()) {
        let malformed = || AppError::invalid_input(format!("malformed env file line: {line}"));
        let (name, quoted) = line
            .strip_prefix("export ")
            .and_then(|rest| rest.split_once('='))
            .ok_or_else(malformed)?;
        let inner = quoted
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(malformed)?;

        let mut value = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                value.push(chars.next().ok_or_else(malformed)?);
            } else {
                value.push(c);
            }
        }
        entries.insert(name.to_string(), value);
    }
    Ok(entries)
}

/// Wrap the job command in the bash bootstrap that prepares its directories.
pub fn build_command(command: &[String], prefix: Option<&[String]>) -> Result<Vec<String>> {
    if command.is_empty() {
        return Err(AppError::invalid_input("execution command is empty"));
    }

    let mut script = format!(
        "mkdir -p ${{{WORKING_DIR}}} && mkdir -p ${{{TMPDIR}}} && cd ${{{WORKING_DIR}}} && "
    );
    if let Some(prefix) = prefix {
        script.push_str(&prefix.join(" "));
        script.push_str(" && ");
    }
    script.push_str(&command.join(" "));

    Ok(vec!["/bin/bash".to_string(), "-c".to_string(), script])
}

/// Decides between inline variables and a sourced env file.
pub struct EnvironmentMaterializer<'a> {
    storage: &'a dyn SharedStorage,
    threshold: usize,
}

impl<'a> EnvironmentMaterializer<'a> {
    pub fn new(storage: &'a dyn SharedStorage, threshold: usize) -> Self {
        Self { storage, threshold }
    }

    /// Decide how the environment is delivered without touching storage.
    pub fn plan(
        &self,
        execution_id: &str,
        infrastructure: &InfrastructureEnv,
        env: &IndexMap<String, String>,
        mode: EnvFileWriteMode,
        working: &MountedPath,
    ) -> Materialized {
        let mut job_vars = IndexMap::with_capacity(env.len() + 1);
        job_vars.insert(EXECUTION_ID.to_string(), execution_id.to_string());
        job_vars.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let inline = inline_environment(infrastructure, None, &job_vars);
        let use_file = match mode {
            EnvFileWriteMode::Never => false,
            EnvFileWriteMode::Always => true,
            EnvFileWriteMode::IfRequired => {
                let size = environment_size(&inline);
                debug!(size, threshold = self.threshold, "Inline environment size");
                size >= self.threshold
            }
        };

        if !use_file {
            info!(mode = ?mode, variables = inline.len(), "Passing environment inline");
            return Materialized {
                environment: inline,
                command_prefix: None,
                env_file: None,
            };
        }

        let container_file = working.container_path.join(ENV_FILE_NAME);
        let env_file = EnvFile {
            path: working.efs_path.join(ENV_FILE_NAME),
            content: render_env_file(&job_vars),
        };
        info!(mode = ?mode, file = %env_file.path, variables = job_vars.len(), "Passing environment through file");

        Materialized {
            environment: inline_environment(
                infrastructure,
                Some(container_file.display().to_string()),
                &IndexMap::new(),
            ),
            command_prefix: Some(vec![".".to_string(), format!("${{{ENVIRONMENT_FILE}}}")]),
            env_file: Some(env_file),
        }
    }

    /// Write the planned env file, if any.
    pub async fn write(&self, materialized: &Materialized) -> Result<()> {
        if let Some(file) = &materialized.env_file {
            self.storage.write_file(&file.path, &file.content).await?;
        }
        Ok(())
    }

    /// Plan and write in one step.
    pub async fn materialize(
        &self,
        execution_id: &str,
        infrastructure: &InfrastructureEnv,
        env: &IndexMap<String, String>,
        mode: EnvFileWriteMode,
        working: &MountedPath,
    ) -> Result<Materialized> {
        let materialized = self.plan(execution_id, infrastructure, env, mode, working);
        self.write(&materialized).await?;
        Ok(materialized)
    }
}

fn inline_environment(
    infrastructure: &InfrastructureEnv,
    env_file: Option<String>,
    job_vars: &IndexMap<String, String>,
) -> IndexMap<String, String> {
    let mut environment = IndexMap::new();
    environment.insert(ENV_BASE.to_string(), infrastructure.env_base.clone());
    environment.insert(AWS_REGION.to_string(), infrastructure.aws_region.clone());
    if let Some(path) = env_file {
        environment.insert(ENVIRONMENT_FILE.to_string(), path);
    }
    environment.insert(
        WORKING_DIR.to_string(),
        infrastructure.working_dir.display().to_string(),
    );
    environment.insert(TMPDIR.to_string(), infrastructure.tmp_dir.display().to_string());
    environment.extend(job_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    environment
}
