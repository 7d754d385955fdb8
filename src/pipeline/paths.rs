//! Rewriting input/output parameters to container-local paths.
//!
//! Inputs with a remote location are synced onto EFS before the job starts;
//! outputs are written by the job into its working directory and synced out
//! afterwards. Either way the parameter value the job sees becomes the
//! container path.

use std::path::{Component, Path, PathBuf};

use indexmap::IndexSet;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{DataPath, DemandExecutionParameters, EfsPath, ParamPair, ParamValue};
use crate::utils::sha256_hex;

/// A directory visible both inside the container and on EFS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedPath {
    pub container_path: PathBuf,
    pub efs_path: EfsPath,
}

impl MountedPath {
    pub fn new(container_path: impl Into<PathBuf>, efs_path: EfsPath) -> Self {
        Self {
            container_path: container_path.into(),
            efs_path,
        }
    }

    pub fn join(&self, segment: impl AsRef<Path>) -> Self {
        Self {
            container_path: self.container_path.join(segment.as_ref()),
            efs_path: self.efs_path.join(segment),
        }
    }
}

/// An input to sync in before the job starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    pub name: String,
    pub remote: DataPath,
    pub location: MountedPath,
}

/// An output to sync out after the job finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinding {
    pub name: String,
    pub location: MountedPath,
    pub remote: DataPath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenParameters {
    pub parameters: DemandExecutionParameters,
    pub inputs: Vec<InputBinding>,
    pub outputs: Vec<OutputBinding>,
}

/// Rewrite input and output parameter values to container paths.
///
/// Remote inputs land under `shared` (or under `working` when `isolate_inputs`);
/// outputs always land under `working`. Names not listed as inputs or outputs
/// are left as they are.
pub fn rewrite_parameters(
    parameters: &DemandExecutionParameters,
    shared: &MountedPath,
    working: &MountedPath,
    isolate_inputs: bool,
) -> Result<RewrittenParameters> {
    let input_names = unique_names(&parameters.inputs, "inputs")?;
    let output_names = unique_names(&parameters.outputs, "outputs")?;
    if let Some(name) = input_names.intersection(&output_names).next() {
        return Err(AppError::invalid_input(format!(
            "parameter '{name}' is listed as both input and output"
        )));
    }

    let mut rewritten = parameters.clone();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    for name in &input_names {
        let binding = lookup(parameters, name)?;
        let Some(remote) = binding.remote else {
            // Already local to the container, nothing to sync
            continue;
        };
        let remote = require_remote(name, remote)?;
        let local = match binding.local {
            Some(local) => local,
            None => sha256_hex(remote.to_string()),
        };
        let base = if isolate_inputs { working } else { shared };
        let location = base.join(relative_name(name, &local)?);

        debug!(input = %name, %remote, destination = %location.efs_path, "Rewrote input");
        set_value(&mut rewritten, name, &location.container_path);
        inputs.push(InputBinding {
            name: name.clone(),
            remote,
            location,
        });
    }

    for name in &output_names {
        let binding = lookup(parameters, name)?;
        let local = match (&binding.local, &binding.remote) {
            (Some(local), _) => local.clone(),
            (None, Some(remote)) => sha256_hex(remote.to_string()),
            (None, None) => {
                return Err(AppError::invalid_input(format!(
                    "output '{name}' has no value"
                )));
            }
        };
        let remote = match binding.remote {
            Some(remote) => require_remote(name, remote)?,
            None => parameters
                .output_s3_prefix
                .as_ref()
                .map(|prefix| DataPath::S3(prefix.join(&local)))
                .ok_or_else(|| {
                    AppError::invalid_input(format!(
                        "output '{name}' has no remote destination and no output_s3_prefix is set"
                    ))
                })?,
        };
        let location = working.join(relative_name(name, &local)?);

        debug!(output = %name, %remote, source = %location.efs_path, "Rewrote output");
        set_value(&mut rewritten, name, &location.container_path);
        outputs.push(OutputBinding {
            name: name.clone(),
            location,
            remote,
        });
    }

    Ok(RewrittenParameters {
        parameters: rewritten,
        inputs,
        outputs,
    })
}

fn unique_names(names: &[String], field: &str) -> Result<IndexSet<String>> {
    let mut unique = IndexSet::with_capacity(names.len());
    for name in names {
        if !unique.insert(name.clone()) {
            return Err(AppError::invalid_input(format!(
                "parameter '{name}' appears twice in {field}"
            )));
        }
    }
    Ok(unique)
}

fn lookup(parameters: &DemandExecutionParameters, name: &str) -> Result<ParamPair> {
    parameters
        .params
        .get(name)
        .ok_or_else(|| AppError::invalid_input(format!("parameter '{name}' is not defined in params")))?
        .binding()
}

fn require_remote(name: &str, remote: DataPath) -> Result<DataPath> {
    match remote {
        DataPath::Local(path) => Err(AppError::invalid_input(format!(
            "parameter '{name}' remote '{}' must be an S3 or EFS location",
            path.display()
        ))),
        remote => Ok(remote),
    }
}

/// Local names are relative paths that stay inside their mount.
fn relative_name<'a>(name: &str, local: &'a str) -> Result<&'a Path> {
    let path = Path::new(local);
    let inside = path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !inside {
        return Err(AppError::invalid_input(format!(
            "parameter '{name}' local path '{local}' must be relative and stay inside its mount"
        )));
    }
    Ok(path)
}

fn set_value(parameters: &mut DemandExecutionParameters, name: &str, path: &Path) {
    parameters.params.insert(
        name.to_string(),
        ParamValue::Literal(path.display().to_string()),
    );
}
