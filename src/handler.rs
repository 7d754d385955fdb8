// src/handler.rs

//! AWS Lambda handler for demand scaffolding.

use std::sync::Arc;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::config::load_lambda_config;
use crate::error::Result;
use crate::models::PrepareDemandScaffoldingRequest;
use crate::pipeline::ScaffoldingAssembler;
use crate::services::AwsEfsResolver;
use crate::storage::MountedStorage;

/// Build the assembler used for every invocation of this Lambda instance.
pub async fn assembler_from_env() -> Result<ScaffoldingAssembler> {
    let config = load_lambda_config().await?;
    info!(
        env_base = %config.env_base,
        local_mounts = config.mount.local_mounts.len(),
        "Loaded scaffolding configuration"
    );
    if config.mount.local_mounts.is_empty() {
        warn!("No local EFS mounts configured; env files cannot be written");
    }
    let storage = MountedStorage::from_config(&config.mount);
    let resolver = AwsEfsResolver::from_env().await;
    Ok(ScaffoldingAssembler::new(
        config,
        Arc::new(resolver),
        Arc::new(storage),
    ))
}

/// Main Lambda handler function.
#[instrument(skip(assembler, event))]
pub async fn handler(
    assembler: &ScaffoldingAssembler,
    event: LambdaEvent<Value>,
) -> std::result::Result<Value, LambdaError> {
    info!("Handling request {}", event.context.request_id);

    match run(assembler, event.payload).await {
        Ok(response) => {
            info!("Lambda execution successful");
            Ok(response)
        }
        Err(e) => {
            error!(client_error = e.is_client_error(), "Lambda execution failed: {}", e);
            Err(e.into())
        }
    }
}

async fn run(assembler: &ScaffoldingAssembler, payload: Value) -> Result<Value> {
    let request = PrepareDemandScaffoldingRequest::from_value(payload)?;
    let response = assembler.prepare(&request).await?;
    Ok(serde_json::to_value(response)?)
}
