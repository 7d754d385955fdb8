//! AWS Lambda entry point for demand scaffolding
//!
//! Deploy with `cargo lambda build --release --features lambda`
//! Invoke with a `PrepareDemandScaffoldingRequest` JSON payload.

use std::sync::Arc;

use lambda_runtime::{Error as LambdaError, LambdaEvent, service_fn};

use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use demand_scaffolding::handler::{assembler_from_env, handler};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Demand scaffolding Lambda starting...");
    let assembler = Arc::new(assembler_from_env().await?);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let assembler = Arc::clone(&assembler);
        async move { handler(&assembler, event).await }
    }))
    .await
}
