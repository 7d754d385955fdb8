//! Demand scaffolding CLI
//!
//! Local execution entry point. For AWS Lambda, use `scaffolding-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use demand_scaffolding::{
    error::Result,
    models::{
        PrepareDemandScaffoldingRequest, ScaffoldingConfig, SelectionStrategy, parse_local_mount,
    },
    pipeline::ScaffoldingAssembler,
    services::{EfsResolver, StaticEfsResolver},
    storage::MountedStorage,
};

/// Prepare AWS Batch scaffolding for demand executions
#[derive(Parser, Debug)]
#[command(
    name = "scaffolding",
    version,
    about = "Demand execution scaffolding"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "scaffolding.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build scaffolding for a request and print the response JSON
    Prepare {
        /// Request JSON file
        #[arg(short, long)]
        request: PathBuf,

        /// EFS inventory JSON used instead of the EFS API
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Local EFS mount as FILE_SYSTEM_ID=PATH (repeatable, adds to config)
        #[arg(long = "mount", value_parser = parse_local_mount)]
        mounts: Vec<(String, PathBuf)>,

        /// Override the request's selection strategy
        #[arg(long)]
        strategy: Option<SelectionStrategy>,

        /// Write the response here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

async fn build_resolver(inventory: Option<&PathBuf>) -> Result<Arc<dyn EfsResolver>> {
    if let Some(path) = inventory {
        log::info!("Using EFS inventory from {}", path.display());
        return Ok(Arc::new(StaticEfsResolver::from_file(path)?));
    }

    #[cfg(feature = "aws")]
    {
        Ok(Arc::new(
            demand_scaffolding::services::AwsEfsResolver::from_env().await,
        ))
    }

    #[cfg(not(feature = "aws"))]
    {
        Err(demand_scaffolding::error::AppError::config(
            "built without the aws feature; pass --inventory",
        ))
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = ScaffoldingConfig::load_or_default(&cli.config);
    config.apply_env_overrides();

    match cli.command {
        Command::Prepare {
            request,
            inventory,
            mounts,
            strategy,
            output,
        } => {
            config.mount.local_mounts.extend(mounts);
            config.validate()?;

            let content = std::fs::read_to_string(&request)?;
            let mut request =
                PrepareDemandScaffoldingRequest::from_value(serde_json::from_str(&content)?)?;
            if let Some(strategy) = strategy {
                request.file_system_configurations.selection_strategy = strategy;
            }

            let resolver = build_resolver(inventory.as_ref()).await?;
            let storage = Arc::new(MountedStorage::from_config(&config.mount));
            let assembler = ScaffoldingAssembler::new(config, resolver, storage);

            let response = assembler.prepare(&request).await?;
            let json = serde_json::to_string_pretty(&response)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    log::info!("Response saved to {}", path.display());
                }
                None => println!("{json}"),
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            if !cli.config.exists() {
                log::warn!(
                    "{} not found; defaults are valid",
                    cli.config.display()
                );
            }
            log::info!("Config OK (env_base={})", config.env_base);
        }
    }

    Ok(())
}
