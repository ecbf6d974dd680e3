//! Command routing and execution

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::abstractions::{AwsProvider, ProviderClients};
use crate::cli::args::Commands;
use crate::config::{load_deployment_config, DeploymentConfig};
use crate::deploy::{Deployer, LoggingOutcome};

/// Execute a CLI command based on the parsed arguments
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Deploy { config, package } => run_deploy(&config, &package).await,
        Commands::Validate { config } => run_validate(&config).await,
        Commands::Schedule { config } => run_schedule(&config).await,
    }
}

async fn build_deployer(config: &DeploymentConfig) -> Result<Deployer> {
    let provider = Arc::new(AwsProvider::from_settings(&config.client).await?);
    Ok(Deployer::new(
        ProviderClients::from_provider(provider),
        config.retry.clone(),
    ))
}

async fn run_deploy(config_path: &Path, package: &Path) -> Result<()> {
    let config = load_deployment_config(config_path).await?;
    let deployer = build_deployer(&config).await?;

    let outcome = deployer.deploy(package, &config).await?;

    let metrics = deployer.retry_executor().metrics().await;
    debug!(
        "Provider calls: {} operations, {} attempts, {} retries",
        metrics.operations,
        metrics.total_attempts,
        metrics.retries.len()
    );

    if let Some(version) = &outcome.published_version {
        info!(
            "Published version {} and pruned {} older version(s)",
            version,
            outcome.pruned_versions.len()
        );
    }
    if let LoggingOutcome::Deferred { log_group_name } = &outcome.logging {
        info!(
            "Log subscription deferred until {} exists; deploy again after the first invocation",
            log_group_name
        );
    }

    println!("{}", outcome.function_arn);
    Ok(())
}

async fn run_validate(config_path: &Path) -> Result<()> {
    let config = load_deployment_config(config_path).await?;
    println!(
        "Configuration for {} is valid ({})",
        config.function_name,
        config_path.display()
    );
    Ok(())
}

async fn run_schedule(config_path: &Path) -> Result<()> {
    let config = load_deployment_config(config_path).await?;
    let deployer = build_deployer(&config).await?;

    match deployer.schedule_existing(&config).await? {
        Some(rule_arn) => println!("{rule_arn}"),
        None => println!("No schedule rule configured for {}", config.function_name),
    }
    Ok(())
}
