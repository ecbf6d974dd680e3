//! CLI argument structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Idempotently deploy a Lambda function and its triggers
#[derive(Parser)]
#[command(name = "lambda-deployer")]
#[command(about = "lambda-deployer - Create or update a Lambda function and wire its event sources", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update the function, then reconcile its bindings
    Deploy {
        /// Deployment file (.yaml, .yml, .json or .toml)
        #[arg(short, long)]
        config: PathBuf,

        /// Zip archive containing the function code
        #[arg(short, long)]
        package: PathBuf,
    },

    /// Load and validate a deployment file without calling the provider
    Validate {
        /// Deployment file (.yaml, .yml, .json or .toml)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Bind the configured schedule rule to an existing function
    Schedule {
        /// Deployment file (.yaml, .yml, .json or .toml)
        #[arg(short, long)]
        config: PathBuf,
    },
}
