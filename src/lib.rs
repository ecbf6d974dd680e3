//! # lambda-deployer
//!
//! Idempotently creates or updates a Lambda function and wires it to its
//! triggers: stream/queue event-source mappings, pub/sub topics, a schedule
//! rule, and a log subscription that forwards its logs to a processor.
//!
//! ## Usage
//!
//! ```bash
//! lambda-deployer deploy --config deploy.yaml --package function.zip
//! ```
//!
//! ## Modules
//!
//! - `abstractions` - Provider service traits with AWS SDK and in-memory implementations
//! - `app` - Logging setup and fatal error handling
//! - `cli` - Command-line arguments and routing
//! - `config` - Deployment file types, loading and validation
//! - `deploy` - The deployment workflow and its retry policy
//! - `error` - Workflow error type
pub mod abstractions;
pub mod app;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;

pub use config::DeploymentConfig;
pub use deploy::{Deployer, DeploymentOutcome};
pub use error::{DeployError, Result};
