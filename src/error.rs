use std::path::PathBuf;
use thiserror::Error;

use crate::abstractions::ProviderError;

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to read deployment package {}: {source}", .path.display())]
    Package {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Function {0} does not exist")]
    FunctionNotFound(String),

    #[error("Update of function {function_name} failed: {reason}")]
    UpdateFailed {
        function_name: String,
        reason: String,
    },

    #[error("Function {function_name} was still updating after {polls} status checks")]
    UpdateTimeout { function_name: String, polls: u32 },

    #[error("Rule {rule} rejected targets: {details}")]
    TargetsRejected { rule: String, details: String },
}

impl DeployError {
    pub fn config<E: std::fmt::Display>(msg: E) -> Self {
        Self::Config(msg.to_string())
    }

    pub fn validation<E: std::fmt::Display>(msg: E) -> Self {
        Self::Validation(msg.to_string())
    }

    /// The provider error behind this failure, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(err) => Some(err),
            _ => None,
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) => 2,
            _ => 1,
        }
    }
}
