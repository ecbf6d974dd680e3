use std::path::Path;
use tokio::fs;
use tracing::debug;

use super::{validate, DeploymentConfig};
use crate::error::{DeployError, Result};

/// Serialization format of a deployment file, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yml" | "yaml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(DeployError::config(format!(
                "Unsupported config file extension for {} (expected .yaml, .yml, .json or .toml)",
                path.display()
            ))),
        }
    }

    pub fn parse(self, content: &str) -> std::result::Result<DeploymentConfig, String> {
        match self {
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Read, parse, overlay the environment on, and validate a deployment file
pub async fn load_deployment_config(path: &Path) -> Result<DeploymentConfig> {
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path).await.map_err(|e| {
        DeployError::config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let mut config = format
        .parse(&content)
        .map_err(|e| DeployError::config(format!("{}: {}", path.display(), e)))?;
    config.merge_env_vars();
    validate(&config)?;

    debug!(
        "Loaded deployment config for {} from {}",
        config.function_name,
        path.display()
    );
    Ok(config)
}
