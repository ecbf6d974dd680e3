//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use lambda_deployer::abstractions::{MockProvider, ProviderClients};
use lambda_deployer::config::{ConfigFormat, DeploymentConfig};
use lambda_deployer::deploy::{BackoffStrategy, Deployer, RetryConfig, SettlePolicy};

/// Bytes standing in for a zip archive
pub const PACKAGE_BYTES: &[u8] = b"PK\x03\x04fake-function-package";

pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/lambda-exec";

/// Temporary directory holding a deployment package and config files
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write the fake package and return its path
    pub fn package(&self) -> Result<PathBuf> {
        let path = self.temp_dir.path().join("function.zip");
        fs::write(&path, PACKAGE_BYTES)?;
        Ok(path)
    }

    /// Create a file in the test directory
    pub fn create_file(&self, path: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let full_path = self.temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, content)?;
        Ok(full_path)
    }
}

/// Minimal YAML deployment file for `name`
pub fn config_yaml(name: &str) -> String {
    format!("functionName: {name}\nhandler: bootstrap\nrole: {ROLE_ARN}\n")
}

pub fn config(name: &str) -> DeploymentConfig {
    ConfigFormat::Yaml
        .parse(&config_yaml(name))
        .expect("valid test config")
}

/// Parse a YAML config that extends the minimal one for `name`
pub fn config_with(name: &str, extra: &str) -> DeploymentConfig {
    ConfigFormat::Yaml
        .parse(&format!("{}{}", config_yaml(name), extra))
        .expect("valid test config")
}

/// Retry policy with millisecond delays
pub fn fast_retry(attempts: u32) -> RetryConfig {
    RetryConfig {
        attempts,
        backoff: BackoffStrategy::Fixed,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: false,
        jitter_factor: 0.0,
    }
}

pub fn deployer(provider: &Arc<MockProvider>) -> Deployer {
    deployer_with_retry(provider, fast_retry(3))
}

pub fn deployer_with_retry(provider: &Arc<MockProvider>, retry: RetryConfig) -> Deployer {
    Deployer::new(ProviderClients::from_provider(provider.clone()), retry).with_settle_policy(
        SettlePolicy {
            poll_interval: Duration::from_millis(1),
            max_polls: 5,
        },
    )
}
