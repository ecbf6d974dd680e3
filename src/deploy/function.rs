//! Existence check and function create/update

use std::path::Path;
use tracing::{debug, error, info};

use super::Deployer;
use crate::abstractions::LastUpdateStatus;
use crate::config::DeploymentConfig;
use crate::error::{DeployError, Result};

/// Whether the function already exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionPresence {
    Absent,
    Present { function_arn: String },
}

/// Read the zip archive that becomes the function code
pub async fn read_package(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|source| DeployError::Package {
            path: path.to_path_buf(),
            source,
        })
}

impl Deployer {
    /// Not-found means absent; any other failure is returned as is
    pub async fn check_function(&self, function_name: &str) -> Result<FunctionPresence> {
        let functions = &self.clients.functions;
        match self
            .call("get_function", || functions.get_function(function_name))
            .await
        {
            Ok(info) => {
                info!("Function found. [FunctionName: {}]", function_name);
                Ok(FunctionPresence::Present {
                    function_arn: info.function_arn,
                })
            }
            Err(err) if err.is_not_found() => {
                info!("Function not found. [FunctionName: {}]", function_name);
                Ok(FunctionPresence::Absent)
            }
            Err(err) => {
                error!(
                    "Provider request failed. Check your credentials and permissions. [Error: {}]",
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Create the function, or update code then configuration; returns the function ARN
    pub async fn provision(
        &self,
        config: &DeploymentConfig,
        package: &Path,
        presence: FunctionPresence,
    ) -> Result<String> {
        let code = read_package(package).await?;

        match presence {
            FunctionPresence::Absent => self.create_function(config, &code).await,
            FunctionPresence::Present { function_arn } => {
                self.update_function(config, &code).await?;
                Ok(function_arn)
            }
        }
    }

    async fn create_function(&self, config: &DeploymentConfig, code: &[u8]) -> Result<String> {
        info!(
            "Creating function. [FunctionName: {}] [Package: {} bytes]",
            config.function_name,
            code.len()
        );
        let definition = config.function_definition();
        let functions = &self.clients.functions;

        let function_arn = self
            .call("create_function", || functions.create_function(&definition, code))
            .await
            .inspect_err(|err| {
                error!(
                    "Create function failed. Check your iam:PassRole permissions. [Error: {}]",
                    err
                )
            })?;

        info!("Created function. [FunctionArn: {}]", function_arn);
        Ok(function_arn)
    }

    /// Two round trips; code and configuration can diverge if the second one fails
    async fn update_function(&self, config: &DeploymentConfig, code: &[u8]) -> Result<()> {
        let function_name = config.function_name.as_str();
        info!(
            "Updating function code. [FunctionName: {}] [Package: {} bytes]",
            function_name,
            code.len()
        );
        let functions = &self.clients.functions;

        self.call("update_function_code", || {
            functions.update_function_code(function_name, code)
        })
        .await
        .inspect_err(|err| error!("Update function code failed. [Error: {}]", err))?;
        self.wait_for_update(function_name).await?;

        let definition = config.function_definition();
        self.call("update_function_configuration", || {
            functions.update_function_configuration(&definition)
        })
        .await
        .inspect_err(|err| error!("Update function configuration failed. [Error: {}]", err))?;
        self.wait_for_update(function_name).await?;

        info!("Updated function. [FunctionName: {}]", function_name);
        Ok(())
    }

    /// Poll until the last update is no longer in progress
    pub async fn wait_for_update(&self, function_name: &str) -> Result<()> {
        let functions = &self.clients.functions;

        for poll in 1..=self.settle.max_polls {
            let info = self
                .call("get_function", || functions.get_function(function_name))
                .await?;

            match info.last_update_status {
                None | Some(LastUpdateStatus::Successful) => return Ok(()),
                Some(LastUpdateStatus::Failed(reason)) => {
                    return Err(DeployError::UpdateFailed {
                        function_name: function_name.to_string(),
                        reason: reason.unwrap_or_else(|| "no reason given".to_string()),
                    });
                }
                Some(LastUpdateStatus::InProgress) => {
                    debug!(
                        "Function update in progress. [FunctionName: {}] [Poll: {}/{}]",
                        function_name, poll, self.settle.max_polls
                    );
                    if poll < self.settle.max_polls {
                        tokio::time::sleep(self.settle.poll_interval).await;
                    }
                }
            }
        }

        Err(DeployError::UpdateTimeout {
            function_name: function_name.to_string(),
            polls: self.settle.max_polls,
        })
    }
}
