//! Log subscription attachment
//!
//! Forwards the function's log group to a log-processing function. The log
//! group only appears after the function's first invocation, so a missing
//! group defers the attachment to a later deploy instead of failing.

use tracing::{error, info, warn};

use super::{Deployer, INVOKE_ACTION};
use crate::abstractions::{PermissionGrant, SubscriptionFilter};
use crate::config::DeploymentConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingOutcome {
    /// No logging configured
    Skipped,
    Attached { filter_name: String },
    /// The log group does not exist yet
    Deferred { log_group_name: String },
}

pub fn log_group_name(function_name: &str) -> String {
    format!("/aws/lambda/{function_name}")
}

pub fn filter_name(function_name: &str) -> String {
    format!("LambdaStream_{function_name}")
}

impl Deployer {
    pub async fn attach_logging(&self, config: &DeploymentConfig) -> Result<LoggingOutcome> {
        let Some(spec) = &config.logging else {
            return Ok(LoggingOutcome::Skipped);
        };
        let functions = &self.clients.functions;
        let logs = &self.clients.logs;

        let grant = PermissionGrant {
            function_name: spec.lambda_function_name.clone(),
            statement_id: spec.statement_id(),
            action: INVOKE_ACTION.to_string(),
            principal: spec.principal.clone(),
            source_arn: None,
        };
        match self
            .call("add_permission", || functions.add_permission(&grant))
            .await
        {
            Ok(()) => info!(
                "Granted log processor invoke permission. [FunctionName: {}] [StatementId: {}]",
                grant.function_name, grant.statement_id
            ),
            Err(err) if err.is_already_exists() => info!(
                "Log processor permission already granted. [StatementId: {}]",
                grant.statement_id
            ),
            Err(err) => {
                error!("Unable to grant log processor permission. [Error: {}]", err);
                return Err(err.into());
            }
        }

        let filter = SubscriptionFilter {
            log_group_name: log_group_name(&config.function_name),
            filter_name: filter_name(&config.function_name),
            filter_pattern: String::new(),
            destination_arn: spec.destination_arn.clone(),
        };
        match self
            .call("put_subscription_filter", || logs.put_subscription_filter(&filter))
            .await
        {
            Ok(()) => {
                info!(
                    "Attached log subscription. [LogGroup: {}] [Filter: {}]",
                    filter.log_group_name, filter.filter_name
                );
                Ok(LoggingOutcome::Attached {
                    filter_name: filter.filter_name,
                })
            }
            Err(err) if err.is_not_found() => {
                warn!(
                    "Log group does not exist yet, subscription deferred. [LogGroup: {}]",
                    filter.log_group_name
                );
                Ok(LoggingOutcome::Deferred {
                    log_group_name: filter.log_group_name,
                })
            }
            Err(err) => {
                error!("Unable to attach log subscription. [Error: {}]", err);
                Err(err.into())
            }
        }
    }
}
