//! Function deployment workflow
//!
//! A deployment runs a fixed sequence of provisioning steps against the
//! provider:
//!
//! 1. existence check
//! 2. create or update (code, then configuration)
//! 3. event-source mapping reconcile
//! 4. push-subscription reconcile, one topic at a time
//! 5. version publish and prune (update path only)
//! 6. log subscription attach
//! 7. schedule rule bind
//!
//! Fatal errors stop the remaining steps. Completed steps are not rolled
//! back; re-running the deployment converges.

pub mod event_source;
pub mod function;
pub mod logging;
pub mod push;
pub mod retry;
pub mod schedule;
pub mod versions;

use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::abstractions::{PermissionGrant, ProviderClients, ProviderResult};
use crate::config::DeploymentConfig;
use crate::error::Result;

pub use event_source::EventSourceBinding;
pub use function::FunctionPresence;
pub use logging::LoggingOutcome;
pub use retry::{BackoffStrategy, RetryConfig, RetryExecutor, RetryMetrics, Retryable};
pub use versions::PruneReport;

pub const INVOKE_ACTION: &str = "lambda:InvokeFunction";

/// How long to wait for an in-progress function update to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: 60,
        }
    }
}

/// What a completed deployment did
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentOutcome {
    pub function_arn: String,
    pub created: bool,
    pub event_source: EventSourceBinding,
    pub subscribed_topics: Vec<String>,
    pub published_version: Option<String>,
    pub pruned_versions: Vec<String>,
    pub logging: LoggingOutcome,
    pub rule_arn: Option<String>,
}

/// Runs deployments against one set of provider clients
pub struct Deployer {
    clients: ProviderClients,
    retry: RetryExecutor,
    settle: SettlePolicy,
}

impl Deployer {
    pub fn new(clients: ProviderClients, retry_config: RetryConfig) -> Self {
        Self {
            clients,
            retry: RetryExecutor::new(retry_config),
            settle: SettlePolicy::default(),
        }
    }

    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn retry_executor(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Make one provider call under the shared retry policy
    pub(crate) async fn call<T, F, Fut>(&self, context: &str, operation: F) -> ProviderResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.retry.execute_with_retry(operation, context).await
    }

    /// Create or update the function and reconcile all of its bindings
    pub async fn deploy(&self, package: &Path, config: &DeploymentConfig) -> Result<DeploymentOutcome> {
        info!(
            "Deploying function {} from {}",
            config.function_name,
            package.display()
        );

        self.run(package, config).await.inspect_err(|err| {
            error!(
                "Deployment of {} failed: {}",
                config.function_name, err
            );
        })
    }

    async fn run(&self, package: &Path, config: &DeploymentConfig) -> Result<DeploymentOutcome> {
        let presence = self.check_function(&config.function_name).await?;
        let created = matches!(presence, FunctionPresence::Absent);
        let function_arn = self.provision(config, package, presence).await?;

        let event_source = self.bind_event_source(config).await?;
        let subscribed_topics = self.subscribe_topics(config, &function_arn).await?;

        let (published_version, pruned_versions) = if created {
            (None, Vec::new())
        } else {
            let report = self.publish_and_prune(&config.function_name).await?;
            (Some(report.published), report.deleted)
        };

        let logging = self.attach_logging(config).await?;

        let rule_arn = match &config.schedule {
            Some(rule) => Some(
                self.bind_schedule(&config.function_name, &function_arn, rule)
                    .await?,
            ),
            None => None,
        };

        info!(
            "Deployment of {} complete. [FunctionArn: {}]",
            config.function_name, function_arn
        );

        Ok(DeploymentOutcome {
            function_arn,
            created,
            event_source,
            subscribed_topics,
            published_version,
            pruned_versions,
            logging,
            rule_arn,
        })
    }

    /// Delete-then-add an invoke permission so each deploy leaves exactly one statement
    pub(crate) async fn replace_invoke_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        principal: &str,
        source_arn: &str,
    ) -> Result<()> {
        let functions = &self.clients.functions;

        match self
            .call("remove_permission", || {
                functions.remove_permission(function_name, statement_id)
            })
            .await
        {
            Ok(()) => info!(
                "Permission deleted. [FunctionName: {}] [StatementId: {}]",
                function_name, statement_id
            ),
            Err(err) if err.is_not_found() => info!(
                "Permission does not exist yet. [FunctionName: {}] [StatementId: {}]",
                function_name, statement_id
            ),
            Err(err) => {
                error!("Unable to delete permission. [Error: {}]", err);
                return Err(err.into());
            }
        }

        let grant = PermissionGrant {
            function_name: function_name.to_string(),
            statement_id: statement_id.to_string(),
            action: INVOKE_ACTION.to_string(),
            principal: principal.to_string(),
            source_arn: Some(source_arn.to_string()),
        };
        self.call("add_permission", || functions.add_permission(&grant))
            .await
            .inspect_err(|err| error!("Failed to add permission. [Error: {}]", err))?;
        info!(
            "Added permission. [FunctionName: {}] [StatementId: {}] [Principal: {}]",
            function_name, statement_id, principal
        );
        Ok(())
    }
}
