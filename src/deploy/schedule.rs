//! Schedule rule binding
//!
//! The rule is upserted, the events service is granted invoke permission
//! scoped to the rule ARN, and the function is registered as the rule target
//! under a stable target id so repeated binds replace rather than accumulate.

use tracing::{error, info};

use super::{Deployer, FunctionPresence};
use crate::abstractions::{RuleDefinition, RuleTarget};
use crate::config::{DeploymentConfig, ScheduleRule};
use crate::error::{DeployError, Result};

pub const EVENTS_PRINCIPAL: &str = "events.amazonaws.com";

impl Deployer {
    /// Bind the rule to the function; returns the rule ARN
    pub async fn bind_schedule(
        &self,
        function_name: &str,
        function_arn: &str,
        rule: &ScheduleRule,
    ) -> Result<String> {
        let schedules = &self.clients.schedules;

        let definition = RuleDefinition {
            name: rule.name.clone(),
            schedule_expression: rule.schedule_expression.clone(),
            enabled: rule.enabled,
            role_arn: rule.role_arn.clone(),
            description: rule.description.clone(),
        };
        let rule_arn = self
            .call("put_rule", || schedules.put_rule(&definition))
            .await
            .inspect_err(|err| error!("Unable to put rule. [Error: {}]", err))?;
        info!(
            "Rule created. [RuleName: {}] [Schedule: {}] [RuleArn: {}]",
            rule.name, rule.schedule_expression, rule_arn
        );

        self.replace_invoke_permission(
            function_name,
            &rule.statement_id(),
            EVENTS_PRINCIPAL,
            &rule_arn,
        )
        .await?;

        let input = rule
            .target_input
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DeployError::config(format!("Invalid target input for rule {}: {e}", rule.name)))?;
        let targets = [RuleTarget {
            id: rule.target_id(function_name),
            arn: function_arn.to_string(),
            input,
        }];

        let failed = self
            .call("put_targets", || schedules.put_targets(&rule.name, &targets))
            .await
            .inspect_err(|err| error!("Unable to put rule targets. [Error: {}]", err))?;

        if !failed.is_empty() {
            let details = failed
                .iter()
                .map(|f| {
                    format!(
                        "{} ({}: {})",
                        f.target_id,
                        f.error_code.as_deref().unwrap_or("unknown"),
                        f.error_message.as_deref().unwrap_or("no message")
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            error!("Rule targets rejected. [RuleName: {}] [{}]", rule.name, details);
            return Err(DeployError::TargetsRejected {
                rule: rule.name.clone(),
                details,
            });
        }

        info!(
            "Function bound to rule. [RuleName: {}] [TargetId: {}]",
            rule.name, targets[0].id
        );
        Ok(rule_arn)
    }

    /// Bind the configured rule to a function that already exists
    pub async fn schedule_existing(&self, config: &DeploymentConfig) -> Result<Option<String>> {
        let Some(rule) = &config.schedule else {
            info!("No schedule rule configured for {}", config.function_name);
            return Ok(None);
        };

        match self.check_function(&config.function_name).await? {
            FunctionPresence::Absent => {
                Err(DeployError::FunctionNotFound(config.function_name.clone()))
            }
            FunctionPresence::Present { function_arn } => self
                .bind_schedule(&config.function_name, &function_arn, rule)
                .await
                .map(Some),
        }
    }
}
