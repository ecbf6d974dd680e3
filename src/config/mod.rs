//! Deployment configuration
//!
//! Key names are camelCase. The nested event-source, push-subscription and
//! logging blocks also accept the PascalCase names used by older deployment
//! files (`EventSourceArn`, `TopicArn`, `StatementId`, ...).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::abstractions::FunctionDefinition;
use crate::deploy::retry::RetryConfig;

pub mod loader;
pub mod validation;

#[cfg(test)]
mod tests;

pub use loader::{load_deployment_config, ConfigFormat};
pub use validation::validate;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Stable identity of the function across create and update
    pub function_name: String,

    #[serde(default)]
    pub description: String,

    pub handler: String,

    /// Execution role ARN
    pub role: String,

    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: u32,

    /// Megabytes
    #[serde(default = "default_memory_size")]
    pub memory_size: u32,

    #[serde(default = "default_runtime")]
    pub runtime: String,

    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Publish a version when the function is first created
    #[serde(default)]
    pub publish: bool,

    #[serde(flatten)]
    pub client: ClientSettings,

    #[serde(default)]
    pub event_source: Option<EventSourceSpec>,

    #[serde(default, alias = "pushSource")]
    pub push_subscriptions: Vec<PushSubscription>,

    #[serde(default)]
    pub logging: Option<LoggingSpec>,

    #[serde(default, alias = "rule")]
    pub schedule: Option<ScheduleRule>,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Top-level keys no other field claimed; validation rejects them
    #[serde(flatten)]
    pub unknown_keys: BTreeMap<String, serde_json::Value>,
}

impl DeploymentConfig {
    /// The configuration submitted on create and configuration update
    pub fn function_definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            function_name: self.function_name.clone(),
            description: self.description.clone(),
            handler: self.handler.clone(),
            role: self.role.clone(),
            timeout: self.timeout,
            memory_size: self.memory_size,
            runtime: self.runtime.clone(),
            environment: self.environment.clone(),
            publish: self.publish,
        }
    }

    /// Overlay settings taken from the process environment
    pub fn merge_env_vars(&mut self) {
        self.merge_env_vars_from(|key| std::env::var(key).ok());
    }

    pub fn merge_env_vars_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.client.https_proxy.is_none() {
            self.client.https_proxy = lookup("HTTPS_PROXY")
                .or_else(|| lookup("https_proxy"))
                .filter(|value| !value.trim().is_empty());
        }
    }
}

/// How provider clients are constructed for one deployment
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    /// Falls back to the environment, then `us-east-1`
    #[serde(default)]
    pub region: Option<String>,

    /// Named profile from the shared credentials file
    #[serde(default)]
    pub profile: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Endpoint override, e.g. a local emulator
    #[serde(default)]
    pub endpoint_url: Option<String>,

    #[serde(default)]
    pub https_proxy: Option<String>,
}

impl ClientSettings {
    /// Static credentials, when both halves are configured
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("region", &self.region)
            .field("profile", &self.profile)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("https_proxy", &self.https_proxy)
            .finish()
    }
}

/// Stream or queue that triggers the function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSourceSpec {
    #[serde(alias = "EventSourceArn")]
    pub event_source_arn: String,

    #[serde(default = "default_batch_size", alias = "BatchSize")]
    pub batch_size: u32,

    /// `TRIM_HORIZON`, `LATEST` or `AT_TIMESTAMP` for stream sources
    #[serde(default, alias = "StartingPosition")]
    pub starting_position: Option<String>,

    #[serde(default, alias = "Enabled")]
    pub enabled: Option<bool>,
}

/// Topic the function is subscribed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    #[serde(alias = "TopicArn")]
    pub topic_arn: String,

    #[serde(alias = "StatementId")]
    pub statement_id: String,
}

impl PushSubscription {
    /// Last segment of the topic ARN
    pub fn topic_name(&self) -> &str {
        self.topic_arn.rsplit(':').next().unwrap_or(&self.topic_arn)
    }
}

/// Log forwarding to a log-processing function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSpec {
    /// Function that receives the forwarded log events
    #[serde(alias = "LambdaFunctionName")]
    pub lambda_function_name: String,

    /// Principal allowed to invoke the log processor, e.g. `logs.us-east-1.amazonaws.com`
    #[serde(alias = "Principal")]
    pub principal: String,

    #[serde(alias = "Arn", alias = "arn")]
    pub destination_arn: String,
}

impl LoggingSpec {
    pub fn statement_id(&self) -> String {
        format!("{}LoggingId", self.lambda_function_name)
    }
}

/// Cron or rate rule that invokes the function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    pub name: String,

    /// `cron(0 20 * * ? *)` or `rate(5 minutes)`
    pub schedule_expression: String,

    #[serde(default = "default_true", alias = "isEnabled")]
    pub enabled: bool,

    #[serde(default, alias = "role")]
    pub role_arn: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Serialized to JSON and passed as the target input
    #[serde(default)]
    pub target_input: Option<serde_json::Value>,
}

impl ScheduleRule {
    pub fn target_id(&self, function_name: &str) -> String {
        format!("{}-{}", function_name, self.name)
    }

    pub fn statement_id(&self) -> String {
        format!("{}-invoke", self.name)
    }
}

fn default_timeout() -> u32 {
    10
}

fn default_memory_size() -> u32 {
    128
}

fn default_runtime() -> String {
    "provided.al2023".to_string()
}

fn default_batch_size() -> u32 {
    100
}

fn default_true() -> bool {
    true
}
