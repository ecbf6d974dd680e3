//! Control-plane service abstractions
//!
//! Trait-based seams over the four provider services the deployment
//! workflow talks to, so the workflow can run against the AWS SDK or an
//! in-memory mock.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

use crate::deploy::retry::Retryable;

static DUPLICATE_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)the statement id \(.*?\) provided already exists")
        .expect("Invalid regex pattern")
});

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Coarse classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The addressed resource does not exist
    NotFound,
    /// The provider throttled the request
    RateLimited,
    /// The resource (usually a permission statement) already exists
    AlreadyExists,
    /// The resource is busy or in a conflicting state
    Conflict,
    /// Anything else
    Other,
}

/// Error returned by a control-plane call
#[derive(Error, Debug, Clone)]
#[error("{operation} failed ({}): {message}", .code.as_deref().unwrap_or("no error code"))]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub operation: &'static str,
    pub code: Option<String>,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    /// Build an error, deriving its kind from the code, HTTP status and message
    pub fn classify(
        operation: &'static str,
        code: Option<&str>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let kind = classify_kind(code, status, &message);
        Self {
            kind,
            operation,
            code: code.map(str::to_string),
            status,
            message,
        }
    }

    pub fn not_found(operation: &'static str, message: impl Into<String>) -> Self {
        Self::classify(operation, Some("ResourceNotFoundException"), Some(404), message)
    }

    pub fn rate_limited(operation: &'static str) -> Self {
        Self::classify(
            operation,
            Some("TooManyRequestsException"),
            Some(429),
            "Rate exceeded",
        )
    }

    pub fn duplicate_statement(operation: &'static str, statement_id: &str) -> Self {
        Self::classify(
            operation,
            Some("ResourceConflictException"),
            Some(409),
            format!(
                "The statement id ({statement_id}) provided already exists. Please provide a new statement id, or remove the existing statement."
            ),
        )
    }

    pub fn other(operation: &'static str, message: impl Into<String>) -> Self {
        Self::classify(operation, None, None, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ProviderErrorKind::RateLimited
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == ProviderErrorKind::AlreadyExists
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        self.is_rate_limited()
    }
}

fn classify_kind(code: Option<&str>, status: Option<u16>, message: &str) -> ProviderErrorKind {
    match code {
        Some("ResourceNotFoundException" | "NotFound" | "NotFoundException") => {
            return ProviderErrorKind::NotFound
        }
        Some(
            "TooManyRequestsException"
            | "ThrottlingException"
            | "Throttling"
            | "ThrottledException"
            | "RequestLimitExceeded",
        ) => return ProviderErrorKind::RateLimited,
        Some("ResourceConflictException") => {
            return if DUPLICATE_STATEMENT.is_match(message) {
                ProviderErrorKind::AlreadyExists
            } else {
                ProviderErrorKind::Conflict
            };
        }
        _ => {}
    }

    match status {
        Some(404) => ProviderErrorKind::NotFound,
        Some(429) => ProviderErrorKind::RateLimited,
        _ if DUPLICATE_STATEMENT.is_match(message) => ProviderErrorKind::AlreadyExists,
        _ => ProviderErrorKind::Other,
    }
}

/// State of the most recent code or configuration update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastUpdateStatus {
    Successful,
    InProgress,
    Failed(Option<String>),
}

/// What "get function" reports about an existing function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub function_arn: String,
    pub last_update_status: Option<LastUpdateStatus>,
}

/// Full function configuration, as sent on create and configuration update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub function_name: String,
    pub description: String,
    pub handler: String,
    pub role: String,
    pub timeout: u32,
    pub memory_size: u32,
    pub runtime: String,
    pub environment: HashMap<String, String>,
    pub publish: bool,
}

/// An existing event-source mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSourceMapping {
    pub uuid: String,
    pub event_source_arn: String,
    pub function_arn: String,
    pub batch_size: Option<u32>,
}

/// Parameters for a new event-source mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSourceMappingRequest {
    pub function_name: String,
    pub event_source_arn: String,
    pub batch_size: u32,
    pub starting_position: Option<String>,
    pub enabled: Option<bool>,
}

/// A single resource-policy statement granting invoke access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub function_name: String,
    pub statement_id: String,
    pub action: String,
    pub principal: String,
    pub source_arn: Option<String>,
}

/// Log subscription filter forwarding a log group to a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub log_group_name: String,
    pub filter_name: String,
    pub filter_pattern: String,
    pub destination_arn: String,
}

/// Scheduled rule definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefinition {
    pub name: String,
    pub schedule_expression: String,
    pub enabled: bool,
    pub role_arn: Option<String>,
    pub description: Option<String>,
}

/// Binding of a rule to an invocation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTarget {
    pub id: String,
    pub arn: String,
    pub input: Option<String>,
}

/// Entry the provider refused while putting rule targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTarget {
    pub target_id: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Compute-function lifecycle, event-source mappings, permissions and versions
#[async_trait]
pub trait FunctionService: Send + Sync {
    async fn get_function(&self, function_name: &str) -> ProviderResult<FunctionInfo>;

    async fn create_function(
        &self,
        definition: &FunctionDefinition,
        zip_file: &[u8],
    ) -> ProviderResult<String>;

    async fn update_function_code(&self, function_name: &str, zip_file: &[u8])
        -> ProviderResult<()>;

    async fn update_function_configuration(
        &self,
        definition: &FunctionDefinition,
    ) -> ProviderResult<()>;

    async fn list_event_source_mappings(
        &self,
        function_name: &str,
        event_source_arn: &str,
    ) -> ProviderResult<Vec<EventSourceMapping>>;

    async fn create_event_source_mapping(
        &self,
        request: &EventSourceMappingRequest,
    ) -> ProviderResult<String>;

    async fn update_event_source_mapping(&self, uuid: &str, batch_size: u32)
        -> ProviderResult<()>;

    async fn add_permission(&self, grant: &PermissionGrant) -> ProviderResult<()>;

    async fn remove_permission(&self, function_name: &str, statement_id: &str)
        -> ProviderResult<()>;

    /// Publish `$LATEST` as a new numbered version and return its qualifier
    async fn publish_version(&self, function_name: &str) -> ProviderResult<String>;

    /// All version qualifiers of the function, `$LATEST` included
    async fn list_versions(&self, function_name: &str) -> ProviderResult<Vec<String>>;

    async fn delete_function_version(&self, function_name: &str, qualifier: &str)
        -> ProviderResult<()>;
}

/// Pub/sub topics
#[async_trait]
pub trait TopicService: Send + Sync {
    /// ARNs of every topic visible to the caller
    async fn list_topics(&self) -> ProviderResult<Vec<String>>;

    /// Create (or return the existing) topic, returning its ARN
    async fn create_topic(&self, name: &str) -> ProviderResult<String>;

    async fn subscribe(
        &self,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
    ) -> ProviderResult<Option<String>>;
}

/// Log-forwarding subscriptions
#[async_trait]
pub trait LogService: Send + Sync {
    async fn put_subscription_filter(&self, filter: &SubscriptionFilter) -> ProviderResult<()>;
}

/// Time-based rules and their targets
#[async_trait]
pub trait ScheduleService: Send + Sync {
    /// Upsert the rule, returning its ARN
    async fn put_rule(&self, rule: &RuleDefinition) -> ProviderResult<String>;

    async fn put_targets(
        &self,
        rule_name: &str,
        targets: &[RuleTarget],
    ) -> ProviderResult<Vec<FailedTarget>>;
}
