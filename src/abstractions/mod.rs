//! Abstraction layers for the cloud provider
//!
//! This module provides trait-based abstractions over the control-plane
//! services (functions, topics, logs, schedules) so the deployment workflow
//! can run against the AWS SDK or an in-memory mock.

pub mod aws;
pub mod mock;
pub mod provider;

use std::sync::Arc;

pub use aws::AwsProvider;
pub use mock::MockProvider;
pub use provider::{
    EventSourceMapping, EventSourceMappingRequest, FailedTarget, FunctionDefinition, FunctionInfo,
    FunctionService, LastUpdateStatus, LogService, PermissionGrant, ProviderError,
    ProviderErrorKind, ProviderResult, RuleDefinition, RuleTarget, ScheduleService,
    SubscriptionFilter, TopicService,
};

/// The set of service clients one deployment runs against
#[derive(Clone)]
pub struct ProviderClients {
    pub functions: Arc<dyn FunctionService>,
    pub topics: Arc<dyn TopicService>,
    pub logs: Arc<dyn LogService>,
    pub schedules: Arc<dyn ScheduleService>,
}

impl ProviderClients {
    /// Use one provider for every service
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: FunctionService + TopicService + LogService + ScheduleService + 'static,
    {
        Self {
            functions: provider.clone(),
            topics: provider.clone(),
            logs: provider.clone(),
            schedules: provider,
        }
    }
}
