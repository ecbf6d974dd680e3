//! AWS SDK implementation of the provider services

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_eventbridge::types::{RuleState, Target};
use aws_sdk_lambda::config::{Credentials, Region};
use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{
    Environment, EventSourcePosition, FunctionCode, LastUpdateStatus as SdkUpdateStatus, Runtime,
};
use aws_smithy_http_client::proxy::ProxyConfig;
use aws_smithy_http_client::tls::{rustls_provider::CryptoMode, Provider as TlsProvider};
use aws_smithy_http_client::{Builder as HttpClientBuilder, Connector};
use aws_smithy_runtime_api::client::http::SharedHttpClient;
use tracing::{debug, info};

use super::provider::*;
use crate::config::{ClientSettings, DEFAULT_REGION};
use crate::error::{DeployError, Result};

/// Provider backed by the AWS control-plane APIs
#[derive(Clone, Debug)]
pub struct AwsProvider {
    lambda: aws_sdk_lambda::Client,
    sns: aws_sdk_sns::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
    events: aws_sdk_eventbridge::Client,
}

impl AwsProvider {
    /// Build clients for one deployment from explicit settings
    ///
    /// The SDK's own retry layer is disabled; rate-limited calls are retried
    /// by the deployment's retry policy instead.
    pub async fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let region = RegionProviderChain::first_try(settings.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .retry_config(aws_config::retry::RetryConfig::disabled());

        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }

        if let Some((access_key_id, secret_access_key)) = settings.static_credentials() {
            info!("Access key id from deployment config: {}", access_key_id);
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "deployment-config",
            ));
        }

        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if let Some(http_client) = http_client(settings)? {
            loader = loader.http_client(http_client);
        }

        let sdk_config = loader.load().await;
        debug!("Resolved provider region: {:?}", sdk_config.region());
        Ok(Self::from_sdk_config(&sdk_config))
    }

    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        Self {
            lambda: aws_sdk_lambda::Client::new(sdk_config),
            sns: aws_sdk_sns::Client::new(sdk_config),
            logs: aws_sdk_cloudwatchlogs::Client::new(sdk_config),
            events: aws_sdk_eventbridge::Client::new(sdk_config),
        }
    }
}

/// Proxy routing for HTTPS provider traffic, when a proxy URL is configured
pub fn proxy_config(settings: &ClientSettings) -> Result<Option<ProxyConfig>> {
    settings
        .https_proxy
        .as_deref()
        .map(|url| {
            ProxyConfig::https(url)
                .map_err(|e| DeployError::config(format!("Invalid HTTPS proxy {url}: {e}")))
        })
        .transpose()
}

/// HTTP client for the SDK; `None` keeps the SDK default
pub fn http_client(settings: &ClientSettings) -> Result<Option<SharedHttpClient>> {
    let Some(proxy) = proxy_config(settings)? else {
        return Ok(None);
    };
    info!(
        "Provider requests are routed through HTTPS proxy {}",
        settings.https_proxy.as_deref().unwrap_or_default()
    );

    let client = HttpClientBuilder::new().build_with_connector_fn(move |settings, components| {
        let mut builder = Connector::builder().proxy_config(proxy.clone());
        builder.set_connector_settings(settings.cloned());
        if let Some(components) = components {
            builder.set_sleep_impl(components.sleep_impl());
        }
        builder
            .tls_provider(TlsProvider::Rustls(CryptoMode::AwsLc))
            .build()
    });
    Ok(Some(client))
}

/// Convert an SDK failure into a classified provider error
fn provider_error<E>(operation: &'static str, err: SdkError<E>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    let error = ProviderError::classify(operation, code.as_deref(), status, message);
    debug!("{} error response: {:?}", operation, error);
    error
}

fn missing_field(operation: &'static str, field: &str) -> ProviderError {
    ProviderError::other(operation, format!("response did not include {field}"))
}

#[async_trait]
impl FunctionService for AwsProvider {
    async fn get_function(&self, function_name: &str) -> ProviderResult<FunctionInfo> {
        debug!("get_function request: [FunctionName: {}]", function_name);
        let output = self
            .lambda
            .get_function()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| provider_error("get_function", e))?;
        debug!("get_function response: {:?}", output);

        let configuration = output
            .configuration()
            .ok_or_else(|| missing_field("get_function", "Configuration"))?;
        let function_arn = configuration
            .function_arn()
            .ok_or_else(|| missing_field("get_function", "FunctionArn"))?
            .to_string();
        let last_update_status = configuration.last_update_status().map(|status| match status {
            SdkUpdateStatus::Successful => LastUpdateStatus::Successful,
            SdkUpdateStatus::InProgress => LastUpdateStatus::InProgress,
            _ => LastUpdateStatus::Failed(
                configuration.last_update_status_reason().map(str::to_string),
            ),
        });

        Ok(FunctionInfo {
            function_arn,
            last_update_status,
        })
    }

    async fn create_function(
        &self,
        definition: &FunctionDefinition,
        zip_file: &[u8],
    ) -> ProviderResult<String> {
        debug!("create_function request: {:?} [ZipFile: {} bytes]", definition, zip_file.len());
        let mut request = self
            .lambda
            .create_function()
            .function_name(&definition.function_name)
            .description(&definition.description)
            .handler(&definition.handler)
            .role(&definition.role)
            .timeout(definition.timeout as i32)
            .memory_size(definition.memory_size as i32)
            .runtime(Runtime::from(definition.runtime.as_str()))
            .code(
                FunctionCode::builder()
                    .zip_file(Blob::new(zip_file.to_vec()))
                    .build(),
            )
            .publish(definition.publish);

        if !definition.environment.is_empty() {
            request = request.environment(
                Environment::builder()
                    .set_variables(Some(definition.environment.clone()))
                    .build(),
            );
        }

        let output = request
            .send()
            .await
            .map_err(|e| provider_error("create_function", e))?;
        debug!("create_function response: {:?}", output);

        output
            .function_arn()
            .map(str::to_string)
            .ok_or_else(|| missing_field("create_function", "FunctionArn"))
    }

    async fn update_function_code(&self, function_name: &str, zip_file: &[u8]) -> ProviderResult<()> {
        debug!(
            "update_function_code request: [FunctionName: {}] [ZipFile: {} bytes]",
            function_name,
            zip_file.len()
        );
        let output = self
            .lambda
            .update_function_code()
            .function_name(function_name)
            .zip_file(Blob::new(zip_file.to_vec()))
            .publish(false)
            .send()
            .await
            .map_err(|e| provider_error("update_function_code", e))?;
        debug!("update_function_code response: {:?}", output);
        Ok(())
    }

    async fn update_function_configuration(
        &self,
        definition: &FunctionDefinition,
    ) -> ProviderResult<()> {
        debug!("update_function_configuration request: {:?}", definition);
        let output = self
            .lambda
            .update_function_configuration()
            .function_name(&definition.function_name)
            .description(&definition.description)
            .handler(&definition.handler)
            .role(&definition.role)
            .timeout(definition.timeout as i32)
            .memory_size(definition.memory_size as i32)
            .runtime(Runtime::from(definition.runtime.as_str()))
            .environment(
                Environment::builder()
                    .set_variables(Some(definition.environment.clone()))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| provider_error("update_function_configuration", e))?;
        debug!("update_function_configuration response: {:?}", output);
        Ok(())
    }

    async fn list_event_source_mappings(
        &self,
        function_name: &str,
        event_source_arn: &str,
    ) -> ProviderResult<Vec<EventSourceMapping>> {
        let mut mappings = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            debug!(
                "list_event_source_mappings request: [FunctionName: {}] [EventSourceArn: {}] [Marker: {:?}]",
                function_name, event_source_arn, marker
            );
            let output = self
                .lambda
                .list_event_source_mappings()
                .function_name(function_name)
                .event_source_arn(event_source_arn)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| provider_error("list_event_source_mappings", e))?;
            debug!("list_event_source_mappings response: {:?}", output);

            mappings.extend(output.event_source_mappings().iter().map(|mapping| {
                EventSourceMapping {
                    uuid: mapping.uuid().unwrap_or_default().to_string(),
                    event_source_arn: mapping.event_source_arn().unwrap_or_default().to_string(),
                    function_arn: mapping.function_arn().unwrap_or_default().to_string(),
                    batch_size: mapping.batch_size().map(|size| size as u32),
                }
            }));

            match output.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(mappings)
    }

    async fn create_event_source_mapping(
        &self,
        request: &EventSourceMappingRequest,
    ) -> ProviderResult<String> {
        debug!("create_event_source_mapping request: {:?}", request);
        let output = self
            .lambda
            .create_event_source_mapping()
            .function_name(&request.function_name)
            .event_source_arn(&request.event_source_arn)
            .batch_size(request.batch_size as i32)
            .set_starting_position(
                request
                    .starting_position
                    .as_deref()
                    .map(EventSourcePosition::from),
            )
            .set_enabled(request.enabled)
            .send()
            .await
            .map_err(|e| provider_error("create_event_source_mapping", e))?;
        debug!("create_event_source_mapping response: {:?}", output);

        output
            .uuid()
            .map(str::to_string)
            .ok_or_else(|| missing_field("create_event_source_mapping", "UUID"))
    }

    async fn update_event_source_mapping(&self, uuid: &str, batch_size: u32) -> ProviderResult<()> {
        debug!(
            "update_event_source_mapping request: [UUID: {}] [BatchSize: {}]",
            uuid, batch_size
        );
        let output = self
            .lambda
            .update_event_source_mapping()
            .uuid(uuid)
            .batch_size(batch_size as i32)
            .send()
            .await
            .map_err(|e| provider_error("update_event_source_mapping", e))?;
        debug!("update_event_source_mapping response: {:?}", output);
        Ok(())
    }

    async fn add_permission(&self, grant: &PermissionGrant) -> ProviderResult<()> {
        debug!("add_permission request: {:?}", grant);
        let output = self
            .lambda
            .add_permission()
            .function_name(&grant.function_name)
            .statement_id(&grant.statement_id)
            .action(&grant.action)
            .principal(&grant.principal)
            .set_source_arn(grant.source_arn.clone())
            .send()
            .await
            .map_err(|e| provider_error("add_permission", e))?;
        debug!("add_permission response: {:?}", output);
        Ok(())
    }

    async fn remove_permission(&self, function_name: &str, statement_id: &str) -> ProviderResult<()> {
        debug!(
            "remove_permission request: [FunctionName: {}] [StatementId: {}]",
            function_name, statement_id
        );
        let output = self
            .lambda
            .remove_permission()
            .function_name(function_name)
            .statement_id(statement_id)
            .send()
            .await
            .map_err(|e| provider_error("remove_permission", e))?;
        debug!("remove_permission response: {:?}", output);
        Ok(())
    }

    async fn publish_version(&self, function_name: &str) -> ProviderResult<String> {
        debug!("publish_version request: [FunctionName: {}]", function_name);
        let output = self
            .lambda
            .publish_version()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| provider_error("publish_version", e))?;
        debug!("publish_version response: {:?}", output);

        output
            .version()
            .map(str::to_string)
            .ok_or_else(|| missing_field("publish_version", "Version"))
    }

    async fn list_versions(&self, function_name: &str) -> ProviderResult<Vec<String>> {
        let mut versions = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            debug!(
                "list_versions_by_function request: [FunctionName: {}] [Marker: {:?}]",
                function_name, marker
            );
            let output = self
                .lambda
                .list_versions_by_function()
                .function_name(function_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| provider_error("list_versions", e))?;
            debug!("list_versions_by_function response: {:?}", output);

            versions.extend(
                output
                    .versions()
                    .iter()
                    .filter_map(|configuration| configuration.version())
                    .map(str::to_string),
            );

            match output.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(versions)
    }

    async fn delete_function_version(&self, function_name: &str, qualifier: &str) -> ProviderResult<()> {
        debug!(
            "delete_function request: [FunctionName: {}] [Qualifier: {}]",
            function_name, qualifier
        );
        let output = self
            .lambda
            .delete_function()
            .function_name(function_name)
            .qualifier(qualifier)
            .send()
            .await
            .map_err(|e| provider_error("delete_function_version", e))?;
        debug!("delete_function response: {:?}", output);
        Ok(())
    }
}

#[async_trait]
impl TopicService for AwsProvider {
    async fn list_topics(&self) -> ProviderResult<Vec<String>> {
        let mut topics = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            debug!("list_topics request: [NextToken: {:?}]", next_token);
            let output = self
                .sns
                .list_topics()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| provider_error("list_topics", e))?;
            debug!("list_topics response: {:?}", output);

            topics.extend(
                output
                    .topics()
                    .iter()
                    .filter_map(|topic| topic.topic_arn())
                    .map(str::to_string),
            );

            match output.next_token() {
                Some(next) if !next.is_empty() => next_token = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(topics)
    }

    async fn create_topic(&self, name: &str) -> ProviderResult<String> {
        debug!("create_topic request: [Name: {}]", name);
        let output = self
            .sns
            .create_topic()
            .name(name)
            .send()
            .await
            .map_err(|e| provider_error("create_topic", e))?;
        debug!("create_topic response: {:?}", output);

        output
            .topic_arn()
            .map(str::to_string)
            .ok_or_else(|| missing_field("create_topic", "TopicArn"))
    }

    async fn subscribe(
        &self,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
    ) -> ProviderResult<Option<String>> {
        debug!(
            "subscribe request: [TopicArn: {}] [Protocol: {}] [Endpoint: {}]",
            topic_arn, protocol, endpoint
        );
        let output = self
            .sns
            .subscribe()
            .topic_arn(topic_arn)
            .protocol(protocol)
            .endpoint(endpoint)
            .return_subscription_arn(true)
            .send()
            .await
            .map_err(|e| provider_error("subscribe", e))?;
        debug!("subscribe response: {:?}", output);
        Ok(output.subscription_arn().map(str::to_string))
    }
}

#[async_trait]
impl LogService for AwsProvider {
    async fn put_subscription_filter(&self, filter: &SubscriptionFilter) -> ProviderResult<()> {
        debug!("put_subscription_filter request: {:?}", filter);
        let output = self
            .logs
            .put_subscription_filter()
            .log_group_name(&filter.log_group_name)
            .filter_name(&filter.filter_name)
            .filter_pattern(&filter.filter_pattern)
            .destination_arn(&filter.destination_arn)
            .send()
            .await
            .map_err(|e| provider_error("put_subscription_filter", e))?;
        debug!("put_subscription_filter response: {:?}", output);
        Ok(())
    }
}

#[async_trait]
impl ScheduleService for AwsProvider {
    async fn put_rule(&self, rule: &RuleDefinition) -> ProviderResult<String> {
        debug!("put_rule request: {:?}", rule);
        let state = if rule.enabled {
            RuleState::Enabled
        } else {
            RuleState::Disabled
        };
        let output = self
            .events
            .put_rule()
            .name(&rule.name)
            .schedule_expression(&rule.schedule_expression)
            .state(state)
            .set_role_arn(rule.role_arn.clone())
            .set_description(rule.description.clone())
            .send()
            .await
            .map_err(|e| provider_error("put_rule", e))?;
        debug!("put_rule response: {:?}", output);

        output
            .rule_arn()
            .map(str::to_string)
            .ok_or_else(|| missing_field("put_rule", "RuleArn"))
    }

    async fn put_targets(
        &self,
        rule_name: &str,
        targets: &[RuleTarget],
    ) -> ProviderResult<Vec<FailedTarget>> {
        debug!("put_targets request: [Rule: {}] {:?}", rule_name, targets);
        let sdk_targets = targets
            .iter()
            .map(|target| {
                Target::builder()
                    .id(&target.id)
                    .arn(&target.arn)
                    .set_input(target.input.clone())
                    .build()
                    .map_err(|e| ProviderError::other("put_targets", e.to_string()))
            })
            .collect::<ProviderResult<Vec<_>>>()?;

        let output = self
            .events
            .put_targets()
            .rule(rule_name)
            .set_targets(Some(sdk_targets))
            .send()
            .await
            .map_err(|e| provider_error("put_targets", e))?;
        debug!("put_targets response: {:?}", output);

        Ok(output
            .failed_entries()
            .iter()
            .map(|entry| FailedTarget {
                target_id: entry.target_id().unwrap_or_default().to_string(),
                error_code: entry.error_code().map(str::to_string),
                error_message: entry.error_message().map(str::to_string),
            })
            .collect())
    }
}
