//! Pub/sub topic subscriptions
//!
//! Each configured topic is reconciled in turn: ensure the topic exists,
//! subscribe the function, then replace the invoke permission that lets the
//! topic call it. A failure stops the loop; topics already handled stay bound.

use tracing::{error, info, warn};

use super::Deployer;
use crate::config::{DeploymentConfig, PushSubscription};
use crate::error::Result;

pub const SNS_PRINCIPAL: &str = "sns.amazonaws.com";
pub const LAMBDA_PROTOCOL: &str = "lambda";

impl Deployer {
    /// Returns the ARNs of the topics the function is now subscribed to
    pub async fn subscribe_topics(
        &self,
        config: &DeploymentConfig,
        function_arn: &str,
    ) -> Result<Vec<String>> {
        let mut subscribed = Vec::with_capacity(config.push_subscriptions.len());

        for subscription in &config.push_subscriptions {
            let topic_arn = self.ensure_topic(subscription).await?;
            self.subscribe_function(&topic_arn, function_arn).await?;
            self.replace_invoke_permission(
                &config.function_name,
                &subscription.statement_id,
                SNS_PRINCIPAL,
                &topic_arn,
            )
            .await?;
            subscribed.push(topic_arn);
        }

        Ok(subscribed)
    }

    /// Look the topic up by ARN and create it from the ARN's name segment if absent
    async fn ensure_topic(&self, subscription: &PushSubscription) -> Result<String> {
        let topics = &self.clients.topics;
        let wanted = subscription.topic_arn.as_str();

        let existing = self
            .call("list_topics", || topics.list_topics())
            .await
            .inspect_err(|err| error!("Unable to list topics. [Error: {}]", err))?;

        if existing.iter().any(|arn| arn == wanted) {
            info!("Topic exists. [TopicArn: {}]", wanted);
            return Ok(wanted.to_string());
        }

        let name = subscription.topic_name();
        info!("Topic not found, creating. [TopicName: {}]", name);
        let created = self
            .call("create_topic", || topics.create_topic(name))
            .await
            .inspect_err(|err| error!("Unable to create topic. [Error: {}]", err))?;

        if created != wanted {
            warn!(
                "Created topic ARN differs from the configured one. [Configured: {}] [Created: {}]",
                wanted, created
            );
        }
        Ok(created)
    }

    async fn subscribe_function(&self, topic_arn: &str, function_arn: &str) -> Result<()> {
        let topics = &self.clients.topics;
        let subscription_arn = self
            .call("subscribe", || {
                topics.subscribe(topic_arn, LAMBDA_PROTOCOL, function_arn)
            })
            .await
            .inspect_err(|err| error!("Unable to subscribe to topic. [Error: {}]", err))?;

        info!(
            "Subscribed to topic. [TopicArn: {}] [SubscriptionArn: {}]",
            topic_arn,
            subscription_arn.as_deref().unwrap_or("pending confirmation")
        );
        Ok(())
    }
}
