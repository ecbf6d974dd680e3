use std::collections::HashSet;

use super::{DeploymentConfig, ScheduleRule};
use crate::deploy::retry::{BackoffStrategy, RetryConfig};
use crate::error::{DeployError, Result};

const MAX_TIMEOUT_SECS: u32 = 900;
const MIN_MEMORY_MB: u32 = 128;
const MAX_MEMORY_MB: u32 = 10_240;

/// Check a deployment config before any provider call is made
///
/// All problems are collected and reported together.
pub fn validate(config: &DeploymentConfig) -> Result<()> {
    let mut errors = Vec::new();

    if !config.unknown_keys.is_empty() {
        let keys: Vec<&str> = config.unknown_keys.keys().map(String::as_str).collect();
        errors.push(format!("unknown configuration keys: {}", keys.join(", ")));
    }

    require(&mut errors, "functionName", &config.function_name);
    require(&mut errors, "handler", &config.handler);
    require(&mut errors, "role", &config.role);
    require(&mut errors, "runtime", &config.runtime);

    if config.timeout == 0 || config.timeout > MAX_TIMEOUT_SECS {
        errors.push(format!(
            "timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {}",
            config.timeout
        ));
    }

    if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&config.memory_size) {
        errors.push(format!(
            "memorySize must be between {MIN_MEMORY_MB} and {MAX_MEMORY_MB} MB, got {}",
            config.memory_size
        ));
    }

    if let Some(source) = &config.event_source {
        require(&mut errors, "eventSource.eventSourceArn", &source.event_source_arn);
        if source.batch_size == 0 {
            errors.push("eventSource.batchSize must be at least 1".to_string());
        }
    }

    let mut statement_ids = HashSet::new();
    for (index, subscription) in config.push_subscriptions.iter().enumerate() {
        if !subscription.topic_arn.starts_with("arn:") {
            errors.push(format!(
                "pushSubscriptions[{index}].topicArn is not an ARN: {}",
                subscription.topic_arn
            ));
        }
        require(
            &mut errors,
            &format!("pushSubscriptions[{index}].statementId"),
            &subscription.statement_id,
        );
        if !statement_ids.insert(subscription.statement_id.as_str()) {
            errors.push(format!(
                "pushSubscriptions[{index}].statementId {} is used more than once",
                subscription.statement_id
            ));
        }
    }

    if let Some(logging) = &config.logging {
        require(&mut errors, "logging.lambdaFunctionName", &logging.lambda_function_name);
        require(&mut errors, "logging.principal", &logging.principal);
        require(&mut errors, "logging.destinationArn", &logging.destination_arn);
    }

    if let Some(rule) = &config.schedule {
        validate_rule(rule, &mut errors);
    }

    validate_retry(&config.retry, &mut errors);

    if let Some(proxy) = &config.client.https_proxy {
        if !(proxy.starts_with("http://") || proxy.starts_with("https://")) {
            errors.push(format!("httpsProxy must be an http:// or https:// URL, got {proxy}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DeployError::validation(errors.join("; ")))
    }
}

fn validate_rule(rule: &ScheduleRule, errors: &mut Vec<String>) {
    require(errors, "schedule.name", &rule.name);
    if !is_schedule_expression(&rule.schedule_expression) {
        errors.push(format!(
            "schedule.scheduleExpression must look like cron(...) or rate(...), got {:?}",
            rule.schedule_expression
        ));
    }
}

fn validate_retry(retry: &RetryConfig, errors: &mut Vec<String>) {
    if retry.attempts == 0 {
        errors.push("retry.attempts must be at least 1".to_string());
    }
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        errors.push(format!(
            "retry.jitterFactor must be between 0.0 and 1.0, got {}",
            retry.jitter_factor
        ));
    }
    if let BackoffStrategy::Exponential { base } = retry.backoff {
        if !base.is_finite() || base < 1.0 {
            errors.push(format!(
                "retry.backoff.exponential.base must be a finite number of at least 1.0, got {base}"
            ));
        }
    }
    if retry.initial_delay > retry.max_delay {
        errors.push(format!(
            "retry.initialDelay ({:?}) exceeds retry.maxDelay ({:?})",
            retry.initial_delay, retry.max_delay
        ));
    }
}

/// `cron(<fields>)` or `rate(<value> <unit>)`
pub fn is_schedule_expression(expression: &str) -> bool {
    let expression = expression.trim();
    let body = expression
        .strip_prefix("cron(")
        .or_else(|| expression.strip_prefix("rate("))
        .and_then(|rest| rest.strip_suffix(')'));

    match body {
        Some(body) if expression.starts_with("rate(") => {
            let mut parts = body.split_whitespace();
            let value_ok = parts
                .next()
                .and_then(|value| value.parse::<u32>().ok())
                .is_some_and(|value| value > 0);
            let unit_ok = parts.next().is_some_and(|unit| {
                matches!(
                    unit,
                    "minute" | "minutes" | "hour" | "hours" | "day" | "days"
                )
            });
            value_ok && unit_ok && parts.next().is_none()
        }
        Some(body) => body.split_whitespace().count() == 6,
        None => false,
    }
}

fn require(errors: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(format!("{field} is required"));
    }
}
