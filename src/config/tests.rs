use super::*;
use crate::deploy::retry::BackoffStrategy;
use crate::error::DeployError;
use std::time::Duration;
use tempfile::TempDir;

const YAML_CONFIG: &str = r#"
functionName: orders-processor
description: Processes order events
handler: bootstrap
role: arn:aws:iam::123456789012:role/orders-processor
timeout: 30
memorySize: 256
environment:
  STAGE: prod
region: eu-west-1
eventSource:
  EventSourceArn: arn:aws:kinesis:eu-west-1:123456789012:stream/orders
  BatchSize: 50
  StartingPosition: TRIM_HORIZON
pushSubscriptions:
  - TopicArn: arn:aws:sns:eu-west-1:123456789012:order-created
    StatementId: order-created-invoke
logging:
  LambdaFunctionName: log-shipper
  Principal: logs.eu-west-1.amazonaws.com
  Arn: arn:aws:lambda:eu-west-1:123456789012:function:log-shipper
schedule:
  name: orders-nightly
  scheduleExpression: cron(0 2 * * ? *)
  targetInput:
    mode: reconcile
retry:
  attempts: 5
  backoff:
    exponential:
      base: 2.0
  initialDelay: 200ms
  maxDelay: 5s
"#;

fn minimal() -> DeploymentConfig {
    serde_yaml::from_str(
        "functionName: f\nhandler: bootstrap\nrole: arn:aws:iam::123456789012:role/r\n",
    )
    .unwrap()
}

fn validation_message(config: &DeploymentConfig) -> String {
    match validate(config) {
        Err(DeployError::Validation(msg)) => msg,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_parse_full_yaml_with_legacy_keys() {
    let config = ConfigFormat::Yaml.parse(YAML_CONFIG).unwrap();

    assert_eq!(config.function_name, "orders-processor");
    assert_eq!(config.timeout, 30);
    assert_eq!(config.memory_size, 256);
    assert_eq!(config.environment.get("STAGE").map(String::as_str), Some("prod"));
    assert_eq!(config.client.region.as_deref(), Some("eu-west-1"));

    let source = config.event_source.as_ref().unwrap();
    assert_eq!(source.batch_size, 50);
    assert_eq!(source.starting_position.as_deref(), Some("TRIM_HORIZON"));

    assert_eq!(config.push_subscriptions.len(), 1);
    assert_eq!(config.push_subscriptions[0].topic_name(), "order-created");

    let logging = config.logging.as_ref().unwrap();
    assert_eq!(logging.statement_id(), "log-shipperLoggingId");
    assert_eq!(
        logging.destination_arn,
        "arn:aws:lambda:eu-west-1:123456789012:function:log-shipper"
    );

    let rule = config.schedule.as_ref().unwrap();
    assert!(rule.enabled);
    assert_eq!(rule.target_id(&config.function_name), "orders-processor-orders-nightly");
    assert_eq!(rule.statement_id(), "orders-nightly-invoke");

    assert_eq!(config.retry.attempts, 5);
    assert_eq!(config.retry.backoff, BackoffStrategy::Exponential { base: 2.0 });
    assert_eq!(config.retry.initial_delay, Duration::from_millis(200));
    assert_eq!(config.retry.max_delay, Duration::from_secs(5));

    validate(&config).unwrap();
}

#[test]
fn test_defaults_applied() {
    let config = minimal();

    assert_eq!(config.timeout, 10);
    assert_eq!(config.memory_size, 128);
    assert_eq!(config.runtime, "provided.al2023");
    assert!(!config.publish);
    assert!(config.client.region.is_none());
    assert!(config.event_source.is_none());
    assert!(config.push_subscriptions.is_empty());
    assert!(config.logging.is_none());
    assert!(config.schedule.is_none());
    assert_eq!(config.retry.attempts, 3);
    assert_eq!(
        config.retry.backoff,
        BackoffStrategy::Linear {
            increment: Duration::from_millis(500)
        }
    );
}

#[test]
fn test_parse_json() {
    let json = r#"{
        "functionName": "thumbnailer",
        "handler": "bootstrap",
        "role": "arn:aws:iam::123456789012:role/thumbnailer",
        "eventSource": { "eventSourceArn": "arn:aws:sqs:us-east-1:123456789012:uploads" },
        "pushSource": [
            { "topicArn": "arn:aws:sns:us-east-1:123456789012:uploads", "statementId": "uploads" }
        ]
    }"#;
    let config = ConfigFormat::Json.parse(json).unwrap();

    assert_eq!(config.event_source.unwrap().batch_size, 100);
    assert_eq!(config.push_subscriptions[0].statement_id, "uploads");
}

#[test]
fn test_parse_toml() {
    let toml = r#"
functionName = "reporter"
handler = "bootstrap"
role = "arn:aws:iam::123456789012:role/reporter"
timeout = 60

[schedule]
name = "reporter-hourly"
scheduleExpression = "rate(1 hour)"
isEnabled = false
"#;
    let config = ConfigFormat::Toml.parse(toml).unwrap();

    assert_eq!(config.timeout, 60);
    let rule = config.schedule.unwrap();
    assert!(!rule.enabled);
    assert_eq!(rule.schedule_expression, "rate(1 hour)");
}

#[test]
fn test_format_from_extension() {
    assert_eq!(
        ConfigFormat::from_path(std::path::Path::new("deploy.YML")).unwrap(),
        ConfigFormat::Yaml
    );
    assert_eq!(
        ConfigFormat::from_path(std::path::Path::new("deploy.toml")).unwrap(),
        ConfigFormat::Toml
    );
    assert!(matches!(
        ConfigFormat::from_path(std::path::Path::new("deploy.ini")),
        Err(DeployError::Config(_))
    ));
}

#[test]
fn test_proxy_taken_from_environment() {
    let mut config = minimal();
    config.merge_env_vars_from(|key| match key {
        "https_proxy" => Some("http://proxy.internal:3128".to_string()),
        _ => None,
    });
    assert_eq!(
        config.client.https_proxy.as_deref(),
        Some("http://proxy.internal:3128")
    );
}

#[test]
fn test_configured_proxy_wins_over_environment() {
    let mut config = minimal();
    config.client.https_proxy = Some("http://configured:8080".to_string());
    config.merge_env_vars_from(|_| Some("http://env:3128".to_string()));
    assert_eq!(config.client.https_proxy.as_deref(), Some("http://configured:8080"));
}

#[test]
fn test_empty_proxy_variable_ignored() {
    let mut config = minimal();
    config.merge_env_vars_from(|_| Some("  ".to_string()));
    assert!(config.client.https_proxy.is_none());
}

#[test]
fn test_secret_redacted_in_debug_output() {
    let mut config = minimal();
    config.client.access_key_id = Some("AKIDEXAMPLE".to_string());
    config.client.secret_access_key = Some("wJalrXUtnFEMI".to_string());

    let debug = format!("{:?}", config.client);
    assert!(debug.contains("AKIDEXAMPLE"));
    assert!(!debug.contains("wJalrXUtnFEMI"));
    assert_eq!(
        config.client.static_credentials(),
        Some(("AKIDEXAMPLE", "wJalrXUtnFEMI"))
    );
}

#[test]
fn test_function_definition_mirrors_config() {
    let config = ConfigFormat::Yaml.parse(YAML_CONFIG).unwrap();
    let definition = config.function_definition();

    assert_eq!(definition.function_name, "orders-processor");
    assert_eq!(definition.timeout, 30);
    assert_eq!(definition.memory_size, 256);
    assert_eq!(definition.description, "Processes order events");
}

#[test]
fn test_validation_collects_every_problem() {
    let mut config = minimal();
    config.timeout = 0;
    config.memory_size = 64;
    config.handler = String::new();

    let message = validation_message(&config);
    assert!(message.contains("timeout"));
    assert!(message.contains("memorySize"));
    assert!(message.contains("handler is required"));
}

#[test]
fn test_validation_rejects_zero_batch_size() {
    let mut config = minimal();
    config.event_source = Some(EventSourceSpec {
        event_source_arn: "arn:aws:sqs:us-east-1:123456789012:q".to_string(),
        batch_size: 0,
        starting_position: None,
        enabled: None,
    });
    assert!(validation_message(&config).contains("batchSize"));
}

#[test]
fn test_validation_rejects_duplicate_statement_ids() {
    let mut config = minimal();
    let subscription = PushSubscription {
        topic_arn: "arn:aws:sns:us-east-1:123456789012:t".to_string(),
        statement_id: "same".to_string(),
    };
    config.push_subscriptions = vec![subscription.clone(), subscription];
    assert!(validation_message(&config).contains("used more than once"));
}

#[test]
fn test_validation_rejects_topic_names() {
    let mut config = minimal();
    config.push_subscriptions = vec![PushSubscription {
        topic_arn: "order-created".to_string(),
        statement_id: "s".to_string(),
    }];
    assert!(validation_message(&config).contains("not an ARN"));
}

#[test]
fn test_validation_rejects_malformed_schedule() {
    let mut config = minimal();
    config.schedule = Some(ScheduleRule {
        name: "nightly".to_string(),
        schedule_expression: "every night".to_string(),
        enabled: true,
        role_arn: None,
        description: None,
        target_input: None,
    });
    assert!(validation_message(&config).contains("scheduleExpression"));
}

#[test]
fn test_schedule_expression_shapes() {
    assert!(validation::is_schedule_expression("cron(0 20 * * ? *)"));
    assert!(validation::is_schedule_expression("rate(5 minutes)"));
    assert!(validation::is_schedule_expression("rate(1 day)"));
    assert!(!validation::is_schedule_expression("rate(0 minutes)"));
    assert!(!validation::is_schedule_expression("rate(5 weeks)"));
    assert!(!validation::is_schedule_expression("cron(0 20 * *)"));
    assert!(!validation::is_schedule_expression("0 20 * * ? *"));
}

#[test]
fn test_validation_rejects_zero_retry_attempts() {
    let mut config = minimal();
    config.retry.attempts = 0;
    assert!(validation_message(&config).contains("retry.attempts"));
}

#[test]
fn test_validation_rejects_out_of_range_jitter_factor() {
    let config = ConfigFormat::Yaml
        .parse(
            "functionName: f\nhandler: bootstrap\nrole: r\nretry:\n  jitter: true\n  jitterFactor: -1.0\n",
        )
        .unwrap();
    assert!(validation_message(&config).contains("retry.jitterFactor"));

    let mut config = minimal();
    config.retry.jitter_factor = f64::NAN;
    assert!(validation_message(&config).contains("retry.jitterFactor"));
}

#[test]
fn test_validation_rejects_unusable_exponential_base() {
    for base in [0.5, -2.0, f64::INFINITY, f64::NAN] {
        let mut config = minimal();
        config.retry.backoff = BackoffStrategy::Exponential { base };
        assert!(validation_message(&config).contains("exponential.base"));
    }

    let mut config = minimal();
    config.retry.backoff = BackoffStrategy::Exponential { base: 1e10 };
    validate(&config).unwrap();
}

#[test]
fn test_validation_rejects_initial_delay_above_max() {
    let mut config = minimal();
    config.retry.initial_delay = Duration::from_secs(60);
    config.retry.max_delay = Duration::from_secs(5);
    assert!(validation_message(&config).contains("retry.initialDelay"));
}

#[test]
fn test_unknown_top_level_keys_are_rejected() {
    let config = ConfigFormat::Yaml
        .parse("functionName: f\nhandler: bootstrap\nrole: r\nmemorysize: 512\nregion: eu-west-1\n")
        .unwrap();

    assert_eq!(config.memory_size, 128);
    assert_eq!(config.client.region.as_deref(), Some("eu-west-1"));
    assert!(config.unknown_keys.contains_key("memorysize"));
    assert!(!config.unknown_keys.contains_key("region"));

    let message = validation_message(&config);
    assert!(message.contains("unknown configuration keys: memorysize"));
}

#[test]
fn test_legacy_top_level_aliases_are_not_unknown() {
    let config = ConfigFormat::Json
        .parse(
            r#"{"functionName": "f", "handler": "bootstrap", "role": "r",
                "pushSource": [], "rule": {"name": "n", "scheduleExpression": "rate(1 day)"}}"#,
        )
        .unwrap();
    assert!(config.unknown_keys.is_empty());
    validate(&config).unwrap();
}

#[test]
fn test_validation_rejects_proxy_without_http_scheme() {
    let mut config = minimal();
    config.client.https_proxy = Some("proxy.internal:3128".to_string());
    assert!(validation_message(&config).contains("httpsProxy"));

    config.client.https_proxy = Some("http://proxy.internal:3128".to_string());
    validate(&config).unwrap();
}

#[tokio::test]
async fn test_load_reports_path_on_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deploy.yaml");
    std::fs::write(&path, "functionName: [unterminated").unwrap();

    let err = load_deployment_config(&path).await.unwrap_err();
    assert!(matches!(err, DeployError::Config(_)));
    assert!(err.to_string().contains("deploy.yaml"));
}

#[tokio::test]
async fn test_load_validates_after_parse() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deploy.json");
    std::fs::write(
        &path,
        r#"{"functionName": "f", "handler": "bootstrap", "role": "r", "timeout": 1000}"#,
    )
    .unwrap();

    let err = load_deployment_config(&path).await.unwrap_err();
    assert!(matches!(err, DeployError::Validation(_)));
}

#[tokio::test]
async fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = load_deployment_config(&dir.path().join("absent.yaml"))
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
