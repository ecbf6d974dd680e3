//! In-memory provider for tests
//!
//! Keeps just enough control-plane state to exercise the deployment
//! workflow, records every call in order, and lets tests queue failures per
//! operation.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::provider::*;

pub const MOCK_ACCOUNT_ID: &str = "123456789012";
pub const MOCK_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
struct MockFunction {
    definition: FunctionDefinition,
    code: Vec<u8>,
    versions: Vec<String>,
    next_version: u64,
}

#[derive(Default)]
struct MockState {
    functions: HashMap<String, MockFunction>,
    mappings: Vec<EventSourceMapping>,
    next_mapping: u32,
    permissions: HashMap<String, Vec<PermissionGrant>>,
    topics: Vec<String>,
    subscriptions: Vec<(String, String)>,
    log_groups: HashSet<String>,
    filters: Vec<SubscriptionFilter>,
    rules: HashMap<String, RuleDefinition>,
    targets: HashMap<String, Vec<RuleTarget>>,
    rejected_targets: HashSet<String>,
    update_statuses: HashMap<String, VecDeque<LastUpdateStatus>>,
    failures: HashMap<String, VecDeque<ProviderError>>,
    calls: Vec<String>,
}

impl MockState {
    /// Record the call and pop a queued failure for it, if any
    fn record(&mut self, operation: &str) -> ProviderResult<()> {
        self.calls.push(operation.to_string());
        match self
            .failures
            .get_mut(operation)
            .and_then(|queue| queue.pop_front())
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn function_mut(
        &mut self,
        operation: &'static str,
        name: &str,
    ) -> ProviderResult<&mut MockFunction> {
        self.functions.get_mut(name).ok_or_else(|| {
            ProviderError::not_found(
                operation,
                format!("Function not found: {}", function_arn(name)),
            )
        })
    }
}

/// Mock implementation of every provider service
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

pub fn function_arn(name: &str) -> String {
    format!("arn:aws:lambda:{MOCK_REGION}:{MOCK_ACCOUNT_ID}:function:{name}")
}

pub fn topic_arn(name: &str) -> String {
    format!("arn:aws:sns:{MOCK_REGION}:{MOCK_ACCOUNT_ID}:{name}")
}

pub fn rule_arn(name: &str) -> String {
    format!("arn:aws:events:{MOCK_REGION}:{MOCK_ACCOUNT_ID}:rule/{name}")
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an existing function with only `$LATEST`
    pub fn with_function(self, name: &str) -> Self {
        self.lock().functions.insert(
            name.to_string(),
            MockFunction {
                definition: FunctionDefinition {
                    function_name: name.to_string(),
                    description: String::new(),
                    handler: "bootstrap".to_string(),
                    role: format!("arn:aws:iam::{MOCK_ACCOUNT_ID}:role/existing"),
                    timeout: 3,
                    memory_size: 128,
                    runtime: "provided.al2023".to_string(),
                    environment: HashMap::new(),
                    publish: false,
                },
                code: Vec::new(),
                versions: vec!["$LATEST".to_string()],
                next_version: 1,
            },
        );
        self
    }

    /// Replace the function's version list, `$LATEST` included
    pub fn with_versions(self, name: &str, versions: &[&str]) -> Self {
        {
            let mut state = self.lock();
            if let Some(function) = state.functions.get_mut(name) {
                function.versions = versions.iter().map(|v| v.to_string()).collect();
                function.next_version = versions
                    .iter()
                    .filter_map(|v| v.parse::<u64>().ok())
                    .max()
                    .unwrap_or(0)
                    + 1;
            }
        }
        self
    }

    pub fn with_topic(self, arn: &str) -> Self {
        self.lock().topics.push(arn.to_string());
        self
    }

    pub fn with_log_group(self, name: &str) -> Self {
        self.lock().log_groups.insert(name.to_string());
        self
    }

    pub fn with_event_source_mapping(self, function: &str, source_arn: &str, batch_size: u32) -> Self {
        {
            let mut state = self.lock();
            state.next_mapping += 1;
            let uuid = format!("mapping-{}", state.next_mapping);
            state.mappings.push(EventSourceMapping {
                uuid,
                event_source_arn: source_arn.to_string(),
                function_arn: function_arn(function),
                batch_size: Some(batch_size),
            });
        }
        self
    }

    pub fn with_permission(self, function: &str, statement_id: &str, principal: &str) -> Self {
        self.lock()
            .permissions
            .entry(function.to_string())
            .or_default()
            .push(PermissionGrant {
                function_name: function.to_string(),
                statement_id: statement_id.to_string(),
                action: "lambda:InvokeFunction".to_string(),
                principal: principal.to_string(),
                source_arn: None,
            });
        self
    }

    /// Report the target with this id as failed on every `put_targets`
    pub fn reject_target(&self, target_id: &str) {
        self.lock().rejected_targets.insert(target_id.to_string());
    }

    /// Fail the next call of `operation` with `err`
    pub fn fail_next(&self, operation: &str, err: ProviderError) {
        self.fail_times(operation, 1, err);
    }

    /// Fail the next `times` calls of `operation` with `err`
    pub fn fail_times(&self, operation: &str, times: usize, err: ProviderError) {
        let mut state = self.lock();
        let queue = state.failures.entry(operation.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    /// Statuses reported by successive `get_function` calls before `Successful`
    pub fn queue_update_statuses(&self, name: &str, statuses: Vec<LastUpdateStatus>) {
        self.lock()
            .update_statuses
            .entry(name.to_string())
            .or_default()
            .extend(statuses);
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == operation).count()
    }

    pub fn function_exists(&self, name: &str) -> bool {
        self.lock().functions.contains_key(name)
    }

    pub fn function_definition(&self, name: &str) -> Option<FunctionDefinition> {
        self.lock()
            .functions
            .get(name)
            .map(|function| function.definition.clone())
    }

    pub fn function_code(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().functions.get(name).map(|f| f.code.clone())
    }

    pub fn versions(&self, name: &str) -> Vec<String> {
        self.lock()
            .functions
            .get(name)
            .map(|f| f.versions.clone())
            .unwrap_or_default()
    }

    pub fn event_source_mappings(&self) -> Vec<EventSourceMapping> {
        self.lock().mappings.clone()
    }

    pub fn permissions(&self, function: &str) -> Vec<PermissionGrant> {
        self.lock()
            .permissions
            .get(function)
            .cloned()
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.lock().topics.clone()
    }

    /// `(topic ARN, endpoint)` pairs
    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.lock().subscriptions.clone()
    }

    pub fn subscription_filters(&self) -> Vec<SubscriptionFilter> {
        self.lock().filters.clone()
    }

    pub fn rule(&self, name: &str) -> Option<RuleDefinition> {
        self.lock().rules.get(name).cloned()
    }

    pub fn rule_targets(&self, name: &str) -> Vec<RuleTarget> {
        self.lock().targets.get(name).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl FunctionService for MockProvider {
    async fn get_function(&self, function_name: &str) -> ProviderResult<FunctionInfo> {
        let mut state = self.lock();
        state.record("get_function")?;
        state.function_mut("get_function", function_name)?;
        let status = state
            .update_statuses
            .get_mut(function_name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(LastUpdateStatus::Successful);
        Ok(FunctionInfo {
            function_arn: function_arn(function_name),
            last_update_status: Some(status),
        })
    }

    async fn create_function(
        &self,
        definition: &FunctionDefinition,
        zip_file: &[u8],
    ) -> ProviderResult<String> {
        let mut state = self.lock();
        state.record("create_function")?;
        if state.functions.contains_key(&definition.function_name) {
            return Err(ProviderError::classify(
                "create_function",
                Some("ResourceConflictException"),
                Some(409),
                format!("Function already exist: {}", definition.function_name),
            ));
        }

        let mut versions = vec!["$LATEST".to_string()];
        let mut next_version = 1;
        if definition.publish {
            versions.push("1".to_string());
            next_version = 2;
        }
        state.functions.insert(
            definition.function_name.clone(),
            MockFunction {
                definition: definition.clone(),
                code: zip_file.to_vec(),
                versions,
                next_version,
            },
        );
        Ok(function_arn(&definition.function_name))
    }

    async fn update_function_code(&self, function_name: &str, zip_file: &[u8]) -> ProviderResult<()> {
        let mut state = self.lock();
        state.record("update_function_code")?;
        state.function_mut("update_function_code", function_name)?.code = zip_file.to_vec();
        Ok(())
    }

    async fn update_function_configuration(
        &self,
        definition: &FunctionDefinition,
    ) -> ProviderResult<()> {
        let mut state = self.lock();
        state.record("update_function_configuration")?;
        state
            .function_mut("update_function_configuration", &definition.function_name)?
            .definition = definition.clone();
        Ok(())
    }

    async fn list_event_source_mappings(
        &self,
        function_name: &str,
        event_source_arn: &str,
    ) -> ProviderResult<Vec<EventSourceMapping>> {
        let mut state = self.lock();
        state.record("list_event_source_mappings")?;
        let arn = function_arn(function_name);
        Ok(state
            .mappings
            .iter()
            .filter(|m| m.function_arn == arn && m.event_source_arn == event_source_arn)
            .cloned()
            .collect())
    }

    async fn create_event_source_mapping(
        &self,
        request: &EventSourceMappingRequest,
    ) -> ProviderResult<String> {
        let mut state = self.lock();
        state.record("create_event_source_mapping")?;
        state.next_mapping += 1;
        let uuid = format!("mapping-{}", state.next_mapping);
        state.mappings.push(EventSourceMapping {
            uuid: uuid.clone(),
            event_source_arn: request.event_source_arn.clone(),
            function_arn: function_arn(&request.function_name),
            batch_size: Some(request.batch_size),
        });
        Ok(uuid)
    }

    async fn update_event_source_mapping(&self, uuid: &str, batch_size: u32) -> ProviderResult<()> {
        let mut state = self.lock();
        state.record("update_event_source_mapping")?;
        let mapping = state
            .mappings
            .iter_mut()
            .find(|m| m.uuid == uuid)
            .ok_or_else(|| {
                ProviderError::not_found(
                    "update_event_source_mapping",
                    format!("The resource you requested does not exist. (Service: Lambda; UUID: {uuid})"),
                )
            })?;
        mapping.batch_size = Some(batch_size);
        Ok(())
    }

    async fn add_permission(&self, grant: &PermissionGrant) -> ProviderResult<()> {
        let mut state = self.lock();
        state.record("add_permission")?;
        let policy = state
            .permissions
            .entry(grant.function_name.clone())
            .or_default();
        if policy.iter().any(|p| p.statement_id == grant.statement_id) {
            return Err(ProviderError::duplicate_statement(
                "add_permission",
                &grant.statement_id,
            ));
        }
        policy.push(grant.clone());
        Ok(())
    }

    async fn remove_permission(&self, function_name: &str, statement_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        state.record("remove_permission")?;
        let policy = state.permissions.entry(function_name.to_string()).or_default();
        let before = policy.len();
        policy.retain(|p| p.statement_id != statement_id);
        if policy.len() == before {
            return Err(ProviderError::not_found(
                "remove_permission",
                format!("Statement {statement_id} is not found in resource policy."),
            ));
        }
        Ok(())
    }

    async fn publish_version(&self, function_name: &str) -> ProviderResult<String> {
        let mut state = self.lock();
        state.record("publish_version")?;
        let function = state.function_mut("publish_version", function_name)?;
        let version = function.next_version.to_string();
        function.next_version += 1;
        function.versions.push(version.clone());
        Ok(version)
    }

    async fn list_versions(&self, function_name: &str) -> ProviderResult<Vec<String>> {
        let mut state = self.lock();
        state.record("list_versions")?;
        Ok(state.function_mut("list_versions", function_name)?.versions.clone())
    }

    async fn delete_function_version(&self, function_name: &str, qualifier: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        state.record("delete_function_version")?;
        let function = state.function_mut("delete_function_version", function_name)?;
        let before = function.versions.len();
        function.versions.retain(|v| v != qualifier);
        if function.versions.len() == before {
            return Err(ProviderError::not_found(
                "delete_function_version",
                format!("Function not found: {}:{}", function_arn(function_name), qualifier),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TopicService for MockProvider {
    async fn list_topics(&self) -> ProviderResult<Vec<String>> {
        let mut state = self.lock();
        state.record("list_topics")?;
        Ok(state.topics.clone())
    }

    async fn create_topic(&self, name: &str) -> ProviderResult<String> {
        let mut state = self.lock();
        state.record("create_topic")?;
        let arn = topic_arn(name);
        if !state.topics.contains(&arn) {
            state.topics.push(arn.clone());
        }
        Ok(arn)
    }

    async fn subscribe(
        &self,
        topic_arn: &str,
        _protocol: &str,
        endpoint: &str,
    ) -> ProviderResult<Option<String>> {
        let mut state = self.lock();
        state.record("subscribe")?;
        if !state.topics.iter().any(|t| t == topic_arn) {
            return Err(ProviderError::classify(
                "subscribe",
                Some("NotFound"),
                Some(404),
                "Topic does not exist",
            ));
        }
        state
            .subscriptions
            .push((topic_arn.to_string(), endpoint.to_string()));
        Ok(Some(format!("{}:{}", topic_arn, state.subscriptions.len())))
    }
}

#[async_trait]
impl LogService for MockProvider {
    async fn put_subscription_filter(&self, filter: &SubscriptionFilter) -> ProviderResult<()> {
        let mut state = self.lock();
        state.record("put_subscription_filter")?;
        if !state.log_groups.contains(&filter.log_group_name) {
            return Err(ProviderError::classify(
                "put_subscription_filter",
                Some("ResourceNotFoundException"),
                Some(400),
                "The specified log group does not exist.",
            ));
        }
        state.filters.retain(|f| {
            !(f.log_group_name == filter.log_group_name && f.filter_name == filter.filter_name)
        });
        state.filters.push(filter.clone());
        Ok(())
    }
}

#[async_trait]
impl ScheduleService for MockProvider {
    async fn put_rule(&self, rule: &RuleDefinition) -> ProviderResult<String> {
        let mut state = self.lock();
        state.record("put_rule")?;
        state.rules.insert(rule.name.clone(), rule.clone());
        Ok(rule_arn(&rule.name))
    }

    async fn put_targets(
        &self,
        rule_name: &str,
        targets: &[RuleTarget],
    ) -> ProviderResult<Vec<FailedTarget>> {
        let mut state = self.lock();
        state.record("put_targets")?;
        if !state.rules.contains_key(rule_name) {
            return Err(ProviderError::not_found(
                "put_targets",
                format!("Rule {rule_name} does not exist."),
            ));
        }
        let (rejected, accepted): (Vec<&RuleTarget>, Vec<&RuleTarget>) = targets
            .iter()
            .partition(|t| state.rejected_targets.contains(&t.id));
        let existing = state.targets.entry(rule_name.to_string()).or_default();
        for target in accepted {
            existing.retain(|t| t.id != target.id);
            existing.push(target.clone());
        }
        Ok(rejected
            .into_iter()
            .map(|t| FailedTarget {
                target_id: t.id.clone(),
                error_code: Some("ConcurrentModificationException".to_string()),
                error_message: Some("Target could not be added".to_string()),
            })
            .collect())
    }
}
