use tracing::{error, info};

use super::Deployer;
use crate::abstractions::EventSourceMappingRequest;
use crate::config::DeploymentConfig;
use crate::error::Result;

/// Result of reconciling the stream/queue mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSourceBinding {
    /// No event source configured
    Skipped,
    Created { uuid: String },
    Updated { uuids: Vec<String> },
}

impl Deployer {
    /// Create the mapping once, afterwards only its batch size changes
    pub async fn bind_event_source(&self, config: &DeploymentConfig) -> Result<EventSourceBinding> {
        let Some(spec) = &config.event_source else {
            return Ok(EventSourceBinding::Skipped);
        };
        let function_name = config.function_name.as_str();
        let source_arn = spec.event_source_arn.as_str();
        let functions = &self.clients.functions;

        let mappings = self
            .call("list_event_source_mappings", || {
                functions.list_event_source_mappings(function_name, source_arn)
            })
            .await
            .inspect_err(|err| error!("Unable to list event source mappings. [Error: {}]", err))?;

        if mappings.is_empty() {
            let request = EventSourceMappingRequest {
                function_name: function_name.to_string(),
                event_source_arn: source_arn.to_string(),
                batch_size: spec.batch_size,
                starting_position: spec.starting_position.clone(),
                enabled: spec.enabled,
            };
            let uuid = self
                .call("create_event_source_mapping", || {
                    functions.create_event_source_mapping(&request)
                })
                .await
                .inspect_err(|err| {
                    error!("Unable to create event source mapping. [Error: {}]", err)
                })?;
            info!(
                "Created event source mapping. [FunctionName: {}] [EventSourceArn: {}] [UUID: {}]",
                function_name, source_arn, uuid
            );
            return Ok(EventSourceBinding::Created { uuid });
        }

        let mut uuids = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            self.call("update_event_source_mapping", || {
                functions.update_event_source_mapping(&mapping.uuid, spec.batch_size)
            })
            .await
            .inspect_err(|err| {
                error!(
                    "Unable to update event source mapping. [UUID: {}] [Error: {}]",
                    mapping.uuid, err
                )
            })?;
            info!(
                "Updated event source mapping. [UUID: {}] [BatchSize: {}]",
                mapping.uuid, spec.batch_size
            );
            uuids.push(mapping.uuid);
        }

        Ok(EventSourceBinding::Updated { uuids })
    }
}
