use std::sync::Arc;

use toolgraph_model::ModelProvider;

use super::Workflow;
use crate::config::ExecutorConfig;
use crate::event::EventLog;
use crate::model_client::ModelClient;
use crate::tool::{Registry, Tool};

/// [`Workflow`] builder.
pub struct WorkflowBuilder {
    model_client: ModelClient,
    registry: Registry,
    config: ExecutorConfig,
    events: Option<EventLog>,
}

impl WorkflowBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            registry: Registry::new(),
            config: ExecutorConfig::default(),
            events: None,
        }
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.registry.add_tool(tool);
        self
    }

    /// Replaces the whole tool registry.
    #[inline]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the limits applied by every executor.
    #[inline]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Records into an existing log instead of a fresh one.
    #[inline]
    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the workflow.
    #[inline]
    pub fn build(self) -> Workflow {
        Workflow {
            model_client: self.model_client,
            registry: Arc::new(self.registry),
            config: self.config,
            events: self.events.unwrap_or_default(),
        }
    }
}
