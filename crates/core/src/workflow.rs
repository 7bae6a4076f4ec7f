mod builder;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use toolgraph_model::{ModelMessage, ModelRequest};
use tracing::Instrument;

use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::event::{EventKind, EventLog};
use crate::executor::{
    ParallelExecutor, SequentialExecutor, WorkflowResult, with_timeout,
};
use crate::graph::{Graph, GraphBuilder, NodeOutput};
use crate::model_client::ModelClient;
use crate::tool::Registry;
pub use builder::WorkflowBuilder;

const DISCOVERY: &str = "discovery";

/// A model, a set of tools and the limits to run them with.
///
/// Every executor created from a workflow records into the same
/// [`EventLog`], so runs can be compared on one timeline or, after
/// [`EventLog::clear`], one at a time.
#[derive(Clone, Debug)]
pub struct Workflow {
    model_client: ModelClient,
    registry: Arc<Registry>,
    config: ExecutorConfig,
    events: EventLog,
}

impl Workflow {
    /// The shared event log.
    #[inline]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// The registered tools.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a graph whose nodes use this workflow's model and tools.
    #[inline]
    pub fn graph_builder(&self) -> GraphBuilder {
        GraphBuilder::new(self.model_client.clone(), Arc::clone(&self.registry))
    }

    /// Creates a parallel executor recording into the shared log.
    #[inline]
    pub fn parallel_executor(&self) -> ParallelExecutor {
        ParallelExecutor::new(self.config.clone())
            .with_event_log(self.events.clone())
    }

    /// Creates a sequential executor recording into the shared log.
    #[inline]
    pub fn sequential_executor(&self) -> SequentialExecutor {
        SequentialExecutor::new(
            self.model_client.clone(),
            Arc::clone(&self.registry),
            self.config.clone(),
        )
        .with_event_log(self.events.clone())
    }

    /// Runs a graph built from [`graph_builder`](Self::graph_builder).
    #[inline]
    pub async fn run_graph(&self, graph: Graph) -> Result<WorkflowResult> {
        self.parallel_executor().run(graph).await
    }

    /// Answers `prompt`, running every requested tool at the same time.
    ///
    /// One inference call discovers the tool calls. If there is none its
    /// text is returned as is. Otherwise each call becomes a tool node, and
    /// a final inference node depending on all of them sees the whole
    /// exchange and produces the answer.
    #[inline]
    pub async fn run_prompt_with_tools<S: Into<String>>(
        &self,
        prompt: S,
    ) -> Result<String> {
        let cancel = CancellationToken::new();
        self.run_prompt_with_tools_with_cancel(prompt, &cancel).await
    }

    /// Like [`run_prompt_with_tools`](Self::run_prompt_with_tools), but
    /// stops early once `cancel` fires.
    pub async fn run_prompt_with_tools_with_cancel<S: Into<String>>(
        &self,
        prompt: S,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let prompt = prompt.into();
        let timeout = self.config.operation_timeout;

        let req = ModelRequest::with_prompt(prompt.as_str())
            .with_tools(self.registry.definitions());
        let discovery = async {
            self.model_client
                .send_request(req, cancel)
                .await
                .map_err(|err| Error::from_inference(DISCOVERY, err))
        };
        let resp = self
            .events
            .span(
                EventKind::Inference,
                DISCOVERY,
                prompt.as_str(),
                with_timeout(DISCOVERY, timeout, discovery),
            )
            .instrument(debug_span!("discovery"))
            .await?;

        if !resp.has_tool_calls() {
            debug!("no tool requested");
            return Ok(resp.transcript);
        }
        debug!("{} tool calls requested", resp.tool_calls.len());

        let mut builder = self.graph_builder();
        let mut calls = resp.tool_calls;
        let mut tool_nodes = Vec::with_capacity(calls.len());
        for call in &mut calls {
            if let Some(call_id) = call.id.as_deref() {
                let call_id = unique_call_id(builder.graph(), call_id);
                call.id = Some(call_id);
            }
            let id = builder.add_tool_node(call, &[])?;
            // The follow-up must pair every result with a call id.
            if call.id.is_none() {
                call.id = Some(id.to_string());
            }
            tool_nodes.push(id);
        }
        let followup = builder.add_inference_node_with_messages(
            vec![
                ModelMessage::User(prompt),
                ModelMessage::AssistantToolCalls {
                    text: resp.transcript,
                    calls,
                },
            ],
            &tool_nodes,
        )?;

        let mut result = self
            .parallel_executor()
            .run_with_cancel(builder.build(), cancel)
            .await?;
        let answer = match result.remove(followup.as_str()) {
            Some(NodeOutput::Inference(resp)) => resp.transcript,
            _ => String::new(),
        };
        Ok(answer)
    }
}

// `call_id`, or `call_id_<n>` with the smallest free `n` when its tool node
// is already taken.
fn unique_call_id(graph: &Graph, call_id: &str) -> String {
    let free =
        |candidate: &String| !graph.contains(&format!("tool_{candidate}"));
    let original = call_id.to_owned();
    if free(&original) {
        return original;
    }
    (1u64..)
        .map(|n| format!("{call_id}_{n}"))
        .find(free)
        .unwrap_or(original)
}
