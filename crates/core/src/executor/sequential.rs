use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use toolgraph_model::{ModelMessage, ModelRequest, ToolCallResult};
use tracing::Instrument;

use super::with_timeout;
use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::event::{EventKind, EventLog};
use crate::model_client::ModelClient;
use crate::tool::Registry;

/// The baseline loop: ask the model, run the requested tools one at a
/// time, feed the results back, and repeat until the model stops asking.
///
/// Nothing ever overlaps, which makes its timeline the reference the
/// [`ParallelExecutor`](super::ParallelExecutor) is compared against.
#[derive(Clone, Debug)]
pub struct SequentialExecutor {
    model_client: ModelClient,
    registry: Arc<Registry>,
    config: ExecutorConfig,
    events: EventLog,
}

impl SequentialExecutor {
    /// Creates an executor recording into a fresh event log.
    pub fn new(
        model_client: ModelClient,
        registry: Arc<Registry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            model_client,
            registry,
            config,
            events: EventLog::new(),
        }
    }

    /// Records events into `events` instead.
    #[inline]
    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// The log every round and tool call is recorded into.
    #[inline]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Answers `prompt`, returning the final text of the model.
    #[inline]
    pub async fn run<S: Into<String>>(&self, prompt: S) -> Result<String> {
        self.run_with_cancel(prompt, &CancellationToken::new()).await
    }

    /// Answers `prompt`, stopping early once `cancel` fires.
    pub async fn run_with_cancel<S: Into<String>>(
        &self,
        prompt: S,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut messages = vec![ModelMessage::User(prompt.into())];
        let tools = self.registry.definitions();
        let timeout = self.config.operation_timeout;
        let mut next_call_id = 0;

        for round in 0..self.config.max_rounds {
            let label = format!("round_{round}");
            let context = pending_content(&messages);
            let req = ModelRequest {
                messages: messages.clone(),
                tools: tools.clone(),
            };
            let inference = async {
                self.model_client
                    .send_request(req, cancel)
                    .await
                    .map_err(|err| Error::from_inference(label.as_str(), err))
            };
            let resp = self
                .events
                .span(
                    EventKind::Inference,
                    label.as_str(),
                    context,
                    with_timeout(&label, timeout, inference),
                )
                .instrument(debug_span!("round", n = round))
                .await?;

            if !resp.has_tool_calls() {
                debug!("finished after {} rounds", round + 1);
                return Ok(resp.transcript);
            }

            let mut calls = resp.tool_calls;
            for call in &mut calls {
                if call.id.is_none() {
                    call.id = Some(format!("call_{next_call_id}"));
                    next_call_id += 1;
                }
            }
            messages.push(ModelMessage::AssistantToolCalls {
                text: resp.transcript,
                calls: calls.clone(),
            });

            for call in calls {
                let call_id = call.id.unwrap_or_default();
                let name = format!("tool_{call_id}");
                let tool = self
                    .registry
                    .lookup(&call.name)
                    .ok_or_else(|| Error::ToolNotFound(call.name.clone()))?;

                trace!("running {} with {}", call.name, call.arguments);
                let context = format!("{} {}", call.name, call.arguments);
                let invocation = async {
                    tool.execute(call.arguments, cancel.clone())
                        .await
                        .map_err(|err| Error::from_tool(name.as_str(), err))
                };
                let output = self
                    .events
                    .span(
                        EventKind::ToolInvocation,
                        name.as_str(),
                        context,
                        with_timeout(&name, timeout, invocation),
                    )
                    .await?;

                messages.push(ModelMessage::Tool(ToolCallResult {
                    id: call_id,
                    content: output.to_model_content(),
                }));
            }
        }

        warn!("gave up after {} rounds", self.config.max_rounds);
        Err(Error::TooManyRounds(self.config.max_rounds))
    }
}

// What the model has not seen answered yet: everything after its latest
// turn.
fn pending_content(messages: &[ModelMessage]) -> String {
    let start = messages
        .iter()
        .rposition(|msg| {
            matches!(
                msg,
                ModelMessage::Assistant(_)
                    | ModelMessage::AssistantToolCalls { .. }
            )
        })
        .map_or(0, |idx| idx + 1);
    messages[start..]
        .iter()
        .map(|msg| msg.content())
        .collect::<Vec<_>>()
        .join("\n")
}
