//! A local fake model for testing purpose.

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use toolgraph_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};

pub use preset::*;

const DEFAULT_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    step: Result<PresetResponse, Error>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let preset = match &this.step {
            Ok(preset) => preset,
            Err(err) => {
                return Poll::Ready(Err(Error {
                    message: err.message,
                    kind: err.kind,
                }));
            }
        };
        let preset_events = &preset.events;

        loop {
            if let Some(sleep) = &mut this.sleep {
                ready!(sleep.as_mut().poll(cx));
                this.sleep = None;

                let event = if this.event_idx < preset_events.len() {
                    Some(match &preset_events[this.event_idx] {
                        PresetEvent::MessageDelta(msg) => {
                            ModelResponseEvent::MessageDelta(msg.clone())
                        }
                        PresetEvent::ToolCall(req) => {
                            ModelResponseEvent::ToolCall(req.clone())
                        }
                    })
                } else {
                    Some(ModelResponseEvent::Completed(
                        if preset.has_tool_call() {
                            ModelFinishReason::ToolCalls
                        } else {
                            ModelFinishReason::Stop
                        },
                    ))
                };
                this.event_idx += 1;
                return Poll::Ready(Ok(event));
            }

            // In case this method is called after completion.
            if this.event_idx > preset_events.len() {
                return Poll::Ready(Ok(None));
            }
            this.sleep = Some(Box::pin(sleep(this.delay)));
        }
    }
}

#[derive(Clone)]
enum ConversationStep {
    UserInput,
    AssistantResponse(PresetResponse),
}

#[derive(Default)]
struct Recorder {
    requests: Vec<ModelRequest>,
    attempts: HashMap<usize, u64>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to a request. The step is selected by the
/// number of messages in the request: a request carrying one user message is
/// answered by step `1`, a request that also carries the assistant turn and
/// two tool results is answered by step `4`, and so on. Every slot that is
/// not an assistant response must be filled with [`add_user_turn`] (or
/// [`add_tool_result_turns`]). If there are no enough steps in the script,
/// an error will be returned while streaming.
///
/// Clones share the same request log, so a test can keep one handle for
/// assertions while the engine owns another.
///
/// [`add_user_turn`]: TestModelProvider::add_user_turn
/// [`add_tool_result_turns`]: TestModelProvider::add_tool_result_turns
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    delay: Option<Duration>,
    recorder: Arc<Mutex<Recorder>>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_turn(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    #[inline]
    pub fn add_user_turn(&mut self) {
        self.conversation_script.push(ConversationStep::UserInput);
    }

    /// Reserves one slot per tool result message.
    #[inline]
    pub fn add_tool_result_turns(&mut self, count: usize) {
        for _ in 0..count {
            self.add_user_turn();
        }
    }

    /// Sets the delay before each streamed event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns how many requests have been sent so far.
    pub fn request_count(&self) -> usize {
        self.recorder
            .lock()
            .map(|recorder| recorder.requests.len())
            .unwrap_or_default()
    }

    /// Returns a copy of every request sent so far, in arrival order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.recorder
            .lock()
            .map(|recorder| recorder.requests.clone())
            .unwrap_or_default()
    }

    fn resolve_step(
        &self,
        req: &ModelRequest,
    ) -> Result<PresetResponse, Error> {
        let step_idx = req.messages.len();
        let mut recorder = self.recorder.lock().map_err(|_| Error {
            message: "recorder poisoned",
            kind: ErrorKind::Other,
        })?;
        recorder.requests.push(req.clone());

        let step = match self.conversation_script.get(step_idx) {
            Some(ConversationStep::AssistantResponse(preset)) => preset,
            Some(ConversationStep::UserInput) => {
                return Err(Error {
                    message: "not an assistant response step",
                    kind: ErrorKind::MalformedResponse,
                });
            }
            None => {
                return Err(Error {
                    message: "no enough steps",
                    kind: ErrorKind::Other,
                });
            }
        };

        let attempts = recorder.attempts.entry(step_idx).or_default();
        *attempts += 1;
        match step.failures {
            Some(0) => Err(Error {
                message: "injected failure",
                kind: ErrorKind::RateLimitExceeded,
            }),
            Some(failures) if *attempts <= failures => Err(Error {
                message: "injected failure",
                kind: ErrorKind::RateLimitExceeded,
            }),
            _ => Ok(step.clone()),
        }
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>>
    + Send
    + 'static {
        let resp = TestModelResponse {
            step: self.resolve_step(req),
            event_idx: 0,
            delay: self.delay.unwrap_or(DEFAULT_DELAY),
            sleep: None,
        };
        ready(Ok(resp))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;
    use toolgraph_model::{
        ModelMessage, ModelRequest, ModelTool, ToolCallRequest,
        ToolCallResult,
    };

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> Result<(String, Vec<ToolCallRequest>), Error> {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_calls = vec![];
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?;
            match event {
                None | Some(ModelResponseEvent::Completed(_)) => break,
                Some(ModelResponseEvent::MessageDelta(delta)) => {
                    msg.push_str(&delta);
                }
                Some(ModelResponseEvent::ToolCall(req)) => tool_calls.push(req),
            }
        }
        Ok((msg, tool_calls))
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_user_turn();
        provider.add_assistant_turn(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure, ".to_owned()),
            PresetEvent::MessageDelta("let me take a look.".to_owned()),
            PresetEvent::ToolCall(
                ToolCallRequest::new(
                    "read_file",
                    json!({ "filename": "todo.txt" }),
                )
                .with_id("call:1"),
            ),
        ]));
        provider.add_tool_result_turns(1);
        provider.add_assistant_turn(PresetResponse::text("Nothing to do."));

        let mut req = ModelRequest::with_prompt("Check my todo")
            .with_tools(vec![ModelTool {
                name: "read_file".to_owned(),
                description: "Reads a file".to_owned(),
                parameters: json!({ "type": "object" }),
            }]);
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_calls) = collect_response(resp).await.unwrap();
        assert_eq!(msg, "Sure, let me take a look.");
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].name, "read_file");
        assert_eq!(tool_calls[0].id.as_deref(), Some("call:1"));

        req.messages.push(ModelMessage::AssistantToolCalls {
            text: msg,
            calls: tool_calls,
        });
        req.messages.push(ModelMessage::Tool(ToolCallResult {
            id: "call:1".to_owned(),
            content: "(empty)".to_owned(),
        }));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_calls) = collect_response(resp).await.unwrap();
        assert_eq!(msg, "Nothing to do.");
        assert!(tool_calls.is_empty());
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_step() {
        let provider = TestModelProvider::default();
        let resp = provider
            .send_request(&ModelRequest::with_prompt("Hi"))
            .await
            .unwrap();
        let err = collect_response(resp).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_user_turn();
        provider
            .add_assistant_turn(PresetResponse::text("ok").with_failures(1));

        let req = ModelRequest::with_prompt("Hi");
        let first = provider.send_request(&req).await.unwrap();
        let err = collect_response(first).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);

        let second = provider.send_request(&req).await.unwrap();
        let (msg, _) = collect_response(second).await.unwrap();
        assert_eq!(msg, "ok");
    }
}
