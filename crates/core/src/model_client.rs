use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use tokio::select;
use tokio_util::sync::CancellationToken;
use toolgraph_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use tracing::Instrument;

type SendRequestResult = Result<InferenceResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A type-erased handle to a model provider.
///
/// Cloning is cheap, and clones share the same provider, so every graph
/// node can own its own handle.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Wraps a model provider.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // `ModelClient` must stay free of generic parameters, so the
        // provider is erased behind a closure.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    collect_response::<P>(resp_or_err).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and waits until the response completes.
    ///
    /// # Cancel safety
    ///
    /// The response stops streaming as soon as `cancel` fires, and an
    /// error of kind [`ErrorKind::Cancelled`] is returned.
    pub async fn send_request(
        &self,
        req: ModelRequest,
        cancel: &CancellationToken,
    ) -> SendRequestResult {
        let fut = (self.handler_fn)(req);
        select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("request cancelled");
                Err(Box::new(CancelledError) as Box<dyn ModelProviderError>)
            }
            resp = fut => resp,
        }
    }
}

impl Debug for ModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClient").finish_non_exhaustive()
    }
}

/// A completely received response from the model.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InferenceResponse {
    /// The concatenated text deltas.
    pub transcript: String,
    /// Tool calls requested by the model, in emission order.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

impl InferenceResponse {
    /// Returns `true` if the model asked for at least one tool.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Converts this response into a history message.
    pub fn to_message(&self) -> ModelMessage {
        if self.tool_calls.is_empty() {
            ModelMessage::Assistant(self.transcript.clone())
        } else {
            ModelMessage::AssistantToolCalls {
                text: self.transcript.clone(),
                calls: self.tool_calls.clone(),
            }
        }
    }
}

#[derive(Debug)]
struct CancelledError;

impl Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the request was cancelled")
    }
}

impl StdError for CancelledError {}

impl ModelProviderError for CancelledError {
    #[inline]
    fn kind(&self) -> ErrorKind {
        ErrorKind::Cancelled
    }
}

async fn collect_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut transcript = String::new();
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => transcript.push_str(&msg),
            ModelResponseEvent::ToolCall(req) => tool_calls.push(req),
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(InferenceResponse {
        transcript,
        tool_calls,
        finish_reason,
    })
}
