use std::borrow::Borrow;
use std::fmt::{self, Debug, Display};
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use toolgraph_model::{ModelMessage, ModelProviderError, ToolCallResult};

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::model_client::InferenceResponse;
use crate::tool::{ToolOutput, ToolResult};

/// The identifier of a node, unique within one graph.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    #[inline]
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    #[inline]
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for NodeId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NodeId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// The kind of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A request to the model.
    Inference,
    /// An invocation of a registered tool.
    ToolInvocation,
}

impl NodeKind {
    /// The prefix of generated identifiers.
    #[inline]
    pub fn prefix(self) -> &'static str {
        match self {
            NodeKind::Inference => "inference",
            NodeKind::ToolInvocation => "tool",
        }
    }

    pub(crate) fn event_kind(self) -> EventKind {
        match self {
            NodeKind::Inference => EventKind::Inference,
            NodeKind::ToolInvocation => EventKind::ToolInvocation,
        }
    }
}

/// The result a node produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeOutput {
    /// The complete response of an inference node.
    Inference(InferenceResponse),
    /// The output of a tool node.
    Tool {
        /// The call identifier the model should see in the result message.
        call_id: String,
        /// What the tool returned.
        output: ToolOutput,
    },
}

impl NodeOutput {
    /// The kind of node that produced this output.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeOutput::Inference(_) => NodeKind::Inference,
            NodeOutput::Tool { .. } => NodeKind::ToolInvocation,
        }
    }

    /// The model transcript, or the tool's display summary.
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            NodeOutput::Inference(resp) => &resp.transcript,
            NodeOutput::Tool { output, .. } => &output.display,
        }
    }

    /// Returns the inference response, if this is one.
    #[inline]
    pub fn as_inference(&self) -> Option<&InferenceResponse> {
        match self {
            NodeOutput::Inference(resp) => Some(resp),
            NodeOutput::Tool { .. } => None,
        }
    }

    /// Returns the tool output, if this is one.
    #[inline]
    pub fn as_tool(&self) -> Option<&ToolOutput> {
        match self {
            NodeOutput::Inference(_) => None,
            NodeOutput::Tool { output, .. } => Some(output),
        }
    }

    /// How a dependant inference node sees this output.
    pub(crate) fn to_message(&self) -> ModelMessage {
        match self {
            NodeOutput::Inference(resp) => {
                ModelMessage::Assistant(resp.transcript.clone())
            }
            NodeOutput::Tool { call_id, output } => {
                ModelMessage::Tool(ToolCallResult {
                    id: call_id.clone(),
                    content: output.to_model_content(),
                })
            }
        }
    }
}

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub(crate) type InferenceResult =
    std::result::Result<InferenceResponse, Box<dyn ModelProviderError>>;

pub(crate) type InferenceFn = Box<
    dyn FnOnce(
            Vec<ModelMessage>,
            CancellationToken,
        ) -> BoxFuture<InferenceResult>
        + Send,
>;

pub(crate) type ToolFn =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<ToolResult> + Send>;

/// The bound unit of work of a node.
///
/// Each variant carries a closure with the signature its kind needs; both
/// are driven through [`Task::run`], so the executor never branches on the
/// kind.
pub(crate) enum Task {
    Inference(InferenceFn),
    ToolInvocation { call_id: String, work: ToolFn },
}

impl Task {
    /// Runs the unit of work, handing it the outputs of its dependencies
    /// in declaration order.
    pub(crate) fn run(
        self,
        id: &NodeId,
        inputs: Vec<NodeOutput>,
        cancel: CancellationToken,
    ) -> BoxFuture<Result<NodeOutput>> {
        let node = id.to_string();
        match self {
            Task::Inference(work) => {
                let upstream =
                    inputs.iter().map(NodeOutput::to_message).collect();
                let fut = work(upstream, cancel);
                Box::pin(async move {
                    fut.await
                        .map(NodeOutput::Inference)
                        .map_err(|err| Error::from_inference(node, err))
                })
            }
            Task::ToolInvocation { call_id, work } => {
                let fut = work(cancel);
                Box::pin(async move {
                    fut.await
                        .map(|output| NodeOutput::Tool { call_id, output })
                        .map_err(|err| Error::from_tool(node, err))
                })
            }
        }
    }
}

/// A node in a [`Graph`](super::Graph).
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) depends_on: Vec<NodeId>,
    pub(crate) context: String,
    pub(crate) task: Task,
}

impl Node {
    /// The identifier of this node.
    #[inline]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// The kind of this node.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The dependencies, in declaration order.
    #[inline]
    pub fn depends_on(&self) -> &[NodeId] {
        &self.depends_on
    }

    /// The diagnostic context recorded with this node's event.
    #[inline]
    pub fn context(&self) -> &str {
        &self.context
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}
