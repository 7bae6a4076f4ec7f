use std::time::Duration;

use thiserror::Error;
use toolgraph_model::{ErrorKind as ModelErrorKind, ModelProviderError};

use crate::graph::NodeId;
use crate::tool::{self, ErrorKind as ToolErrorKind};

/// A specialized `Result` for graph construction and execution.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or running a workflow.
///
/// The first four variants are build-time errors: the offending node is
/// never added to the graph. The rest are run-time errors and carry the
/// name of the node (or sequential round) that produced them.
#[derive(Debug, Error)]
pub enum Error {
    /// The dependency set would make the graph cyclic.
    #[error("node `{node}` would create a dependency cycle")]
    CycleDetected {
        /// The node that was being added.
        node: NodeId,
    },

    /// A dependency refers to a node that does not exist yet.
    #[error("node `{node}` depends on unknown node `{dependency}`")]
    UnknownDependency {
        /// The node that was being added.
        node: NodeId,
        /// The missing dependency.
        dependency: NodeId,
    },

    /// A node with the same identifier is already in the graph.
    #[error("node `{0}` already exists")]
    DuplicateNode(NodeId),

    /// The requested tool is not registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The inference client returned an error.
    #[error("inference failed in `{node}` ({kind}): {message}")]
    InferenceFailed {
        /// The node or round that issued the request.
        node: String,
        /// The classification reported by the provider.
        kind: ModelErrorKind,
        /// The provider's error message.
        message: String,
    },

    /// A tool raised an error.
    #[error("tool execution failed in `{node}`: {source}")]
    ToolExecutionFailed {
        /// The node that invoked the tool.
        node: String,
        /// The error reported by the tool.
        #[source]
        source: tool::Error,
    },

    /// An operation exceeded its deadline.
    #[error("`{node}` timed out after {timeout:?}")]
    OperationTimedOut {
        /// The node or round that timed out.
        node: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The sequential executor hit its round-trip cap.
    #[error("exceeded the maximum of {0} inference rounds")]
    TooManyRounds(usize),

    /// The run was cancelled by the caller.
    #[error("`{node}` was cancelled")]
    Cancelled {
        /// The node or round that observed the cancellation.
        node: String,
    },
}

impl Error {
    pub(crate) fn from_inference(
        node: impl Into<String>,
        err: Box<dyn ModelProviderError>,
    ) -> Self {
        let node = node.into();
        match err.kind() {
            ModelErrorKind::Cancelled => Error::Cancelled { node },
            kind => Error::InferenceFailed {
                node,
                kind,
                message: err.to_string(),
            },
        }
    }

    pub(crate) fn from_tool(node: impl Into<String>, err: tool::Error) -> Self {
        let node = node.into();
        match err.kind() {
            ToolErrorKind::Cancelled => Error::Cancelled { node },
            _ => Error::ToolExecutionFailed { node, source: err },
        }
    }

    /// Returns `true` for errors raised while building a graph.
    #[inline]
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Error::CycleDetected { .. }
                | Error::UnknownDependency { .. }
                | Error::DuplicateNode(_)
                | Error::ToolNotFound(_)
        )
    }
}
