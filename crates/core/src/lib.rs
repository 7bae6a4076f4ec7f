//! Dependency-graph execution of inference calls and tool invocations.
//!
//! A workflow is declared as a graph of nodes, each either an inference
//! request or a tool invocation, with explicit dependencies between them.
//! [`ParallelExecutor`] runs every node whose dependencies have completed
//! concurrently, while [`SequentialExecutor`] drives the classic
//! "infer, run tools one by one, feed back" loop as a baseline. Both
//! record an [`EventLog`] that can be rendered as a timeline.
//!
//! [`Workflow`] wires everything together for the common single-prompt case.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod error;
pub mod event;
mod executor;
pub mod graph;
mod model_client;
pub mod tool;
mod workflow;

#[cfg(test)]
mod testing;

pub use config::{ExecutorConfig, ExecutorConfigBuilder};
pub use error::{Error, Result};
pub use event::{EventKind, EventLog, ExecutionEvent};
pub use executor::{ParallelExecutor, SequentialExecutor, WorkflowResult};
pub use graph::{Graph, GraphBuilder, NodeId, NodeKind, NodeOutput};
pub use model_client::{InferenceResponse, ModelClient};
pub use tokio_util::sync::CancellationToken;
pub use workflow::{Workflow, WorkflowBuilder};
