//! Executors that turn declared work into results.

mod parallel;
mod sequential;

use std::collections::HashMap;
use std::collections::hash_map;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeOutput};

pub use parallel::ParallelExecutor;
pub use sequential::SequentialExecutor;

/// The outputs of a successful graph run, keyed by node id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkflowResult {
    outputs: HashMap<NodeId, NodeOutput>,
}

impl WorkflowResult {
    /// Returns the output of a node.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&NodeOutput> {
        self.outputs.get(id)
    }

    /// Returns the text of a node's output.
    #[inline]
    pub fn text(&self, id: &str) -> Option<&str> {
        self.get(id).map(NodeOutput::text)
    }

    /// Returns `true` if the node produced an output.
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.outputs.contains_key(id)
    }

    /// Returns the number of outputs.
    #[inline]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Returns `true` if the run had no node.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Iterates over the ids of the nodes, in arbitrary order.
    #[inline]
    pub fn keys(&self) -> hash_map::Keys<'_, NodeId, NodeOutput> {
        self.outputs.keys()
    }

    /// Iterates over every output, in arbitrary order.
    #[inline]
    pub fn iter(&self) -> hash_map::Iter<'_, NodeId, NodeOutput> {
        self.outputs.iter()
    }

    /// Takes the output of a node out of the result.
    #[inline]
    pub fn remove(&mut self, id: &str) -> Option<NodeOutput> {
        self.outputs.remove(id)
    }

    /// Consumes the result, returning the underlying map.
    #[inline]
    pub fn into_inner(self) -> HashMap<NodeId, NodeOutput> {
        self.outputs
    }
}

impl IntoIterator for WorkflowResult {
    type Item = (NodeId, NodeOutput);
    type IntoIter = hash_map::IntoIter<NodeId, NodeOutput>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.outputs.into_iter()
    }
}

/// Awaits `fut`, failing with [`Error::OperationTimedOut`] once `timeout`
/// elapses.
pub(crate) async fn with_timeout<T, F>(
    name: &str,
    timeout: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!("`{name}` did not finish within {timeout:?}");
            Err(Error::OperationTimedOut {
                node: name.to_owned(),
                timeout,
            })
        }
    }
}
