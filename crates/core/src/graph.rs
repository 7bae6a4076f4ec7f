//! The dependency graph of a workflow.

mod builder;
mod node;

use std::collections::{HashMap, HashSet};

pub use builder::GraphBuilder;
pub use node::{Node, NodeId, NodeKind, NodeOutput};

use crate::error::{Error, Result};

/// A set of nodes and the dependency edges between them.
///
/// Graphs are assembled with a [`GraphBuilder`] and consumed by
/// [`ParallelExecutor::run`](crate::ParallelExecutor::run). The builder
/// only accepts dependencies on nodes that already exist, so a graph is
/// acyclic by construction.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    // Insertion order, used to dispatch simultaneously ready nodes
    // deterministically.
    order: Vec<NodeId>,
    inference_counter: u64,
    tool_counter: u64,
}

impl Graph {
    /// Returns the number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no node.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if a node with this id exists.
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns the node with this id.
    #[inline]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Returns the node ids in insertion order.
    #[inline]
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// The id the next generated node of `kind` will receive.
    ///
    /// Counter values already taken by an explicit id are skipped.
    pub(crate) fn peek_id(&self, kind: NodeKind) -> NodeId {
        let mut counter = match kind {
            NodeKind::Inference => self.inference_counter,
            NodeKind::ToolInvocation => self.tool_counter,
        };
        loop {
            let id = format!("{}_{}", kind.prefix(), counter);
            if !self.contains(&id) {
                return NodeId::from(id);
            }
            counter += 1;
        }
    }

    fn bump_counter(&mut self, kind: NodeKind) {
        match kind {
            NodeKind::Inference => self.inference_counter += 1,
            NodeKind::ToolInvocation => self.tool_counter += 1,
        }
    }

    /// Checks whether a node `id` depending on `depends_on` may be added.
    pub(crate) fn validate(
        &self,
        id: &NodeId,
        depends_on: &[NodeId],
    ) -> Result<()> {
        if depends_on.contains(id) || self.reaches(depends_on, id) {
            return Err(Error::CycleDetected { node: id.clone() });
        }
        let missing =
            depends_on.iter().find(|dep| !self.contains(dep.as_str()));
        if let Some(missing) = missing {
            return Err(Error::UnknownDependency {
                node: id.clone(),
                dependency: missing.clone(),
            });
        }
        if self.contains(id.as_str()) {
            return Err(Error::DuplicateNode(id.clone()));
        }
        Ok(())
    }

    /// Adds a validated node. `generated` tells whether its id came from
    /// [`peek_id`](Self::peek_id).
    pub(crate) fn insert(&mut self, node: Node, generated: bool) {
        if generated {
            self.bump_counter(node.kind);
        }
        trace!(
            "add node {} ({:?}) after {:?}",
            node.id, node.kind, node.depends_on
        );
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    /// Consumes the graph, yielding nodes in insertion order.
    pub(crate) fn into_nodes(mut self) -> Vec<Node> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.remove(id))
            .collect()
    }

    // Whether `target` is reachable by walking dependency edges from any
    // of `from`.
    fn reaches(&self, from: &[NodeId], target: &NodeId) -> bool {
        let mut stack: Vec<&NodeId> = from.iter().collect();
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.depends_on.iter());
            }
        }
        false
    }
}

/// Removes repeated ids while keeping the first occurrence of each.
pub(crate) fn dedup_ids(ids: &[NodeId]) -> Vec<NodeId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}
