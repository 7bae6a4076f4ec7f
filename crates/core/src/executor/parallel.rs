use std::collections::{BTreeSet, HashMap};
use std::panic;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{WorkflowResult, with_timeout};
use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::event::EventLog;
use crate::graph::{Graph, Node, NodeId, NodeOutput};

/// Runs a [`Graph`], starting every node as soon as all of its
/// dependencies have completed.
///
/// Nodes that become ready at the same time are dispatched in the order
/// they were added to the graph. The first failing node aborts the run:
/// running siblings are cancelled, nodes that never became ready are never
/// started, and the outputs collected so far are dropped.
#[derive(Clone, Debug, Default)]
pub struct ParallelExecutor {
    config: ExecutorConfig,
    events: EventLog,
}

impl ParallelExecutor {
    /// Creates an executor recording into a fresh event log.
    #[inline]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
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

    /// The log every dispatched node is recorded into.
    #[inline]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// The limits this executor applies.
    #[inline]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs every node of `graph`.
    #[inline]
    pub async fn run(&self, graph: Graph) -> Result<WorkflowResult> {
        self.run_with_cancel(graph, &CancellationToken::new()).await
    }

    /// Runs every node of `graph`, stopping early once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        graph: Graph,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult> {
        let mut schedule = Schedule::new(graph.into_nodes());
        let total = schedule.ids.len();
        debug!("running a graph of {total} nodes");

        // Cancelling the child token stops the siblings of a failed node
        // without touching the caller's token.
        let run_cancel = cancel.child_token();
        let limit = self.config.max_concurrency.unwrap_or(usize::MAX);
        let mut running = JoinSet::new();
        let mut outputs: HashMap<NodeId, NodeOutput> =
            HashMap::with_capacity(total);

        loop {
            while running.len() < limit {
                let Some(idx) = schedule.ready.pop_first() else {
                    break;
                };
                let Some(node) = schedule.nodes[idx].take() else {
                    continue;
                };
                self.dispatch(&mut running, idx, node, &outputs, &run_cancel);
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (idx, result) = match joined {
                Ok(finished) => finished,
                Err(err) => {
                    run_cancel.cancel();
                    running.abort_all();
                    match err.try_into_panic() {
                        Ok(payload) => panic::resume_unwind(payload),
                        Err(err) => {
                            error!("a node task stopped unexpectedly: {err}");
                            return Err(Error::Cancelled {
                                node: "graph".to_owned(),
                            });
                        }
                    }
                }
            };

            match result {
                Ok(output) => {
                    trace!("node {} completed", schedule.ids[idx]);
                    schedule.complete(idx);
                    outputs.insert(schedule.ids[idx].clone(), output);
                }
                Err(err) => {
                    error!("node {} failed: {err}", schedule.ids[idx]);
                    run_cancel.cancel();
                    running.abort_all();
                    return Err(err);
                }
            }
        }

        if outputs.len() < total {
            // The builder rules cycles out, so this only guards against a
            // corrupted graph.
            let stuck = schedule
                .ids
                .iter()
                .find(|id| !outputs.contains_key(id.as_str()))
                .cloned()
                .unwrap_or_else(|| NodeId::from("graph"));
            return Err(Error::CycleDetected { node: stuck });
        }

        debug!("graph completed");
        Ok(WorkflowResult { outputs })
    }

    fn dispatch(
        &self,
        running: &mut JoinSet<(usize, Result<NodeOutput>)>,
        idx: usize,
        node: Node,
        outputs: &HashMap<NodeId, NodeOutput>,
        cancel: &CancellationToken,
    ) {
        let Node {
            id,
            kind,
            depends_on,
            context,
            task,
        } = node;
        let inputs = depends_on
            .iter()
            .filter_map(|dep| outputs.get(dep.as_str()).cloned())
            .collect();

        debug!("dispatching node {id}");
        let span = debug_span!("node", id = %id);
        let events = self.events.clone();
        let timeout = self.config.operation_timeout;
        let cancel = cancel.clone();
        running.spawn(
            async move {
                let work = task.run(&id, inputs, cancel);
                let result = events
                    .span(
                        kind.event_kind(),
                        id.as_str(),
                        context,
                        with_timeout(id.as_str(), timeout, work),
                    )
                    .await;
                (idx, result)
            }
            .instrument(span),
        );
    }
}

// Kahn's bookkeeping over the nodes in insertion order.
struct Schedule {
    ids: Vec<NodeId>,
    nodes: Vec<Option<Node>>,
    in_degree: Vec<usize>,
    dependants: Vec<Vec<usize>>,
    ready: BTreeSet<usize>,
}

impl Schedule {
    fn new(nodes: Vec<Node>) -> Self {
        let ids: Vec<NodeId> =
            nodes.iter().map(|node| node.id.clone()).collect();
        let index: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        let mut in_degree = vec![0; nodes.len()];
        let mut dependants = vec![Vec::new(); nodes.len()];
        for (idx, node) in nodes.iter().enumerate() {
            for dep in &node.depends_on {
                if let Some(&dep_idx) = index.get(dep.as_str()) {
                    in_degree[idx] += 1;
                    dependants[dep_idx].push(idx);
                }
            }
        }
        let ready = (0..nodes.len())
            .filter(|&idx| in_degree[idx] == 0)
            .collect();

        Self {
            nodes: nodes.into_iter().map(Some).collect(),
            ids,
            in_degree,
            dependants,
            ready,
        }
    }

    fn complete(&mut self, idx: usize) {
        for &dependant in &self.dependants[idx] {
            self.in_degree[dependant] -= 1;
            if self.in_degree[dependant] == 0 {
                self.ready.insert(dependant);
            }
        }
    }
}

#[cfg(test)]
mod tests;
