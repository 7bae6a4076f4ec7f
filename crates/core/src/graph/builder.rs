use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use toolgraph_model::{ModelMessage, ModelRequest, ModelTool, ToolCallRequest};

use super::node::{
    BoxFuture, InferenceFn, Node, NodeId, NodeKind, Task, ToolFn,
};
use super::{Graph, dedup_ids};
use crate::error::{Error, Result};
use crate::model_client::ModelClient;
use crate::tool::Registry;

/// Incrementally assembles a [`Graph`].
///
/// Every `add_*` method validates the new node against the nodes added so
/// far and returns its id, which later nodes use to declare dependencies.
/// A failed call leaves the graph untouched.
pub struct GraphBuilder {
    graph: Graph,
    model_client: ModelClient,
    registry: Arc<Registry>,
    tool_declarations: Vec<ModelTool>,
}

impl GraphBuilder {
    /// Creates a builder whose inference nodes see every tool in
    /// `registry`.
    pub fn new(model_client: ModelClient, registry: Arc<Registry>) -> Self {
        let tool_declarations = registry.definitions();
        Self {
            graph: Graph::default(),
            model_client,
            registry,
            tool_declarations,
        }
    }

    /// Overrides the tool declarations attached to inference requests.
    #[inline]
    pub fn with_tool_declarations(
        mut self,
        declarations: Vec<ModelTool>,
    ) -> Self {
        self.tool_declarations = declarations;
        self
    }

    /// Adds an inference node that sends `prompt` as a user message.
    ///
    /// Outputs of the dependencies are appended after the prompt: tool
    /// outputs as tool result messages, inference outputs as assistant
    /// messages.
    pub fn add_inference_node<S: Into<String>>(
        &mut self,
        prompt: S,
        depends_on: &[NodeId],
    ) -> Result<NodeId> {
        let prompt = prompt.into();
        self.push_inference(
            prompt.clone(),
            vec![ModelMessage::User(prompt)],
            depends_on,
        )
    }

    /// Adds an inference node seeded with a whole conversation.
    pub fn add_inference_node_with_messages(
        &mut self,
        messages: Vec<ModelMessage>,
        depends_on: &[NodeId],
    ) -> Result<NodeId> {
        let context = messages
            .iter()
            .rev()
            .find(|msg| matches!(msg, ModelMessage::User(_)))
            .map(|msg| msg.content().into_owned())
            .unwrap_or_default();
        self.push_inference(context, messages, depends_on)
    }

    /// Adds a node invoking the tool named in `request`.
    ///
    /// The tool is resolved now, so an unknown tool fails with
    /// [`Error::ToolNotFound`] before the graph runs. The id is
    /// `tool_<call id>` when the request carries one.
    pub fn add_tool_node(
        &mut self,
        request: &ToolCallRequest,
        depends_on: &[NodeId],
    ) -> Result<NodeId> {
        let (id, generated) = match &request.id {
            Some(call_id) => (NodeId::from(format!("tool_{call_id}")), false),
            None => (self.graph.peek_id(NodeKind::ToolInvocation), true),
        };
        let depends_on = dedup_ids(depends_on);
        self.graph.validate(&id, &depends_on)?;

        let tool = self
            .registry
            .lookup(&request.name)
            .ok_or_else(|| Error::ToolNotFound(request.name.clone()))?;

        let call_id = request.id.clone().unwrap_or_else(|| id.to_string());
        let arguments = request.arguments.clone();
        let work: ToolFn =
            Box::new(move |cancel| tool.execute(arguments, cancel));

        self.graph.insert(
            Node {
                id: id.clone(),
                kind: NodeKind::ToolInvocation,
                depends_on,
                context: format!("{} {}", request.name, request.arguments),
                task: Task::ToolInvocation { call_id, work },
            },
            generated,
        );
        Ok(id)
    }

    /// The graph assembled so far.
    #[inline]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Finishes building.
    #[inline]
    pub fn build(self) -> Graph {
        self.graph
    }

    fn push_inference(
        &mut self,
        context: String,
        messages: Vec<ModelMessage>,
        depends_on: &[NodeId],
    ) -> Result<NodeId> {
        let id = self.graph.peek_id(NodeKind::Inference);
        let depends_on = dedup_ids(depends_on);
        self.graph.validate(&id, &depends_on)?;

        let model_client = self.model_client.clone();
        let tools = self.tool_declarations.clone();
        let work: InferenceFn = Box::new(
            move |upstream: Vec<ModelMessage>, cancel: CancellationToken| {
                let mut messages = messages;
                messages.extend(upstream);
                let req = ModelRequest { messages, tools };
                let fut: BoxFuture<_> = Box::pin(async move {
                    model_client.send_request(req, &cancel).await
                });
                fut
            },
        );

        self.graph.insert(
            Node {
                id: id.clone(),
                kind: NodeKind::Inference,
                depends_on,
                context,
                task: Task::Inference(work),
            },
            true,
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toolgraph_test_model::TestModelProvider;

    use super::*;
    use crate::testing;

    fn builder() -> GraphBuilder {
        GraphBuilder::new(
            ModelClient::new(TestModelProvider::default()),
            Arc::new(testing::registry()),
        )
    }

    fn dummy(id: Option<&str>) -> ToolCallRequest {
        let req = ToolCallRequest::new("dummy", json!({}));
        match id {
            Some(id) => req.with_id(id),
            None => req,
        }
    }

    #[test]
    fn test_ids_are_deterministic() {
        let mut builder = builder();
        let a = builder.add_inference_node("a", &[]).unwrap();
        let b = builder.add_inference_node("b", &[a.clone()]).unwrap();
        let t0 = builder.add_tool_node(&dummy(None), &[b.clone()]).unwrap();
        let t1 = builder.add_tool_node(&dummy(Some("call_9")), &[]).unwrap();
        let t2 = builder.add_tool_node(&dummy(None), &[]).unwrap();

        assert_eq!(a, "inference_0");
        assert_eq!(b, "inference_1");
        assert_eq!(t0, "tool_0");
        assert_eq!(t1, "tool_call_9");
        assert_eq!(t2, "tool_1");

        let graph = builder.build();
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.node_ids(), [a, b.clone(), t0.clone(), t1, t2]);
        assert_eq!(graph.node(t0.as_str()).unwrap().depends_on(), [b]);
        assert_eq!(
            graph.node(t0.as_str()).unwrap().context(),
            "dummy {}"
        );
    }

    #[test]
    fn test_generated_ids_skip_explicit_ones() {
        let mut builder = builder();
        let explicit = builder.add_tool_node(&dummy(Some("1")), &[]).unwrap();
        let t0 = builder.add_tool_node(&dummy(None), &[]).unwrap();
        let t2 = builder.add_tool_node(&dummy(None), &[]).unwrap();

        assert_eq!(explicit, "tool_1");
        assert_eq!(t0, "tool_0");
        assert_eq!(t2, "tool_2");
        assert_eq!(builder.graph().len(), 3);
    }

    #[test]
    fn test_unknown_dependency() {
        let mut builder = builder();
        let err = builder
            .add_inference_node("a", &[NodeId::from("inference_7")])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownDependency { ref dependency, .. }
                if dependency == "inference_7"
        ));
        assert!(builder.graph().is_empty());

        // The failed call did not consume an id.
        let id = builder.add_inference_node("a", &[]).unwrap();
        assert_eq!(id, "inference_0");
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut builder = builder();
        let err = builder
            .add_tool_node(&dummy(Some("x")), &[NodeId::from("tool_x")])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CycleDetected { ref node } if node == "tool_x"
        ));
        assert!(!builder.graph().contains("tool_x"));

        // Re-adding an existing id behind one of its own dependants would
        // close a loop as well.
        let x = builder.add_tool_node(&dummy(Some("x")), &[]).unwrap();
        let y = builder.add_inference_node("y", &[x.clone()]).unwrap();
        let err = builder.add_tool_node(&dummy(Some("x")), &[y]).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        assert_eq!(builder.graph().len(), 2);
    }

    #[test]
    fn test_duplicate_and_missing_tool() {
        let mut builder = builder();
        builder.add_tool_node(&dummy(Some("1")), &[]).unwrap();
        let err = builder.add_tool_node(&dummy(Some("1")), &[]).unwrap_err();
        assert!(matches!(err, Error::DuplicateNode(ref id) if id == "tool_1"));

        let err = builder
            .add_tool_node(&ToolCallRequest::new("missing", json!({})), &[])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ToolNotFound(ref name) if name == "missing"
        ));
        assert!(err.is_build_error());
        assert_eq!(builder.graph().len(), 1);
    }

    #[test]
    fn test_repeated_dependencies_are_merged() {
        let mut builder = builder();
        let a = builder.add_inference_node("a", &[]).unwrap();
        let b = builder
            .add_inference_node("b", &[a.clone(), a.clone()])
            .unwrap();
        assert_eq!(builder.graph().node(b.as_str()).unwrap().depends_on(), [a]);
    }
}
