use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use toolgraph_model::ModelTool;

use super::object::{ToolObject, ToolObjectImpl};
use super::{Tool, ToolResult};

/// The set of tools a workflow may invoke, keyed by name.
#[derive(Clone, Default)]
pub struct Registry {
    tools: BTreeMap<String, Arc<dyn ToolObject>>,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any previous tool with the same name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        if self
            .tools
            .insert(name.clone(), Arc::new(ToolObjectImpl(tool)))
            .is_some()
        {
            warn!("tool `{name}` has been replaced");
        }
    }

    /// Registers a tool, builder style.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.add_tool(tool);
        self
    }

    /// Looks a tool up by name.
    #[inline]
    pub fn lookup(&self, name: &str) -> Option<ToolHandle> {
        self.tools.get(name).map(|tool| ToolHandle {
            tool: Arc::clone(tool),
        })
    }

    /// Returns the declarations that are sent to the model.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect()
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tools.keys()).finish()
    }
}

/// A resolved tool, ready to be invoked.
#[derive(Clone)]
pub struct ToolHandle {
    tool: Arc<dyn ToolObject>,
}

impl ToolHandle {
    /// Returns the name of the tool.
    #[inline]
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    /// Invokes the tool.
    ///
    /// The returned future owns everything it needs, and resolves to a
    /// [`Cancelled`](super::ErrorKind::Cancelled) error once `cancel` fires.
    #[inline]
    pub fn execute(
        &self,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        Arc::clone(&self.tool).execute(arguments, cancel)
    }
}

impl Debug for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandle")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
