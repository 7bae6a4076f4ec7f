use std::borrow::Cow;

use serde_json::Value;

use crate::ToolCallRequest;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelRequest {
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

impl ModelRequest {
    /// Creates a request with a single user message.
    #[inline]
    pub fn with_prompt<S: Into<String>>(prompt: S) -> Self {
        Self {
            messages: vec![ModelMessage::User(prompt.into())],
            tools: vec![],
        }
    }

    /// Replaces the tool declarations of this request.
    #[inline]
    pub fn with_tools(mut self, tools: Vec<ModelTool>) -> Self {
        self.tools = tools;
        self
    }
}

/// A complete message in the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
    /// An assistant turn that requested tool invocations.
    ///
    /// Most providers need the original calls to be replayed before the
    /// matching [`ModelMessage::Tool`] results, so the engine keeps them
    /// together with the text produced in the same turn.
    AssistantToolCalls {
        /// Text produced alongside the calls, possibly empty.
        text: String,
        /// The requested invocations, in the order they were emitted.
        calls: Vec<ToolCallRequest>,
    },
    /// A tool call result.
    Tool(ToolCallResult),
}

impl ModelMessage {
    /// Returns the textual content of this message.
    pub fn content(&self) -> Cow<'_, str> {
        match self {
            ModelMessage::System(text)
            | ModelMessage::User(text)
            | ModelMessage::Assistant(text) => Cow::Borrowed(text),
            ModelMessage::AssistantToolCalls { text, .. } => {
                Cow::Borrowed(text)
            }
            ModelMessage::Tool(result) => Cow::Borrowed(&result.content),
        }
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The identifier of the tool call request this result answers.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
