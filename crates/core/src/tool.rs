//! Tool call supports.

mod error;
mod object;
mod registry;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use error::{Error, ErrorKind};
pub use registry::{Registry, ToolHandle};

/// The result of a tool call.
pub type ToolResult = Result<ToolOutput, Error>;

/// What a tool produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    /// A short human-readable summary.
    pub display: String,
    /// The structured result handed back to the model.
    pub payload: Value,
}

impl ToolOutput {
    /// Creates an output with a separate summary and payload.
    #[inline]
    pub fn new<S: Into<String>>(display: S, payload: Value) -> Self {
        Self {
            display: display.into(),
            payload,
        }
    }

    /// Creates an output whose payload is the summary itself.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        let display = text.into();
        let payload = Value::String(display.clone());
        Self { display, payload }
    }

    /// Renders the payload as the content of a tool result message.
    pub fn to_model_content(&self) -> String {
        match &self.payload {
            Value::Null => self.display.clone(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as the working directory or the
/// current user. To do this, make the context an immutable state of the tool,
/// which can be set during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`.
    /// Long-running tools should watch `cancel` and bail out early; the
    /// engine also drops the future once the token fires.
    fn execute(
        &self,
        input: Self::Input,
        cancel: CancellationToken,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_model_content() {
        assert_eq!(ToolOutput::text("done").to_model_content(), "done");
        assert_eq!(
            ToolOutput::new("2 files", json!(["a.txt", "b.txt"]))
                .to_model_content(),
            r#"["a.txt","b.txt"]"#
        );
        assert_eq!(
            ToolOutput::new("nothing", Value::Null).to_model_content(),
            "nothing"
        );
    }
}
