use std::time::Duration;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::select;
use tokio::time::sleep;
use toolgraph_core::CancellationToken;
use toolgraph_core::tool::{Error as ToolError, Tool, ToolOutput, ToolResult};

#[derive(Deserialize, JsonSchema)]
pub struct WaitToolParameters {
    #[schemars(description = "How long to wait, in milliseconds.")]
    millis: u64,
    #[schemars(description = "An optional label echoed back in the result.")]
    #[serde(default)]
    label: Option<String>,
}

/// A tool that does nothing but wait, standing in for slow I/O.
pub struct WaitTool {
    parameter_schema: Value,
}

impl WaitTool {
    /// Creates a new wait tool.
    #[inline]
    pub fn new() -> Self {
        WaitTool {
            parameter_schema: schema_for!(WaitToolParameters).to_value(),
        }
    }
}

impl Default for WaitTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WaitTool {
    type Input = WaitToolParameters;

    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Waits for the given number of milliseconds, then reports back."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: WaitToolParameters,
        cancel: CancellationToken,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            let label = input.label.unwrap_or_else(|| "wait".to_owned());
            select! {
                _ = cancel.cancelled() => {
                    Err(ToolError::cancelled()
                        .with_reason(format!("`{label}` was interrupted")))
                }
                _ = sleep(Duration::from_millis(input.millis)) => {
                    Ok(ToolOutput::new(
                        format!("{label}: waited {}ms", input.millis),
                        json!({ "label": label, "waited_ms": input.millis }),
                    ))
                }
            }
        }
    }
}
