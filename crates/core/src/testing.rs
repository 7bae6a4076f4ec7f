//! Tools shared by the unit tests.

use std::future::ready;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::tool::{Error, Registry, Tool, ToolOutput, ToolResult};

static EMPTY_SCHEMA: &Value = &Value::Null;

/// Always answers `done`.
pub(crate) struct DummyTool;

impl Tool for DummyTool {
    type Input = Value;

    fn name(&self) -> &str {
        "dummy"
    }

    fn description(&self) -> &str {
        "Does nothing"
    }

    fn parameter_schema(&self) -> &Value {
        EMPTY_SCHEMA
    }

    fn execute(
        &self,
        _input: Self::Input,
        _cancel: CancellationToken,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Ok(ToolOutput::text("done")))
    }
}

#[derive(Deserialize)]
pub(crate) struct SleepInput {
    #[serde(default)]
    millis: u64,
}

/// Sleeps for `millis` milliseconds.
pub(crate) struct SleepTool;

impl Tool for SleepTool {
    type Input = SleepInput;

    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleeps for a while"
    }

    fn parameter_schema(&self) -> &Value {
        EMPTY_SCHEMA
    }

    fn execute(
        &self,
        input: Self::Input,
        _cancel: CancellationToken,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            tokio::time::sleep(Duration::from_millis(input.millis)).await;
            Ok(ToolOutput::new(
                format!("slept {}ms", input.millis),
                json!({ "slept_ms": input.millis }),
            ))
        }
    }
}

/// Fails after `millis` milliseconds.
pub(crate) struct FailTool;

impl Tool for FailTool {
    type Input = SleepInput;

    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameter_schema(&self) -> &Value {
        EMPTY_SCHEMA
    }

    fn execute(
        &self,
        input: Self::Input,
        _cancel: CancellationToken,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            tokio::time::sleep(Duration::from_millis(input.millis)).await;
            Err(Error::execution_error().with_reason("disk on fire"))
        }
    }
}

pub(crate) fn registry() -> Registry {
    Registry::new()
        .with_tool(DummyTool)
        .with_tool(SleepTool)
        .with_tool(FailTool)
}
