//! The scripted scenario run by the `toolgraph` binary.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde_json::json;
use toolgraph_core::{ExecutorConfig, ExecutorConfigBuilder};
use toolgraph_model::ToolCallRequest;
use toolgraph_test_model::{PresetEvent, PresetResponse, TestModelProvider};

const DEFAULT_TOOL_COUNT: usize = 3;
const DEFAULT_TOOL_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MODEL_DELAY: Duration = Duration::from_millis(10);

/// Knobs of the demo scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoConfig {
    /// How many `wait` calls the model requests.
    pub tool_count: usize,
    /// How long each `wait` call takes.
    pub tool_delay: Duration,
    /// The delay before each event the model streams.
    pub model_delay: Duration,
    /// The dispatch ceiling of the parallel run.
    pub max_concurrency: Option<usize>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            tool_count: DEFAULT_TOOL_COUNT,
            tool_delay: DEFAULT_TOOL_DELAY,
            model_delay: DEFAULT_MODEL_DELAY,
            max_concurrency: None,
        }
    }
}

impl DemoConfig {
    /// Reads `TOOLGRAPH_TOOL_COUNT`, `TOOLGRAPH_TOOL_DELAY_MS`,
    /// `TOOLGRAPH_MODEL_DELAY_MS` and `TOOLGRAPH_MAX_CONCURRENCY`, keeping
    /// the default for anything unset or malformed.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str| {
            parse_var::<u64>(&lookup, key).map(Duration::from_millis)
        };
        Self {
            tool_count: parse_var(&lookup, "TOOLGRAPH_TOOL_COUNT")
                .unwrap_or(defaults.tool_count),
            tool_delay: millis("TOOLGRAPH_TOOL_DELAY_MS")
                .unwrap_or(defaults.tool_delay),
            model_delay: millis("TOOLGRAPH_MODEL_DELAY_MS")
                .unwrap_or(defaults.model_delay),
            max_concurrency: parse_var(&lookup, "TOOLGRAPH_MAX_CONCURRENCY"),
        }
    }

    /// The executor limits for both runs.
    pub fn executor_config(&self) -> ExecutorConfig {
        let mut builder = ExecutorConfigBuilder::new();
        if let Some(limit) = self.max_concurrency {
            builder = builder.with_max_concurrency(limit);
        }
        builder.build()
    }

    /// The prompt sent to the model.
    pub fn prompt(&self) -> String {
        format!(
            "Run {} independent tasks of {}ms each, then tell me when \
             they are done.",
            self.tool_count,
            self.tool_delay.as_millis()
        )
    }

    /// A model that asks for every task in its first turn and sums up once
    /// the results are back.
    ///
    /// The script only depends on the conversation length, so the same
    /// provider serves the parallel and the sequential run.
    pub fn scripted_provider(&self) -> TestModelProvider {
        let mut provider = TestModelProvider::default();
        provider.set_delay(self.model_delay);
        provider.add_user_turn();

        if self.tool_count == 0 {
            provider.add_assistant_turn(PresetResponse::text(
                "There is nothing to run.",
            ));
            return provider;
        }

        let mut events = vec![PresetEvent::MessageDelta(format!(
            "Starting {} tasks.",
            self.tool_count
        ))];
        events.extend((0..self.tool_count).map(|idx| {
            PresetEvent::ToolCall(
                ToolCallRequest::new(
                    "wait",
                    json!({
                        "millis": self.tool_delay.as_millis() as u64,
                        "label": format!("task {idx}"),
                    }),
                )
                .with_id(format!("wait_{idx}")),
            )
        }));
        provider.add_assistant_turn(PresetResponse::with_events(events));
        provider.add_tool_result_turns(self.tool_count);
        provider.add_assistant_turn(PresetResponse::text(format!(
            "All {} tasks are done.",
            self.tool_count
        )));
        provider
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring malformed {key}={raw:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use toolgraph_core::WorkflowBuilder;

    use super::*;
    use crate::tools::WaitTool;

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TOOLGRAPH_TOOL_COUNT", "5"),
            ("TOOLGRAPH_TOOL_DELAY_MS", "nope"),
            ("TOOLGRAPH_MAX_CONCURRENCY", " 2 "),
        ]
        .into_iter()
        .collect();
        let config =
            DemoConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.tool_count, 5);
        assert_eq!(config.tool_delay, DEFAULT_TOOL_DELAY);
        assert_eq!(config.model_delay, DEFAULT_MODEL_DELAY);
        assert_eq!(config.max_concurrency, Some(2));
        assert_eq!(config.executor_config().max_concurrency(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario() {
        let config = DemoConfig {
            tool_count: 4,
            tool_delay: Duration::from_millis(100),
            model_delay: Duration::from_millis(1),
            max_concurrency: None,
        };
        let workflow =
            WorkflowBuilder::with_model_provider(config.scripted_provider())
                .with_tool(WaitTool::new())
                .with_config(config.executor_config())
                .build();

        let text = workflow
            .run_prompt_with_tools(config.prompt())
            .await
            .unwrap();
        assert_eq!(text, "All 4 tasks are done.");
        let parallel = workflow.events().timeline();
        assert_eq!(parallel.entries().len(), 6);

        workflow.events().clear();
        let text = workflow
            .sequential_executor()
            .run(config.prompt())
            .await
            .unwrap();
        assert_eq!(text, "All 4 tasks are done.");
        let sequential = workflow.events().timeline();
        assert!(
            sequential.total() >= parallel.total() + Duration::from_millis(250)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tasks() {
        let config = DemoConfig {
            tool_count: 0,
            ..DemoConfig::default()
        };
        let workflow =
            WorkflowBuilder::with_model_provider(config.scripted_provider())
                .with_tool(WaitTool::new())
                .build();
        let text = workflow
            .run_prompt_with_tools(config.prompt())
            .await
            .unwrap();
        assert_eq!(text, "There is nothing to run.");
    }
}
