use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use toolgraph_model::{
    ErrorKind as ModelErrorKind, ModelMessage, ToolCallRequest,
};
use toolgraph_test_model::{PresetResponse, TestModelProvider};

use super::*;
use crate::config::ExecutorConfigBuilder;
use crate::graph::GraphBuilder;
use crate::model_client::ModelClient;
use crate::testing;

fn sleep_call(millis: u64) -> ToolCallRequest {
    ToolCallRequest::new("sleep", json!({ "millis": millis }))
}

fn builder_with(provider: TestModelProvider) -> GraphBuilder {
    GraphBuilder::new(ModelClient::new(provider), Arc::new(testing::registry()))
}

fn builder() -> GraphBuilder {
    builder_with(TestModelProvider::default())
}

fn build_fan_out(builder: &mut GraphBuilder) -> Vec<NodeId> {
    let a = builder.add_tool_node(&sleep_call(10), &[]).unwrap();
    let b = builder.add_tool_node(&sleep_call(20), &[]).unwrap();
    let c = builder
        .add_tool_node(&sleep_call(5), &[a.clone(), b.clone()])
        .unwrap();
    vec![a, b, c]
}

#[tokio::test(start_paused = true)]
async fn test_result_covers_every_node() {
    let mut first = builder();
    let ids = build_fan_out(&mut first);
    let executor = ParallelExecutor::default();
    let result = executor.run(first.build()).await.unwrap();

    let keys: HashSet<NodeId> = result.keys().cloned().collect();
    let expected: HashSet<NodeId> = ids.iter().cloned().collect();
    assert_eq!(keys, expected);
    assert_eq!(result.text("tool_1"), Some("slept 20ms"));
    assert_eq!(executor.events().len(), 3);

    // An equivalent graph yields the same ids.
    let mut second = builder();
    build_fan_out(&mut second);
    let again = ParallelExecutor::default().run(second.build()).await.unwrap();
    let again: HashSet<NodeId> = again.keys().cloned().collect();
    assert_eq!(again, keys);
}

#[tokio::test(start_paused = true)]
async fn test_empty_graph() {
    let result = ParallelExecutor::default()
        .run(Graph::default())
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dependants_wait_for_dependencies() {
    let mut builder = builder();
    let ids = build_fan_out(&mut builder);
    let executor = ParallelExecutor::default();
    executor.run(builder.build()).await.unwrap();

    let events = executor.events();
    let a = events.find(ids[0].as_str()).unwrap();
    let b = events.find(ids[1].as_str()).unwrap();
    let c = events.find(ids[2].as_str()).unwrap();
    assert!(c.start >= a.end);
    assert!(c.start >= b.end);
    assert!(a.overlaps(&b));
}

#[tokio::test(start_paused = true)]
async fn test_independent_nodes_overlap() {
    let mut builder = builder();
    builder.add_tool_node(&sleep_call(50), &[]).unwrap();
    builder.add_tool_node(&sleep_call(50), &[]).unwrap();

    let executor = ParallelExecutor::default();
    let started = Instant::now();
    executor.run(builder.build()).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(90));

    let events = executor.events().sorted();
    assert_eq!(events.len(), 2);
    assert!(events[0].overlaps(&events[1]));
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_ceiling() {
    let mut builder = builder();
    builder.add_tool_node(&sleep_call(50), &[]).unwrap();
    builder.add_tool_node(&sleep_call(50), &[]).unwrap();

    let config = ExecutorConfigBuilder::new().with_max_concurrency(1).build();
    let executor = ParallelExecutor::new(config);
    let started = Instant::now();
    executor.run(builder.build()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));

    let events = executor.events().sorted();
    assert!(!events[0].overlaps(&events[1]));
    // Simultaneously ready nodes go in insertion order.
    assert_eq!(events[0].name, "tool_0");
}

#[tokio::test(start_paused = true)]
async fn test_outputs_flow_into_dependants() {
    let mut provider = TestModelProvider::default();
    provider.add_user_turn();
    provider.add_user_turn();
    provider.add_assistant_turn(PresetResponse::text("summarized"));

    let mut builder = builder_with(provider.clone());
    let tool = builder
        .add_tool_node(&sleep_call(5).with_id("s"), &[])
        .unwrap();
    let summary = builder.add_inference_node("summarize", &[tool]).unwrap();

    let result = ParallelExecutor::default()
        .run(builder.build())
        .await
        .unwrap();
    assert_eq!(result.text(summary.as_str()), Some("summarized"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    match &requests[0].messages[1] {
        ModelMessage::Tool(result) => {
            assert_eq!(result.id, "s");
            assert_eq!(result.content, r#"{"slept_ms":5}"#);
        }
        other => panic!("unexpected message: {other:?}"),
    }
    assert_eq!(requests[0].tools.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_first_failure_aborts_the_run() {
    let mut builder = builder();
    let fail = ToolCallRequest::new("fail", json!({ "millis": 5 }));
    let failing = builder.add_tool_node(&fail, &[]).unwrap();
    builder.add_tool_node(&sleep_call(1_000), &[]).unwrap();
    let after = builder.add_tool_node(&sleep_call(1), &[failing]).unwrap();

    let executor = ParallelExecutor::default();
    let started = Instant::now();
    let err = executor.run(builder.build()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ToolExecutionFailed { ref node, .. } if node == "tool_0"
    ));
    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert!(executor.events().find(after.as_str()).is_none());
    assert!(executor.events().find("tool_0").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_inference_failure() {
    // The provider has no script, so every request fails.
    let mut builder = builder();
    builder.add_inference_node("hi", &[]).unwrap();

    let err = ParallelExecutor::default()
        .run(builder.build())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InferenceFailed { ref node, kind: ModelErrorKind::Other, .. }
            if node == "inference_0"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_operation_timeout() {
    let mut builder = builder();
    builder.add_tool_node(&sleep_call(50), &[]).unwrap();

    let config = ExecutorConfigBuilder::new()
        .with_operation_timeout(Duration::from_millis(10))
        .build();
    let executor = ParallelExecutor::new(config);
    let err = executor.run(builder.build()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::OperationTimedOut { ref node, timeout }
            if node == "tool_0" && timeout == Duration::from_millis(10)
    ));

    // The timed out attempt is still on record.
    let event = executor.events().find("tool_0").unwrap();
    assert_eq!(event.duration(), Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run() {
    let mut builder = builder();
    builder.add_tool_node(&sleep_call(50), &[]).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = ParallelExecutor::default()
        .run_with_cancel(builder.build(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { ref node } if node == "tool_0"));
}
