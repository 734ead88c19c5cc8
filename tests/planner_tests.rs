//! Plan generation through the dispatcher

mod common;

use agentloom::llm::adapters::{FakeResponse, FakeTransport};
use agentloom::llm::planner::PLANNING_SYSTEM_PROMPT;
use agentloom::llm::{PlanError, PlanningEngine};
use agentloom_core::{PlanStatus, TaskStatus};
use common::{answer, context, tool, PLAN_RESPONSE};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_plan_request_has_no_tools() {
    let fake = FakeTransport::with_stream(PLAN_RESPONSE);
    let engine = PlanningEngine::new(context(&fake).with_tools(vec![tool("search")]));

    engine
        .generate_plan("Compare tokio and smol", &CancellationToken::new())
        .await
        .unwrap();

    let body = fake.requests()[0].json();
    assert!(body.get("tools").is_none());
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], PLANNING_SYSTEM_PROMPT);
    assert_eq!(body["messages"][1]["content"], "Compare tokio and smol");
    assert!(!engine.is_planning());
}

#[tokio::test]
async fn test_fenced_plan_is_parsed() {
    let fake = FakeTransport::with_stream(PLAN_RESPONSE);
    let engine = PlanningEngine::new(context(&fake));

    let plan = engine
        .generate_plan("Compare tokio and smol", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(plan.title, "Compare runtimes");
    assert_eq!(plan.status, PlanStatus::Pending);
    let names: Vec<Vec<&str>> = plan
        .parallel_groups
        .iter()
        .map(|g| g.iter().map(|t| t.name.as_str()).collect())
        .collect();
    assert_eq!(names, vec![vec!["Tokio", "Smol"], vec!["Compare"]]);
    assert!(plan.tasks().all(|t| t.status == TaskStatus::Pending));
    assert_eq!(plan.find_task(&plan.parallel_groups[1][0].id).unwrap().description, "Compare the two summaries");
}

#[tokio::test]
async fn test_prose_output_is_a_parse_error() {
    let fake = FakeTransport::scripted(vec![answer("I would start by reading the docs.")]);
    let engine = PlanningEngine::new(context(&fake));

    let err = engine
        .generate_plan("Compare tokio and smol", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PlanError::JsonParse { .. }));
    let message = err.to_string();
    assert!(message.starts_with("Failed to parse plan JSON"));
    assert!(message.contains("Raw: I would start by reading the docs."));
}

#[tokio::test]
async fn test_missing_groups() {
    let fake = FakeTransport::scripted(vec![answer(r#"{"title":"Nothing to do"}"#)]);
    let engine = PlanningEngine::new(context(&fake));

    let err = engine
        .generate_plan("noop", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::MissingGroups { .. }));
}

#[tokio::test]
async fn test_endpoint_failure_is_generation_error() {
    let fake = FakeTransport::scripted(vec![FakeResponse::status(500, "out of memory")]);
    let engine = PlanningEngine::new(context(&fake));

    let err = engine
        .generate_plan("anything", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::Generation(ref m) if m.contains("out of memory")));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let fake = FakeTransport::with_stream(PLAN_RESPONSE);
    let engine = PlanningEngine::new(context(&fake));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine.generate_plan("anything", &cancel).await.unwrap_err();
    assert_eq!(err, PlanError::Cancelled);
    assert_eq!(fake.request_count(), 0);
}
