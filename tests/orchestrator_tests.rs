//! Plan execution: group barriers, failure isolation, cancellation

mod common;

use std::sync::Arc;
use std::time::Duration;

use agentloom::llm::adapters::{FakeResponse, FakeTransport};
use agentloom::llm::orchestrator::ALREADY_RUNNING;
use agentloom::llm::{ApprovalGate, EngineContext, OrchestrationEngine, OrchestrationEvent};
use agentloom_core::{AgentPlan, AgentTask, Message, PlanStatus, Settings, TaskStatus};
use common::{answer, context, last_user_text, settings};
use tokio::sync::mpsc;

const SLOW: Duration = Duration::from_millis(40);

fn plan() -> AgentPlan {
    AgentPlan::new(
        "Research",
        vec![
            vec![AgentTask::new("A", "do A"), AgentTask::new("B", "do B")],
            vec![AgentTask::new("C", "do C")],
        ],
    )
}

fn partial() -> FakeResponse {
    FakeResponse::ndjson(r#"{"message":{"role":"assistant","content":"working"},"done":false}"#).hanging()
}

/// Endpoint answering `result <task>` for `do <task>`
fn responder() -> FakeTransport {
    FakeTransport::new(|request| match last_user_text(request).as_str() {
        "do A" | "do B" => answer(&format!("result {}", &last_user_text(request)[3..])).with_delay(SLOW),
        other => answer(&format!("result {}", &other[3..])),
    })
}

fn engine(context: EngineContext) -> (Arc<ApprovalGate>, OrchestrationEngine, mpsc::UnboundedReceiver<OrchestrationEvent>) {
    let gate = Arc::new(ApprovalGate::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = OrchestrationEngine::new(context, gate.clone()).with_progress(tx);
    (gate, engine, rx)
}

/// Register and approve `plan` so progress patches land on it
fn approve(gate: &ApprovalGate, plan: &AgentPlan) {
    drop(gate.wait_for_approval(plan.clone()));
    assert!(gate.approve_plan());
}

fn drain(rx: &mut mpsc::UnboundedReceiver<OrchestrationEvent>) -> Vec<OrchestrationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn position(events: &[OrchestrationEvent], wanted: impl Fn(&OrchestrationEvent) -> bool) -> usize {
    events.iter().position(wanted).expect("event not found")
}

fn started(id: &str) -> impl Fn(&OrchestrationEvent) -> bool + '_ {
    move |e| matches!(e, OrchestrationEvent::TaskStarted { task_id } if task_id == id)
}

fn finished(id: &str) -> impl Fn(&OrchestrationEvent) -> bool + '_ {
    move |e| matches!(e, OrchestrationEvent::TaskFinished { task_id, .. } if task_id == id)
}

#[tokio::test]
async fn test_groups_are_barriers() {
    let fake = responder();
    let (gate, engine, mut rx) = engine(context(&fake));
    let plan = plan();
    approve(&gate, &plan);
    let (a, b, c) = (
        plan.parallel_groups[0][0].id.clone(),
        plan.parallel_groups[0][1].id.clone(),
        plan.parallel_groups[1][0].id.clone(),
    );

    let result = engine.execute(&plan, &[Message::user("background")]).await;

    assert_eq!(result.error, None);
    let names: Vec<&str> = result.task_results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert_eq!(result.summary, "**A**\nresult A\n\n---\n\n**B**\nresult B\n\n---\n\n**C**\nresult C");

    let events = drain(&mut rx);
    let first_finish = position(&events, |e| matches!(e, OrchestrationEvent::TaskFinished { .. }));
    assert!(position(&events, started(&a)) < first_finish);
    assert!(position(&events, started(&b)) < first_finish);
    let c_start = position(&events, started(&c));
    assert!(position(&events, finished(&a)) < c_start);
    assert!(position(&events, finished(&b)) < c_start);

    // Every task saw the shared context before its own description
    for request in fake.requests() {
        let messages = request.json()["messages"].as_array().unwrap().clone();
        let contents: Vec<&str> = messages.iter().filter_map(|m| m["content"].as_str()).collect();
        assert!(contents.contains(&"background"));
    }

    let tracked = gate.current_plan().unwrap();
    assert_eq!(tracked.status, PlanStatus::Completed);
    assert!(tracked.tasks().all(|t| t.status == TaskStatus::Success));
    assert_eq!(tracked.find_task(&c).unwrap().result, "result C");
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_failed_task_does_not_affect_siblings() {
    let fake = FakeTransport::new(|request| match last_user_text(request).as_str() {
        "do B" => FakeResponse::status(500, "model crashed"),
        other => answer(&format!("result {}", &other[3..])),
    });
    let (gate, engine, _rx) = engine(context(&fake));
    let plan = plan();
    approve(&gate, &plan);

    let result = engine.execute(&plan, &[]).await;

    assert_eq!(result.error, None);
    let names: Vec<&str> = result.task_results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["A", "C"]);
    assert!(!result.summary.contains("**B**"));

    let tracked = gate.current_plan().unwrap();
    let b = tracked.find_task(&plan.parallel_groups[0][1].id).unwrap();
    assert_eq!(b.status, TaskStatus::Error);
    assert!(b.error.as_deref().unwrap().contains("model crashed"));
    let a = tracked.find_task(&plan.parallel_groups[0][0].id).unwrap();
    assert_eq!(a.status, TaskStatus::Success);
}

#[tokio::test]
async fn test_stop_mid_group_skips_the_rest() {
    let fake = FakeTransport::new(|request| match last_user_text(request).as_str() {
        "do A" => answer("result A"),
        "do B" => partial(),
        _ => answer("result C"),
    });
    let (gate, engine, mut rx) = engine(context(&fake));
    let engine = Arc::new(engine);
    let plan = plan();
    approve(&gate, &plan);
    let a = plan.parallel_groups[0][0].id.clone();

    let run = tokio::spawn({
        let engine = engine.clone();
        let plan = plan.clone();
        async move { engine.execute(&plan, &[]).await }
    });

    while let Some(event) = rx.recv().await {
        if finished(&a)(&event) {
            break;
        }
    }
    assert!(engine.is_running());
    engine.stop();

    let result = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("execution did not stop")
        .unwrap();

    assert_eq!(result.error, None);
    assert_eq!(result.task_results.len(), 1);
    assert_eq!(result.task_results[0].name, "A");
    assert_eq!(result.summary, "**A**\nresult A");

    let tracked = gate.current_plan().unwrap();
    assert_eq!(tracked.find_task(&plan.parallel_groups[0][1].id).unwrap().status, TaskStatus::Skipped);
    assert_eq!(tracked.find_task(&plan.parallel_groups[1][0].id).unwrap().status, TaskStatus::Skipped);
    assert!(fake.requests().iter().all(|r| last_user_text(r) != "do C"));
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_tool_calls_are_mirrored_onto_tasks() {
    let fake = FakeTransport::scripted(vec![
        FakeResponse::ndjson(common::TOOL_CALL_ROUND),
        answer("done"),
    ]);
    let invoker = Arc::new(common::ScriptedInvoker::new().ok("search", serde_json::json!("hit")));
    let context = context(&fake)
        .with_tools(vec![common::tool("search")])
        .with_invoker(invoker);
    let (gate, engine, _rx) = engine(context);
    let plan = AgentPlan::new("One", vec![vec![AgentTask::new("Look", "look it up")]]);
    approve(&gate, &plan);

    let result = engine.execute(&plan, &[]).await;
    assert_eq!(result.summary, "**Look**\ndone");

    let tracked = gate.current_plan().unwrap();
    let task = &tracked.parallel_groups[0][0];
    assert_eq!(task.tool_calls.len(), 1);
    assert_eq!(task.tool_calls[0].name, "search");
    assert!(task.tool_calls[0].status.is_terminal());
}

#[tokio::test]
async fn test_parallelism_bound() {
    let fake = FakeTransport::new(|request| answer(&format!("result {}", &last_user_text(request)[3..])).with_delay(SLOW));
    let settings = Settings {
        max_parallel_tasks: Some(1),
        ..settings()
    };
    let (_gate, engine, mut rx) = engine(EngineContext::with_transport(settings, fake.clone().into()));
    let plan = AgentPlan::new(
        "Bounded",
        vec![vec![
            AgentTask::new("A", "do A"),
            AgentTask::new("B", "do B"),
            AgentTask::new("C", "do C"),
        ]],
    );

    let result = engine.execute(&plan, &[]).await;
    assert_eq!(result.task_results.len(), 3);

    let mut running = 0usize;
    for event in drain(&mut rx) {
        match event {
            OrchestrationEvent::TaskStarted { .. } => {
                running += 1;
                assert!(running <= 1, "more than one task in flight");
            }
            OrchestrationEvent::TaskFinished { .. } => running -= 1,
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_second_execute_is_refused() {
    let fake = FakeTransport::new(|_| partial());
    let (_gate, engine, _rx) = engine(context(&fake));
    let engine = Arc::new(engine);
    let plan = plan();

    let run = tokio::spawn({
        let engine = engine.clone();
        let plan = plan.clone();
        async move { engine.execute(&plan, &[]).await }
    });
    while !engine.is_running() {
        tokio::task::yield_now().await;
    }

    let refused = engine.execute(&plan, &[]).await;
    assert_eq!(refused.error.as_deref(), Some(ALREADY_RUNNING));
    assert!(refused.task_results.is_empty());

    engine.stop();
    let result = tokio::time::timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
    assert_eq!(result.error, None);
    assert!(result.task_results.is_empty());
}

#[tokio::test]
async fn test_running_task_shows_partial_result() {
    let fake = FakeTransport::new(|_| partial());
    let (gate, engine, mut rx) = engine(context(&fake));
    let engine = Arc::new(engine);
    let plan = AgentPlan::new("One", vec![vec![AgentTask::new("Slow", "do Slow")]]);
    approve(&gate, &plan);
    let id = plan.parallel_groups[0][0].id.clone();

    let run = tokio::spawn({
        let engine = engine.clone();
        let plan = plan.clone();
        async move { engine.execute(&plan, &[]).await }
    });

    loop {
        match rx.recv().await.expect("progress channel closed") {
            OrchestrationEvent::TaskUpdated { task_id, patch } if task_id == id && patch.result.is_some() => {
                assert_eq!(patch.result.as_deref(), Some("working"));
                break;
            }
            OrchestrationEvent::TaskFinished { .. } => panic!("task finished before any partial result"),
            _ => {}
        }
    }
    let tracked = gate.current_plan().unwrap();
    let task = tracked.find_task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.result, "working");

    engine.stop();
    tokio::time::timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stop_lands_as_soon_as_running() {
    let fake = FakeTransport::new(|_| partial());
    let (gate, engine, _rx) = engine(context(&fake));
    let engine = Arc::new(engine);
    let plan = plan();
    approve(&gate, &plan);

    let run = tokio::spawn({
        let engine = engine.clone();
        let plan = plan.clone();
        async move { engine.execute(&plan, &[]).await }
    });
    while !engine.is_running() {
        tokio::task::yield_now().await;
    }
    engine.stop();

    let result = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("execution did not stop")
        .unwrap();
    assert!(result.task_results.is_empty());
    assert!(gate.current_plan().unwrap().tasks().all(|t| t.status == TaskStatus::Skipped));
}

#[tokio::test]
async fn test_idle_stop_does_not_carry_over() {
    let fake = responder();
    let (gate, engine, _rx) = engine(context(&fake));
    let plan = plan();
    approve(&gate, &plan);

    engine.stop();
    let result = engine.execute(&plan, &[]).await;

    assert_eq!(result.task_results.len(), 3);
    assert!(gate.current_plan().unwrap().tasks().all(|t| t.status == TaskStatus::Success));
}
