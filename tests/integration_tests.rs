//! Integration tests for the research workflow
//!
//! These tests drive the full node graph end to end with scripted models.

use async_trait::async_trait;
use deepflow_rs::adk::error::{DeepflowError, ModelError, WorkflowError};
use deepflow_rs::adk::model::{Content, GenerationConfig, Model, Part};
use deepflow_rs::adk::tool::Tool;
use deepflow_rs::deepflow::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use deepflow_rs::deepflow::config::RunConfig;
use deepflow_rs::deepflow::graph::{CancelFlag, RunOptions, RunOutcome, Workflow};
use deepflow_rs::deepflow::nodes::{build_registry, AgentModels, AgentTools, HANDOFF_TOOL_NAME};
use deepflow_rs::deepflow::server::{router, AppState};
use deepflow_rs::deepflow::state::{Message, Resource, State, StateDelta};
use deepflow_rs::deepflow::stream::{parse_sse, MessageMerger};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ============================================================================
// Mock Components
// ============================================================================

/// Mock model that replays a fixed script of responses, in call order
struct ScriptedModel {
    responses: Mutex<VecDeque<Content>>,
    calls: Mutex<Vec<Vec<Content>>>,
}

impl ScriptedModel {
    fn new(responses: Vec<Content>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn generate_content(
        &self,
        history: &[Content],
        _config: Option<&GenerationConfig>,
        _tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content, ModelError> {
        self.calls.lock().unwrap().push(history.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::InvalidResponse("script exhausted".into()))
    }
}

fn text(text: &str) -> Content {
    Content::model(text)
}

fn tool_call(name: &str, args: Value) -> Content {
    Content {
        role: "model".to_string(),
        parts: vec![Part::FunctionCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            args,
        }],
    }
}

fn handoff() -> Content {
    tool_call(
        HANDOFF_TOOL_NAME,
        json!({"task_title": "EV market", "locale": "en-US"}),
    )
}

fn plan(has_enough_context: bool, steps: Value) -> Content {
    text(
        &json!({
            "locale": "en-US",
            "has_enough_context": has_enough_context,
            "thought": "Understand the EV market",
            "title": "EV Market Research",
            "steps": steps
        })
        .to_string(),
    )
}

fn two_step_plan() -> Content {
    plan(
        false,
        json!([
            {"title": "Collect sales data", "description": "Find 2024 EV sales", "step_type": "research", "need_search": true},
            {"title": "Compute growth", "description": "Year over year growth", "step_type": "processing", "need_search": false}
        ]),
    )
}

fn workflow(model: Arc<ScriptedModel>) -> Workflow {
    let registry = build_registry(&AgentModels::uniform(model), &AgentTools::default()).unwrap();
    Workflow::new(registry, Arc::new(MemoryCheckpointStore::new()))
}

fn question(auto_accept: bool) -> State {
    let mut state = State::with_messages(vec![Message::user("How big is the EV market?")]);
    state.auto_accepted_plan = auto_accept;
    state.enable_background_investigation = false;
    state
}

fn agent_names(state: &State) -> Vec<&str> {
    state
        .messages
        .iter()
        .filter_map(|m| m.name.as_deref())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_empty_delta_leaves_state_unchanged() {
    let state = question(false);
    assert_eq!(state.clone().apply(StateDelta::new()), state);
}

#[tokio::test]
async fn test_full_run_routes_research_then_processing() {
    let model = ScriptedModel::new(vec![
        handoff(),
        two_step_plan(),
        text("EV sales reached 14M units in 2024."),
        text("Growth was 25% year over year."),
        text("# EV Market Report\n\nSales grew 25%."),
    ]);
    let wf = workflow(model.clone());

    let outcome = wf
        .run("t-full", question(true), RunOptions::default())
        .await
        .unwrap();

    let state = match outcome {
        RunOutcome::Completed(state) => state,
        RunOutcome::Interrupted(_) => panic!("auto-accepted run should not interrupt"),
    };
    assert_eq!(state.final_report, "# EV Market Report\n\nSales grew 25%.");
    assert_eq!(agent_names(&state), vec!["planner", "researcher", "coder"]);
    assert_eq!(
        state.observations,
        vec![
            "EV sales reached 14M units in 2024.",
            "Growth was 25% year over year."
        ]
    );
    assert_eq!(state.plan_iterations, 1);
    let plan = state.current_plan.unwrap();
    assert!(plan.steps.iter().all(|s| s.is_executed()));
    assert_eq!(model.remaining(), 0);
}

#[tokio::test]
async fn test_plan_with_enough_context_skips_research() {
    let model = ScriptedModel::new(vec![
        handoff(),
        plan(true, json!([])),
        text("Short report"),
    ]);
    let wf = workflow(model.clone());

    let outcome = wf
        .run("t-enough", question(false), RunOptions::default())
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.state().final_report, "Short report");
    assert!(outcome.state().observations.is_empty());
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn test_interrupt_then_accept_completes() {
    let model = ScriptedModel::new(vec![
        handoff(),
        two_step_plan(),
        text("research result"),
        text("processing result"),
        text("final report"),
    ]);
    let wf = workflow(model);

    let outcome = wf
        .run("t-review", question(false), RunOptions::default())
        .await
        .unwrap();
    let checkpoint = match outcome {
        RunOutcome::Interrupted(checkpoint) => checkpoint,
        RunOutcome::Completed(_) => panic!("plan review should interrupt"),
    };
    assert_eq!(checkpoint.prompt, "Please Review the Plan.");
    assert_eq!(checkpoint.options.len(), 2);
    assert!(wf.checkpoints().load("t-review").await.unwrap().is_some());

    let outcome = wf
        .resume("t-review", "[accepted]", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.state().final_report, "final report");
    assert!(wf.checkpoints().load("t-review").await.unwrap().is_none());
}

#[tokio::test]
async fn test_resume_is_idempotent_for_the_same_checkpoint() {
    let model = ScriptedModel::new(vec![handoff(), two_step_plan()]);
    let outcome = workflow(model)
        .run("t-idem", question(false), RunOptions::default())
        .await
        .unwrap();
    let checkpoint = match outcome {
        RunOutcome::Interrupted(checkpoint) => checkpoint,
        RunOutcome::Completed(_) => panic!("expected interrupt"),
    };

    let mut finals = Vec::new();
    for _ in 0..2 {
        let model = ScriptedModel::new(vec![
            text("research result"),
            text("processing result"),
            text("final report"),
        ]);
        let outcome = workflow(model)
            .resume_from(checkpoint.clone(), "[ACCEPTED]", RunOptions::default())
            .await
            .unwrap();
        finals.push(outcome.state().clone());
    }
    assert_eq!(finals[0], finals[1]);
}

#[tokio::test]
async fn test_edit_plan_feedback_replans() {
    let model = ScriptedModel::new(vec![handoff(), two_step_plan(), two_step_plan()]);
    let wf = workflow(model.clone());

    wf.run("t-edit", question(false), RunOptions::default())
        .await
        .unwrap();
    let outcome = wf
        .resume(
            "t-edit",
            "[EDIT_PLAN] add a step on charging infrastructure",
            RunOptions::default(),
        )
        .await
        .unwrap();

    assert!(!outcome.is_completed());
    let state = outcome.state();
    assert!(state.messages.iter().any(|m| m.name.as_deref() == Some("feedback")
        && m.content.contains("charging infrastructure")));
    assert_eq!(state.plan_iterations, 0);

    // The planner saw the feedback on its second call
    let calls = model.calls.lock().unwrap();
    let last = calls.last().unwrap();
    assert!(last
        .iter()
        .any(|c| c.text_content().contains("charging infrastructure")));
}

#[tokio::test]
async fn test_unsupported_feedback_keeps_checkpoint() {
    let model = ScriptedModel::new(vec![handoff(), two_step_plan()]);
    let wf = workflow(model);

    wf.run("t-maybe", question(false), RunOptions::default())
        .await
        .unwrap();
    let err = wf
        .resume("t-maybe", "[maybe] not sure", RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeepflowError::Workflow(WorkflowError::UnsupportedResume(_))
    ));
    assert!(wf.checkpoints().load("t-maybe").await.unwrap().is_some());
}

#[tokio::test]
async fn test_round_limit_falls_back_to_note() {
    let model = ScriptedModel::new(vec![
        handoff(),
        plan(
            false,
            json!([{"title": "Collect sales data", "description": "", "step_type": "research"}]),
        ),
        tool_call("web_search", json!({"query": "ev sales"})),
        text(""),
        text("report"),
    ]);
    let wf = workflow(model);

    let config = RunConfig {
        agent_recursion_limit: 1,
        ..Default::default()
    };
    let outcome = wf
        .run("t-limit", question(true), RunOptions::new(config))
        .await
        .unwrap();

    let state = outcome.state();
    assert_eq!(state.observations.len(), 1);
    assert!(state.observations[0].contains("stopped after 1 rounds"));
    let step = &state.current_plan.as_ref().unwrap().steps[0];
    assert_eq!(step.execution_res.as_deref(), Some(state.observations[0].as_str()));
    assert_eq!(state.final_report, "report");
}

#[tokio::test]
async fn test_recursion_limit_stops_the_run() {
    let model = ScriptedModel::new(vec![handoff(), two_step_plan()]);
    let wf = workflow(model);

    let config = RunConfig {
        recursion_limit: 2,
        ..Default::default()
    };
    let err = wf
        .run("t-recursion", question(true), RunOptions::new(config))
        .await
        .unwrap_err();
    assert!(matches!(err, DeepflowError::RecursionLimit { limit: 2 }));
}

#[tokio::test]
async fn test_cancelled_run_does_not_call_the_model() {
    let model = ScriptedModel::new(vec![handoff()]);
    let wf = workflow(model.clone());

    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = wf
        .run(
            "t-cancel",
            question(true),
            RunOptions::default().with_cancel(cancel),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DeepflowError::Cancelled));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_stream_merges_into_messages() {
    let model = ScriptedModel::new(vec![
        handoff(),
        two_step_plan(),
        text("research result"),
        text("processing result"),
        text("final report"),
    ]);
    let wf = workflow(model);

    let (tx, rx) = mpsc::channel(100);
    let merger = MessageMerger::consume(rx);
    wf.run(
        "t-stream",
        question(true),
        RunOptions::default().with_events(tx),
    )
    .await
    .unwrap();
    let merger = merger.await.unwrap();

    let messages = merger.messages();
    let by_agent = |agent: &str| {
        messages
            .iter()
            .find(|m| m.agent.as_deref() == Some(agent))
            .copied()
            .unwrap()
    };
    assert_eq!(by_agent("coordinator").tool_calls[0].name, HANDOFF_TOOL_NAME);
    assert!(by_agent("planner").content.contains("EV Market Research"));
    assert_eq!(by_agent("researcher").content, "research result");
    assert_eq!(by_agent("reporter").content, "final report");
    assert!(messages.iter().all(|m| m.thread_id == "t-stream"));
}

#[tokio::test]
async fn test_chat_stream_endpoint_serves_sse() {
    let model = ScriptedModel::new(vec![
        handoff(),
        two_step_plan(),
        text("research result"),
        text("processing result"),
        text("final report"),
    ]);
    let app = router(Arc::new(AppState::new(workflow(model), None)), None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let health: Value = client
        .get(format!("http://{}/api/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let body = client
        .post(format!("http://{}/api/chat/stream", addr))
        .json(&json!({
            "messages": [{"role": "user", "content": "How big is the EV market?"}],
            "thread_id": "t-http",
            "auto_accepted_plan": true,
            "enable_background_investigation": false
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let mut merger = MessageMerger::new();
    for event in parse_sse(&body) {
        merger.push(&event);
    }
    let report = merger
        .messages()
        .into_iter()
        .find(|m| m.agent.as_deref() == Some("reporter"))
        .unwrap()
        .content
        .clone();
    assert_eq!(report, "final report");
}

async fn spawn_app(state: AppState) -> std::net::SocketAddr {
    let app = router(Arc::new(state), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_rag_resources_filters_the_catalog() {
    let catalog = vec![
        Resource {
            uri: "rag://dataset/ev-sales".into(),
            title: "EV Sales 2024".into(),
            content: None,
        },
        Resource {
            uri: "rag://dataset/battery".into(),
            title: "Battery Costs".into(),
            content: None,
        },
    ];
    let state = AppState::new(workflow(ScriptedModel::new(vec![])), None).with_resources(catalog);
    let addr = spawn_app(state).await;
    let client = reqwest::Client::new();

    let all: Value = client
        .get(format!("http://{}/api/rag/resources", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["resources"].as_array().unwrap().len(), 2);

    let filtered: Value = client
        .get(format!("http://{}/api/rag/resources?query=ev", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let resources = filtered["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["uri"], "rag://dataset/ev-sales");
}

#[tokio::test]
async fn test_mcp_metadata_rejects_unsupported_transport() {
    let addr = spawn_app(AppState::new(workflow(ScriptedModel::new(vec![])), None)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/mcp/server/metadata", addr))
        .json(&json!({"transport": "sse", "url": "http://localhost:3000/sse"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("sse"));
}

#[tokio::test]
async fn test_mcp_metadata_reports_failing_server() {
    let addr = spawn_app(AppState::new(workflow(ScriptedModel::new(vec![])), None)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/mcp/server/metadata", addr))
        .json(&json!({
            "transport": "stdio",
            "command": "/nonexistent/deepflow-mcp-server",
            "timeout_seconds": 5
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
}
