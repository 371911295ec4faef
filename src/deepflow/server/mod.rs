// SPDX-License-Identifier: MIT

//! HTTP surface: health, the SSE chat stream, MCP server metadata and the
//! resource catalog

use axum::{
    extract::{Query, State as Shared},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

use crate::deepflow::config::{filter_resources, AppConfig, RunConfig, RunOverrides};
use crate::deepflow::graph::{CancelFlag, RunOptions, Workflow};
use crate::deepflow::interrupt::resume_text;
use crate::deepflow::mcp::{self, McpServerMetadataRequest, McpServerMetadataResponse};
use crate::deepflow::state::{Message, Resource, Role, State};
use crate::deepflow::stream::{ReplayRecorder, StreamEvent};

const DEFAULT_THREAD_ID: &str = "__default__";

/// Shared by every request
pub struct AppState {
    workflow: Workflow,
    recorder: Option<ReplayRecorder>,
    resources: Vec<Resource>,
}

impl AppState {
    pub fn new(workflow: Workflow, recorder: Option<ReplayRecorder>) -> Self {
        Self {
            workflow,
            recorder,
            resources: Vec::new(),
        }
    }

    /// Offer `resources` on `/api/rag/resources`
    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }
}

pub fn router(state: Arc<AppState>, replay_dir: Option<&std::path::Path>) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/mcp/server/metadata", post(mcp_server_metadata))
        .route("/api/rag/resources", get(rag_resources));
    if let Some(dir) = replay_dir {
        app = app.nest_service("/api/replays", ServeDir::new(dir));
    }
    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    workflow: Workflow,
    config: &AppConfig,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let recorder = config.replay_dir.as_ref().map(ReplayRecorder::new);
    let state = Arc::new(
        AppState::new(workflow, recorder).with_resources(config.resources.clone()),
    );
    let app = router(state, config.replay_dir.as_deref());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Message content: plain text or a list of typed items
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Items(Vec<ContentItem>),
}

impl ChatContent {
    /// Text items joined by newlines; other item types are dropped
    pub fn text(&self) -> String {
        match self {
            ChatContent::Text(text) => text.clone(),
            ChatContent::Items(items) => items
                .iter()
                .filter(|item| item.kind == "text")
                .filter_map(|item| item.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: ChatContent,
}

impl ChatMessage {
    fn to_message(&self) -> Message {
        let role = match self.role.as_str() {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::User,
        };
        Message::new(role, self.content.text())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub resources: Option<Vec<Resource>>,
    #[serde(default)]
    pub max_plan_iterations: Option<u32>,
    #[serde(default)]
    pub max_step_num: Option<u32>,
    #[serde(default)]
    pub max_search_results: Option<u32>,
    #[serde(default)]
    pub auto_accepted_plan: Option<bool>,
    #[serde(default)]
    pub interrupt_feedback: Option<String>,
    #[serde(default)]
    pub enable_background_investigation: Option<bool>,
}

impl ChatRequest {
    /// The requested thread, or a fresh one for absent and `__default__` ids
    pub fn thread_id(&self) -> String {
        match self.thread_id.as_deref() {
            Some(id) if !id.is_empty() && id != DEFAULT_THREAD_ID => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        }
    }

    pub fn run_config(&self) -> RunConfig {
        let overrides = RunOverrides {
            max_plan_iterations: self.max_plan_iterations,
            max_step_num: self.max_step_num,
            max_search_results: self.max_search_results,
            ..Default::default()
        };
        RunConfig::resolve(&overrides, self.resources.clone().unwrap_or_default())
    }

    pub fn initial_state(&self) -> State {
        let messages = self.messages.iter().map(ChatMessage::to_message).collect();
        let mut state = State::with_messages(messages);
        state.auto_accepted_plan = self.auto_accepted_plan.unwrap_or(false);
        state.enable_background_investigation =
            self.enable_background_investigation.unwrap_or(true);
        state
    }

    fn last_content(&self) -> String {
        self.messages
            .last()
            .map(|m| m.content.text())
            .unwrap_or_default()
    }
}

async fn chat_stream(
    Shared(app): Shared<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let thread_id = payload.thread_id();
    let (events_tx, mut events_rx) = mpsc::channel::<StreamEvent>(100);
    let (tx, rx) = mpsc::channel::<StreamEvent>(100);
    let cancel = CancelFlag::new();

    let options = RunOptions::new(payload.run_config())
        .with_events(events_tx)
        .with_cancel(cancel.clone());

    // Forward run events to the client, recording them on the way.
    let recorder = app.recorder.clone();
    let forward_thread = thread_id.clone();
    let last_content = payload.last_content();
    tokio::spawn(async move {
        let session = match &recorder {
            Some(recorder) => match recorder.start(&forward_thread).await {
                Ok(session) => {
                    let id = format!("{}-user-{}", forward_thread, Uuid::new_v4());
                    session.record_user_message(&id, &last_content).await;
                    Some(session)
                }
                Err(e) => {
                    log::warn!("Recording disabled for thread {}: {}", forward_thread, e);
                    None
                }
            },
            None => None,
        };

        while let Some(event) = events_rx.recv().await {
            if let Some(session) = &session {
                session.record(&event).await;
            }
            if tx.send(event).await.is_err() && !cancel.is_cancelled() {
                log::info!("Client for thread {} disconnected, cancelling", forward_thread);
                cancel.cancel();
            }
        }

        if let (Some(recorder), Some(session)) = (&recorder, &session) {
            recorder.finish(session).await;
        }
    });

    tokio::spawn(async move {
        let workflow = &app.workflow;
        let result = match payload.interrupt_feedback.as_deref() {
            Some(feedback) if has_checkpoint(workflow, &thread_id).await => {
                let text = resume_text(feedback, &payload.last_content());
                log::info!("Resuming thread {} with {}", thread_id, text);
                workflow.resume(&thread_id, &text, options).await
            }
            _ => {
                log::info!("Starting thread {}", thread_id);
                workflow
                    .run(&thread_id, payload.initial_state(), options)
                    .await
            }
        };
        match result {
            Ok(outcome) if outcome.is_completed() => {
                log::info!("Thread {} completed", thread_id)
            }
            Ok(_) => log::info!("Thread {} waiting for feedback", thread_id),
            Err(e) => log::warn!("Thread {} failed: {}", thread_id, e),
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .event(event.kind.as_str())
            .data(event.data_json()))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}

async fn mcp_server_metadata(
    Json(request): Json<McpServerMetadataRequest>,
) -> Result<Json<McpServerMetadataResponse>, (StatusCode, Json<Value>)> {
    mcp::server_metadata(&request).await.map(Json).map_err(|e| {
        log::warn!("MCP metadata request failed: {}", e);
        let status = if e.is_bad_request() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": "mcp_metadata", "message": e.to_string() })))
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ResourceQuery {
    #[serde(default)]
    pub query: Option<String>,
}

async fn rag_resources(
    Shared(app): Shared<Arc<AppState>>,
    Query(params): Query<ResourceQuery>,
) -> Json<Value> {
    let resources = filter_resources(&app.resources, params.query.as_deref());
    Json(json!({ "resources": resources }))
}

async fn has_checkpoint(workflow: &Workflow, thread_id: &str) -> bool {
    match workflow.checkpoints().load(thread_id).await {
        Ok(found) => found.is_some(),
        Err(e) => {
            log::warn!("Cannot read checkpoint for thread {}: {}", thread_id, e);
            false
        }
    }
}
