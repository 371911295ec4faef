// SPDX-License-Identifier: MIT

//! Node-side handle for publishing stream events

use super::event::{EventData, EventKind, StreamEvent, WireToolCall, WireToolCallChunk};
use crate::adk::agent::AgentEvent;
use crate::deepflow::interrupt::InterruptOption;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Publishes events for one thread. A disabled emitter drops everything.
#[derive(Clone)]
pub struct EventEmitter {
    thread_id: String,
    tx: Option<mpsc::Sender<StreamEvent>>,
}

impl EventEmitter {
    pub fn new(thread_id: impl Into<String>, tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            thread_id: thread_id.into(),
            tx: Some(tx),
        }
    }

    pub fn disabled(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            tx: None,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub async fn emit(&self, event: StreamEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                log::debug!("Stream receiver for thread {} dropped", self.thread_id);
            }
        }
    }

    fn data(&self, id: impl Into<String>, agent: Option<&str>) -> EventData {
        EventData {
            thread_id: self.thread_id.clone(),
            id: id.into(),
            agent: agent.map(str::to_string),
            role: "assistant".to_string(),
            ..Default::default()
        }
    }

    /// A complete assistant message as a single chunk
    pub async fn message(&self, agent: &str, id: &str, content: &str) {
        let mut data = self.data(id, Some(agent));
        data.content = content.to_string();
        data.finish_reason = Some("stop".to_string());
        self.emit(StreamEvent::new(EventKind::MessageChunk, data))
            .await;
    }

    pub async fn interrupt(
        &self,
        agent: &str,
        id: &str,
        prompt: &str,
        options: &[InterruptOption],
    ) {
        let mut data = self.data(id, Some(agent));
        data.content = prompt.to_string();
        data.finish_reason = Some("interrupt".to_string());
        data.options = Some(options.to_vec());
        self.emit(StreamEvent::new(EventKind::Interrupt, data)).await;
    }

    /// Terminal error event
    pub async fn error(&self, message: &str) {
        let mut data = self.data(Uuid::new_v4().to_string(), None);
        data.content = message.to_string();
        data.finish_reason = Some("error".to_string());
        self.emit(StreamEvent::new(EventKind::Error, data)).await;
    }

    /// Run `task` with an agent event channel, forwarding its events as
    /// stream events attributed to `agent` until the task finishes.
    pub async fn relay<F, Fut, T>(&self, agent: &str, task: F) -> T
    where
        F: FnOnce(mpsc::Sender<AgentEvent>) -> Fut,
        Fut: Future<Output = T>,
    {
        let (tx, mut rx) = mpsc::channel(64);
        let work = task(tx);
        let forward = async {
            let mut translator = Translator::default();
            while let Some(event) = rx.recv().await {
                let mut out = translator.translate(event);
                out.data.thread_id = self.thread_id.clone();
                out.data.agent = Some(agent.to_string());
                self.emit(out).await;
            }
        };
        let (result, ()) = tokio::join!(work, forward);
        result
    }
}

/// Turns agent events into wire events. Tool-call starts are announced as
/// `tool_calls` carrying every call seen so far in that message.
#[derive(Default)]
struct Translator {
    calls: HashMap<String, Vec<WireToolCall>>,
}

impl Translator {
    fn translate(&mut self, event: AgentEvent) -> StreamEvent {
        let base = |id: String| EventData {
            id,
            role: "assistant".to_string(),
            ..Default::default()
        };

        match event {
            AgentEvent::MessageChunk {
                message_id,
                content,
            } => {
                let mut data = base(message_id);
                data.content = content;
                StreamEvent::new(EventKind::MessageChunk, data)
            }
            AgentEvent::ToolCallChunk {
                message_id,
                index,
                id,
                name,
                args,
            } => {
                let chunk = WireToolCallChunk {
                    id: id.clone(),
                    name: name.clone(),
                    args,
                    index,
                };
                let mut data = base(message_id.clone());
                data.tool_call_chunks = Some(vec![chunk]);
                match (id, name) {
                    (Some(id), Some(name)) => {
                        let calls = self.calls.entry(message_id).or_default();
                        calls.push(WireToolCall {
                            id,
                            name,
                            args: serde_json::json!({}),
                        });
                        data.tool_calls = Some(calls.clone());
                        StreamEvent::new(EventKind::ToolCalls, data)
                    }
                    _ => StreamEvent::new(EventKind::ToolCallChunks, data),
                }
            }
            AgentEvent::ToolResult {
                message_id,
                tool_call_id,
                content,
            } => {
                let mut data = base(message_id);
                data.role = "tool".to_string();
                data.content = content;
                data.tool_call_id = Some(tool_call_id);
                StreamEvent::new(EventKind::ToolCallResult, data)
            }
            AgentEvent::Finish { message_id, reason } => {
                self.calls.remove(&message_id);
                let mut data = base(message_id);
                data.finish_reason = Some(reason);
                StreamEvent::new(EventKind::MessageChunk, data)
            }
        }
    }
}
