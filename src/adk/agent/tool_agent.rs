// SPDX-License-Identifier: MIT

//! Tool Agent - LLM agent with a bounded tool-calling loop
//!
//! Each round is one model call plus the tool calls it requested. The loop
//! stops when the model answers without tool calls, or when the round budget
//! is spent; the caller decides how to recover from the latter.

use super::AgentEvent;
use crate::adk::error::ModelError;
use crate::adk::model::{Content, GenerationConfig, Model, ModelChunk, Part};
use crate::adk::tool::{Tool, ToolCall, ToolSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// How an agent run ended
#[derive(Debug, Clone)]
pub enum AgentRun {
    /// The model produced a final answer
    Answered {
        answer: String,
        history: Vec<Content>,
        rounds: u32,
    },
    /// The round budget ran out while the model was still calling tools
    RoundLimit { history: Vec<Content>, rounds: u32 },
}

impl AgentRun {
    pub fn history(&self) -> &[Content] {
        match self {
            AgentRun::Answered { history, .. } | AgentRun::RoundLimit { history, .. } => history,
        }
    }

    pub fn rounds(&self) -> u32 {
        match self {
            AgentRun::Answered { rounds, .. } | AgentRun::RoundLimit { rounds, .. } => *rounds,
        }
    }
}

/// LLM agent with tool calling support
pub struct ToolAgent {
    pub name: String,
    pub instruction: String,
    pub model: Arc<dyn Model>,
    pub tools: ToolSet,
    pub max_rounds: u32,
}

impl ToolAgent {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        model: Arc<dyn Model>,
        tools: ToolSet,
        max_rounds: u32,
    ) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            model,
            tools,
            max_rounds: max_rounds.max(1),
        }
    }

    /// Run the agent on `input`, forwarding progress to `events` when given
    pub async fn run(
        &self,
        input: Vec<Content>,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<AgentRun, ModelError> {
        let mut history = Vec::with_capacity(input.len() + 1);
        history.push(Content::system(self.instruction.clone()));
        history.extend(input);

        for round in 0..self.max_rounds {
            log::info!(
                "Agent {} round {}/{}",
                self.name,
                round + 1,
                self.max_rounds
            );

            let tools = if self.tools.is_empty() {
                None
            } else {
                Some(self.tools.as_slice())
            };
            let response =
                stream_turn(self.model.as_ref(), &history, None, tools, events).await?;

            let calls: Vec<ToolCall> = response
                .function_calls()
                .into_iter()
                .map(|(id, name, args)| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    args: args.clone(),
                })
                .collect();

            if calls.is_empty() {
                let answer = response.text_content();
                log::info!(
                    "Agent {} answered after {} round(s) (length: {})",
                    self.name,
                    round + 1,
                    answer.len()
                );
                history.push(response);
                return Ok(AgentRun::Answered {
                    answer,
                    history,
                    rounds: round + 1,
                });
            }

            let outputs = self.tools.execute_all(&calls).await;

            let mut responses = Vec::with_capacity(outputs.len());
            for output in outputs {
                log::debug!("Tool {} response: {}", output.name, output.result);
                emit(
                    events,
                    AgentEvent::ToolResult {
                        message_id: Uuid::new_v4().to_string(),
                        tool_call_id: output.id.clone(),
                        content: match &output.result {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        },
                    },
                )
                .await;
                responses.push(Part::FunctionResponse {
                    id: output.id,
                    name: output.name,
                    response: output.result,
                });
            }

            history.push(response);
            history.push(Content {
                role: "tool".to_string(),
                parts: responses,
            });
        }

        log::warn!(
            "Agent {} reached its round limit ({})",
            self.name,
            self.max_rounds
        );
        Ok(AgentRun::RoundLimit {
            history,
            rounds: self.max_rounds,
        })
    }

    /// One direct model call without tools, appending `prompt` to `history`
    pub async fn summarize(
        &self,
        history: &[Content],
        prompt: &str,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<String, ModelError> {
        let mut messages = history.to_vec();
        messages.push(Content::user(prompt));
        let response = stream_turn(self.model.as_ref(), &messages, None, None, events).await?;
        Ok(response.text_content())
    }
}

/// One streamed model turn. Deltas are forwarded to `events` under a fresh
/// message id while the model call runs.
pub async fn stream_turn(
    model: &dyn Model,
    history: &[Content],
    config: Option<&GenerationConfig>,
    tools: Option<&[Arc<dyn Tool>]>,
    events: Option<&mpsc::Sender<AgentEvent>>,
) -> Result<Content, ModelError> {
    let message_id = Uuid::new_v4().to_string();
    let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
    let generation = model.stream_content(history, config, tools, chunk_tx);
    let forward = async {
        while let Some(chunk) = chunk_rx.recv().await {
            emit(events, chunk_to_event(&message_id, chunk)).await;
        }
    };
    let (response, ()) = tokio::join!(generation, forward);
    response
}

fn chunk_to_event(message_id: &str, chunk: ModelChunk) -> AgentEvent {
    let message_id = message_id.to_string();
    match chunk {
        ModelChunk::TextDelta(content) => AgentEvent::MessageChunk {
            message_id,
            content,
        },
        ModelChunk::ToolCallDelta {
            index,
            id,
            name,
            args,
        } => AgentEvent::ToolCallChunk {
            message_id,
            index,
            id,
            name,
            args,
        },
        ModelChunk::Finish { reason } => AgentEvent::Finish { message_id, reason },
    }
}

async fn emit(events: Option<&mpsc::Sender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        // A closed receiver only means nobody is watching
        let _ = tx.send(event).await;
    }
}
