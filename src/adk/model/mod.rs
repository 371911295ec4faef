// SPDX-License-Identifier: MIT

//! Model module - defines the LLM collaborator trait and conversation types
//!
//! Nodes talk to language models exclusively through [`Model`]. The shipped
//! implementation is an OpenAI-compatible chat completions client in
//! [`openai`]; tests substitute scripted mocks.

pub mod openai;

use crate::adk::error::ModelError;
use crate::adk::tool::Tool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    /// JSON schema the response must follow (structured output)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

impl GenerationConfig {
    /// Config requesting structured output matching `schema`
    pub fn structured(schema: serde_json::Value) -> Self {
        Self {
            response_schema: Some(schema),
            ..Default::default()
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message - text, tool calls, tool responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Function/tool call requested by the model
    FunctionCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    /// Response from executing a function/tool
    FunctionResponse {
        id: String,
        name: String,
        response: serde_json::Value,
    },
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text("model", text)
    }

    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text of all text parts
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls requested in this message
    pub fn function_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall { id, name, args } => {
                    Some((id.as_str(), name.as_str(), args))
                }
                _ => None,
            })
            .collect()
    }
}

/// Incremental output of a streaming generation
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    /// A piece of assistant text
    TextDelta(String),
    /// A piece of a tool call; `id`/`name` are only set on the first chunk of a call
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        args: String,
    },
    /// End of the turn
    Finish { reason: String },
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content, ModelError>;

    /// Generate while forwarding deltas to `tx`. Returns the complete message.
    async fn stream_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[Arc<dyn Tool>]>,
        tx: mpsc::Sender<ModelChunk>,
    ) -> Result<Content, ModelError> {
        // Default implementation replays the full response as a single delta per part
        let content = self.generate_content(history, config, tools).await?;

        let text = content.text_content();
        if !text.is_empty() {
            let _ = tx.send(ModelChunk::TextDelta(text)).await;
        }

        let calls = content.function_calls();
        for (index, (id, name, args)) in calls.iter().enumerate() {
            let _ = tx
                .send(ModelChunk::ToolCallDelta {
                    index,
                    id: Some(id.to_string()),
                    name: Some(name.to_string()),
                    args: args.to_string(),
                })
                .await;
        }

        let reason = if calls.is_empty() { "stop" } else { "tool_calls" };
        let _ = tx
            .send(ModelChunk::Finish {
                reason: reason.to_string(),
            })
            .await;

        Ok(content)
    }
}
