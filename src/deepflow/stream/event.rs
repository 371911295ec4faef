// SPDX-License-Identifier: MIT

//! Wire events and SSE framing

use crate::deepflow::interrupt::InterruptOption;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageChunk,
    ToolCalls,
    ToolCallChunks,
    ToolCallResult,
    Interrupt,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageChunk => "message_chunk",
            EventKind::ToolCalls => "tool_calls",
            EventKind::ToolCallChunks => "tool_call_chunks",
            EventKind::ToolCallResult => "tool_call_result",
            EventKind::Interrupt => "interrupt",
            EventKind::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<EventKind> {
        match s {
            "message_chunk" => Some(EventKind::MessageChunk),
            "tool_calls" => Some(EventKind::ToolCalls),
            "tool_call_chunks" => Some(EventKind::ToolCallChunks),
            "tool_call_result" => Some(EventKind::ToolCallResult),
            "interrupt" => Some(EventKind::Interrupt),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireToolCallChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EventData {
    pub thread_id: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_chunks: Option<Vec<WireToolCallChunk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<InterruptOption>>,
}

/// One event on the client stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub data: EventData,
}

impl StreamEvent {
    pub fn new(kind: EventKind, data: EventData) -> Self {
        Self { kind, data }
    }

    /// JSON payload of the `data:` line; empty content is omitted
    pub fn data_json(&self) -> String {
        serde_json::to_string(&self.data).unwrap_or_else(|_| "{}".to_string())
    }

    /// `event: <kind>\ndata: <json>\n\n`
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind, self.data_json())
    }
}

/// Read SSE-framed events back. Unknown event kinds (such as replay
/// separators) and malformed blocks are skipped.
pub fn parse_sse(text: &str) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    for block in text.split("\n\n") {
        let mut kind = None;
        let mut data = String::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                kind = EventKind::parse(rest.trim());
            } else if let Some(rest) = line.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(rest.trim_start());
            }
        }
        let Some(kind) = kind else { continue };
        match serde_json::from_str::<EventData>(&data) {
            Ok(data) => events.push(StreamEvent { kind, data }),
            Err(e) => log::debug!("Skipping malformed SSE block: {}", e),
        }
    }
    events
}
