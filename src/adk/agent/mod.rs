// SPDX-License-Identifier: MIT

//! Agent module - the bounded tool-calling agent used by workflow nodes
//!
//! [`ToolAgent`] alternates model calls and tool rounds and reports progress
//! as [`AgentEvent`]s over an mpsc channel.

mod tool_agent;

pub use tool_agent::{stream_turn, AgentRun, ToolAgent};

use serde::{Deserialize, Serialize};

/// Progress reported by an agent while it runs.
///
/// Every event names the message it belongs to; text and tool-call deltas of one
/// model turn share a `message_id`, tool results get their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    /// A piece of assistant text
    MessageChunk { message_id: String, content: String },
    /// A piece of a tool call as it streams in
    ToolCallChunk {
        message_id: String,
        index: usize,
        id: Option<String>,
        name: Option<String>,
        args: String,
    },
    /// Result of one tool call
    ToolResult {
        message_id: String,
        tool_call_id: String,
        content: String,
    },
    /// End of a model turn
    Finish { message_id: String, reason: String },
}
