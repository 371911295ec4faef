// SPDX-License-Identifier: MIT

//! Folds the event stream into client messages
//!
//! Messages appear in the order their first event arrived and are never
//! reordered. Once a message has a finish reason it is terminated and later
//! events for it are ignored, so replaying a stream is harmless.

use super::event::{EventKind, StreamEvent};
use crate::deepflow::interrupt::InterruptOption;
use crate::deepflow::json;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MergedToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
    /// Raw argument text while the call is streaming
    #[serde(skip)]
    pub args_chunks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MergedMessage {
    pub id: String,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub role: String,
    pub content: String,
    pub content_chunks: Vec<String>,
    pub is_streaming: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MergedToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<InterruptOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Index into `tool_calls` of the call receiving id-less chunks
    #[serde(skip)]
    streaming_call: Option<usize>,
}

impl MergedMessage {
    fn new(event: &StreamEvent) -> Self {
        Self {
            id: event.data.id.clone(),
            thread_id: event.data.thread_id.clone(),
            agent: event.data.agent.clone(),
            role: event.data.role.clone(),
            content: String::new(),
            content_chunks: Vec::new(),
            is_streaming: true,
            tool_calls: Vec::new(),
            options: None,
            finish_reason: None,
            streaming_call: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.finish_reason.is_some()
    }

    fn merge_tool_calls(&mut self, event: &StreamEvent) {
        let data = &event.data;

        if event.kind == EventKind::ToolCalls {
            if let Some(calls) = &data.tool_calls {
                let named = calls.first().map(|c| !c.name.is_empty()).unwrap_or(false);
                if named {
                    let previous = std::mem::take(&mut self.tool_calls);
                    self.tool_calls = calls
                        .iter()
                        .map(|raw| {
                            // A call already being streamed keeps its buffers
                            match previous.iter().find(|p| p.id == raw.id) {
                                Some(existing) => existing.clone(),
                                None => MergedToolCall {
                                    id: raw.id.clone(),
                                    name: raw.name.clone(),
                                    args: raw.args.clone(),
                                    args_chunks: None,
                                    result: None,
                                },
                            }
                        })
                        .collect();
                    self.streaming_call = None;
                }
            }
        }

        for chunk in data.tool_call_chunks.iter().flatten() {
            match &chunk.id {
                Some(id) => {
                    let index = match self.tool_calls.iter().position(|c| &c.id == id) {
                        Some(i) => i,
                        None => {
                            self.tool_calls.push(MergedToolCall {
                                id: id.clone(),
                                name: chunk.name.clone().unwrap_or_default(),
                                args: Value::Object(Default::default()),
                                args_chunks: None,
                                result: None,
                            });
                            self.tool_calls.len() - 1
                        }
                    };
                    self.tool_calls[index].args_chunks = Some(vec![chunk.args.clone()]);
                    self.streaming_call = Some(index);
                }
                None => {
                    if let Some(call) = self
                        .streaming_call
                        .and_then(|i| self.tool_calls.get_mut(i))
                    {
                        call.args_chunks
                            .get_or_insert_with(Vec::new)
                            .push(chunk.args.clone());
                    }
                }
            }
        }
    }

    fn finish(&mut self, reason: &str) {
        self.finish_reason = Some(reason.to_string());
        self.is_streaming = false;
        self.streaming_call = None;
        for call in &mut self.tool_calls {
            if let Some(chunks) = call.args_chunks.take() {
                let raw = chunks.concat();
                if raw.trim().is_empty() {
                    continue;
                }
                match json::parse_lenient(&raw) {
                    Some(args) => call.args = args,
                    None => log::warn!("Unparseable arguments for tool call {}", call.id),
                }
            }
        }
    }
}

/// Accumulates [`MergedMessage`]s from a stream of events
#[derive(Debug, Default)]
pub struct MessageMerger {
    order: Vec<String>,
    messages: HashMap<String, MergedMessage>,
}

impl MessageMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &StreamEvent) {
        if event.kind == EventKind::ToolCallResult {
            self.attach_result(event);
            return;
        }

        let id = event.data.id.clone();
        if !self.messages.contains_key(&id) {
            self.order.push(id.clone());
            self.messages.insert(id.clone(), MergedMessage::new(event));
        }
        let Some(message) = self.messages.get_mut(&id) else {
            return;
        };
        if message.is_terminated() {
            return;
        }

        match event.kind {
            EventKind::MessageChunk | EventKind::Error => {
                if !event.data.content.is_empty() {
                    message.content.push_str(&event.data.content);
                    message.content_chunks.push(event.data.content.clone());
                }
            }
            EventKind::ToolCalls | EventKind::ToolCallChunks => message.merge_tool_calls(event),
            EventKind::Interrupt => {
                message.content = event.data.content.clone();
                message.is_streaming = false;
                message.options = event.data.options.clone();
            }
            EventKind::ToolCallResult => {}
        }

        if let Some(reason) = &event.data.finish_reason {
            message.finish(reason);
        }
    }

    /// Attach a result to the call it answers, wherever that call lives
    fn attach_result(&mut self, event: &StreamEvent) {
        let Some(call_id) = event.data.tool_call_id.as_deref() else {
            return;
        };
        for id in &self.order {
            if let Some(message) = self.messages.get_mut(id) {
                if let Some(call) = message.tool_calls.iter_mut().find(|c| c.id == call_id) {
                    call.result = Some(event.data.content.clone());
                    return;
                }
            }
        }

        // Result for a call we never saw: keep it as its own message
        if !self.messages.contains_key(&event.data.id) {
            let mut message = MergedMessage::new(event);
            message.content = event.data.content.clone();
            message.is_streaming = false;
            self.order.push(event.data.id.clone());
            self.messages.insert(event.data.id.clone(), message);
        }
    }

    pub fn get(&self, id: &str) -> Option<&MergedMessage> {
        self.messages.get(id)
    }

    /// Messages in first-seen order
    pub fn messages(&self) -> Vec<&MergedMessage> {
        self.order
            .iter()
            .filter_map(|id| self.messages.get(id))
            .collect()
    }

    pub fn into_messages(mut self) -> Vec<MergedMessage> {
        self.order
            .iter()
            .filter_map(|id| self.messages.remove(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drain `rx` on a separate task; the handle yields the merged result
    pub fn consume(mut rx: mpsc::Receiver<StreamEvent>) -> JoinHandle<MessageMerger> {
        tokio::spawn(async move {
            let mut merger = MessageMerger::new();
            while let Some(event) = rx.recv().await {
                merger.push(&event);
            }
            merger
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deepflow::stream::event::{EventData, WireToolCall, WireToolCallChunk};
    use serde_json::json;

    fn data(id: &str) -> EventData {
        EventData {
            thread_id: "t1".into(),
            id: id.into(),
            agent: Some("researcher".into()),
            role: "assistant".into(),
            ..Default::default()
        }
    }

    fn text(id: &str, content: &str) -> StreamEvent {
        let mut d = data(id);
        d.content = content.into();
        StreamEvent::new(EventKind::MessageChunk, d)
    }

    fn finish(id: &str, reason: &str) -> StreamEvent {
        let mut d = data(id);
        d.finish_reason = Some(reason.into());
        StreamEvent::new(EventKind::MessageChunk, d)
    }

    fn call_start(id: &str, call_id: &str, calls: &[&str]) -> StreamEvent {
        let mut d = data(id);
        d.tool_calls = Some(
            calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.to_string(),
                    name: "web_search".into(),
                    args: json!({}),
                })
                .collect(),
        );
        d.tool_call_chunks = Some(vec![WireToolCallChunk {
            id: Some(call_id.into()),
            name: Some("web_search".into()),
            args: String::new(),
            index: 0,
        }]);
        StreamEvent::new(EventKind::ToolCalls, d)
    }

    fn call_chunk(id: &str, args: &str) -> StreamEvent {
        let mut d = data(id);
        d.tool_call_chunks = Some(vec![WireToolCallChunk {
            id: None,
            name: None,
            args: args.into(),
            index: 0,
        }]);
        StreamEvent::new(EventKind::ToolCallChunks, d)
    }

    #[test]
    fn test_text_chunks_concatenate() {
        let mut merger = MessageMerger::new();
        merger.push(&text("m1", "Hello, "));
        merger.push(&text("m1", "world"));
        merger.push(&finish("m1", "stop"));

        let msg = merger.get("m1").unwrap();
        assert_eq!(msg.content, "Hello, world");
        assert_eq!(msg.content_chunks, vec!["Hello, ", "world"]);
        assert!(!msg.is_streaming);
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let mut merger = MessageMerger::new();
        merger.push(&text("b", "1"));
        merger.push(&text("a", "2"));
        merger.push(&text("b", "3"));
        let ids: Vec<&str> = merger.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_tool_call_args_parsed_at_finish() {
        let mut merger = MessageMerger::new();
        merger.push(&call_start("m1", "c1", &["c1"]));
        merger.push(&call_chunk("m1", "{\"query\": "));
        merger.push(&call_chunk("m1", "\"rust\"}"));

        assert!(merger.get("m1").unwrap().tool_calls[0]
            .args_chunks
            .is_some());

        merger.push(&finish("m1", "tool_calls"));
        let call = &merger.get("m1").unwrap().tool_calls[0];
        assert_eq!(call.args, json!({"query": "rust"}));
        assert!(call.args_chunks.is_none());
    }

    #[test]
    fn test_id_less_chunks_go_to_latest_started_call() {
        let mut merger = MessageMerger::new();
        merger.push(&call_start("m1", "c1", &["c1"]));
        merger.push(&call_chunk("m1", "{\"query\": \"a\"}"));
        merger.push(&call_start("m1", "c2", &["c1", "c2"]));
        merger.push(&call_chunk("m1", "{\"query\": \"b\"}"));
        merger.push(&finish("m1", "tool_calls"));

        let calls = &merger.get("m1").unwrap().tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, json!({"query": "a"}));
        assert_eq!(calls[1].args, json!({"query": "b"}));
    }

    #[test]
    fn test_truncated_args_are_repaired() {
        let mut merger = MessageMerger::new();
        merger.push(&call_start("m1", "c1", &["c1"]));
        merger.push(&call_chunk("m1", "{\"query\": \"ru"));
        merger.push(&finish("m1", "tool_calls"));
        assert_eq!(
            merger.get("m1").unwrap().tool_calls[0].args,
            json!({"query": "ru"})
        );
    }

    #[test]
    fn test_tool_result_attaches_to_owning_call() {
        let mut merger = MessageMerger::new();
        merger.push(&call_start("m1", "c1", &["c1"]));
        merger.push(&finish("m1", "tool_calls"));

        let mut d = data("r1");
        d.role = "tool".into();
        d.content = "3 results".into();
        d.tool_call_id = Some("c1".into());
        merger.push(&StreamEvent::new(EventKind::ToolCallResult, d));

        assert_eq!(merger.len(), 1);
        assert_eq!(
            merger.get("m1").unwrap().tool_calls[0].result.as_deref(),
            Some("3 results")
        );
    }

    #[test]
    fn test_interrupt_sets_options() {
        let mut merger = MessageMerger::new();
        let mut d = data("i1");
        d.content = "Please Review the Plan.".into();
        d.finish_reason = Some("interrupt".into());
        d.options = Some(vec![InterruptOption::new("Start research", "accepted")]);
        merger.push(&StreamEvent::new(EventKind::Interrupt, d));

        let msg = merger.get("i1").unwrap();
        assert!(!msg.is_streaming);
        assert_eq!(msg.finish_reason.as_deref(), Some("interrupt"));
        assert_eq!(msg.options.as_ref().unwrap()[0].value, "accepted");
    }

    #[test]
    fn test_replay_after_finish_is_ignored() {
        let events = vec![text("m1", "abc"), finish("m1", "stop")];
        let mut merger = MessageMerger::new();
        for e in events.iter().chain(events.iter()) {
            merger.push(e);
        }
        assert_eq!(merger.get("m1").unwrap().content, "abc");
    }

    #[tokio::test]
    async fn test_consume_drains_channel() {
        let (tx, rx) = mpsc::channel(8);
        let handle = MessageMerger::consume(rx);
        tx.send(text("m1", "x")).await.unwrap();
        tx.send(finish("m1", "stop")).await.unwrap();
        drop(tx);

        let merger = handle.await.unwrap();
        assert_eq!(merger.into_messages()[0].content, "x");
    }
}
