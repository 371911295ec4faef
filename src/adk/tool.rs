// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

/// Trait for tools that can be called by agents.
///
/// `name()`, `description()` and `schema()` return borrowed data; implementations
/// store these values in struct fields or statics.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (must be unique within an agent's tool set)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input parameters
    fn schema(&self) -> &Value;

    /// Execute the tool with the given input and return the result
    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>>;
}

/// A requested tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Outcome of a tool invocation. Failures are carried as content, never as errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub id: String,
    pub name: String,
    pub result: Value,
    pub failed: bool,
}

/// An ordered set of tools with O(1) name lookup
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut set = Self::default();
        for tool in tools {
            set.push(tool);
        }
        set
    }

    /// Add a tool; a tool with the same name replaces the earlier one
    pub fn push(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn as_slice(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run one tool call, converting failures into `{"error": ...}` content
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (result, failed) = match self.get(&call.name) {
            Some(tool) => match tool.execute(call.args.clone()).await {
                Ok(res) => (res, false),
                Err(e) => {
                    log::warn!("Tool {} failed: {}", call.name, e);
                    (json!({ "error": e.to_string() }), true)
                }
            },
            None => {
                log::warn!("Tool {} not found", call.name);
                (
                    json!({ "error": format!("Tool {} not found", call.name) }),
                    true,
                )
            }
        };

        ToolOutput {
            id: call.id.clone(),
            name: call.name.clone(),
            result,
            failed,
        }
    }

    /// Run calls concurrently; all complete before this returns. Output order matches input.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolOutput> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }
}
