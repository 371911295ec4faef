// SPDX-License-Identifier: MIT

//! Entry node: answers small talk itself, hands research requests to the planner

use super::{conversation, next_message_id, prompts};
use crate::adk::agent::stream_turn;
use crate::adk::error::DeepflowError;
use crate::adk::model::{Content, Model};
use crate::adk::tool::Tool;
use crate::deepflow::graph::{Command, Goto, Node, NodeName, NodeOutcome, RunContext};
use crate::deepflow::state::{Message, State, StateDelta};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;

pub const HANDOFF_TOOL_NAME: &str = "handoff_to_planner";

static HANDOFF_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "task_title": {
                "type": "string",
                "description": "The title of the task to be handed off."
            },
            "locale": {
                "type": "string",
                "description": "The user's detected language locale (e.g. en-US, zh-CN)."
            }
        },
        "required": ["task_title", "locale"]
    })
});

/// Signal-only tool: the coordinator never executes it, the call itself is the handoff
struct HandoffToPlanner;

#[async_trait]
impl Tool for HandoffToPlanner {
    fn name(&self) -> &str {
        HANDOFF_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Handoff to planner agent to do plan."
    }

    fn schema(&self) -> &Value {
        &HANDOFF_SCHEMA
    }

    async fn execute(&self, _input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        Ok(json!({}))
    }
}

pub struct CoordinatorNode {
    model: Arc<dyn Model>,
    tools: Vec<Arc<dyn Tool>>,
}

impl CoordinatorNode {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            tools: vec![Arc::new(HandoffToPlanner)],
        }
    }
}

#[async_trait]
impl Node for CoordinatorNode {
    fn name(&self) -> NodeName {
        NodeName::Coordinator
    }

    async fn run(&self, state: &State, ctx: &RunContext) -> Result<NodeOutcome, DeepflowError> {
        log::info!("Coordinator talking");
        let mut history = vec![Content::system(prompts::coordinator(&state.locale))];
        history.extend(conversation(state));

        let model = self.model.as_ref();
        let tools = self.tools.as_slice();
        let history = &history;
        let response = ctx
            .emitter
            .relay("coordinator", |tx| async move {
                stream_turn(model, history, None, Some(tools), Some(&tx)).await
            })
            .await?;

        let mut delta = StateDelta::new();
        if !ctx.config.resources.is_empty() {
            delta.resources = Some(ctx.config.resources.clone());
        }

        let calls = response.function_calls();
        if calls.is_empty() {
            log::warn!("Coordinator response contains no tool calls, ending the run");
            let reply = response.text_content();
            log::debug!("Coordinator response: {}", reply);
            let message = Message::assistant(reply)
                .with_name("coordinator")
                .with_id(next_message_id(state, ctx, "coordinator"));
            return Ok(Command::end().with_update(delta.message(message)).into());
        }

        let locale = calls
            .iter()
            .filter(|(_, name, _)| *name == HANDOFF_TOOL_NAME)
            .find_map(|(_, _, args)| args.get("locale").and_then(Value::as_str))
            .filter(|l| !l.is_empty())
            .unwrap_or(state.locale.as_str());
        delta = delta.locale(locale);

        let goto = if state.enable_background_investigation {
            NodeName::BackgroundInvestigator
        } else {
            NodeName::Planner
        };
        log::info!("Coordinator hands off to {} (locale {})", goto, locale);
        Ok(Command::goto(Goto::Node(goto)).with_update(delta).into())
    }
}
