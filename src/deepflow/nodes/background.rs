// SPDX-License-Identifier: MIT

//! Searches the web for the user's query before planning

use crate::adk::error::DeepflowError;
use crate::adk::tool::Tool;
use crate::deepflow::graph::{Command, Node, NodeName, NodeOutcome, RunContext};
use crate::deepflow::state::{State, StateDelta};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct BackgroundInvestigatorNode {
    search: Option<Arc<dyn Tool>>,
}

impl BackgroundInvestigatorNode {
    pub fn new(search: Option<Arc<dyn Tool>>) -> Self {
        Self { search }
    }
}

/// Reduce search hits to `[{title, content}]`; anything else is kept as-is
fn summarize_hits(results: Value) -> Value {
    match results {
        Value::Array(hits) => Value::Array(
            hits.into_iter()
                .map(|hit| {
                    json!({
                        "title": hit.get("title").cloned().unwrap_or(Value::Null),
                        "content": hit.get("content").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect(),
        ),
        other => other,
    }
}

#[async_trait]
impl Node for BackgroundInvestigatorNode {
    fn name(&self) -> NodeName {
        NodeName::BackgroundInvestigator
    }

    async fn run(&self, state: &State, ctx: &RunContext) -> Result<NodeOutcome, DeepflowError> {
        log::info!("Background investigation node is running");
        let Some(query) = state.messages.last().map(|m| m.content.clone()) else {
            return Ok(Command::goto(NodeName::Planner).into());
        };

        let results = match &self.search {
            Some(search) => {
                let input = json!({
                    "query": query,
                    "max_results": ctx.config.max_search_results,
                });
                match search.execute(input).await {
                    Ok(results) => Some(summarize_hits(results).to_string()),
                    Err(e) => {
                        log::error!("Error during background investigation: {}", e);
                        None
                    }
                }
            }
            None => {
                log::warn!("No search tool available for background investigation");
                None
            }
        };

        Ok(Command::goto(NodeName::Planner)
            .with_update(StateDelta::new().background_results(results))
            .into())
    }
}
