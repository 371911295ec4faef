// SPDX-License-Identifier: MIT

//! Produces the research plan as structured output

use super::{conversation, next_message_id, prompts};
use crate::adk::error::{DeepflowError, ModelError};
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::deepflow::graph::{Command, Node, NodeName, NodeOutcome, RunContext};
use crate::deepflow::plan::{parse_plan, ParseQuality, PLAN_SCHEMA};
use crate::deepflow::state::{Message, State, StateDelta};
use async_trait::async_trait;
use std::sync::Arc;

pub struct PlannerNode {
    model: Arc<dyn Model>,
}

impl PlannerNode {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    fn messages(&self, state: &State, ctx: &RunContext) -> Vec<Content> {
        let mut history = vec![Content::system(prompts::planner(
            &state.locale,
            ctx.config.max_step_num,
        ))];
        history.extend(conversation(state));

        if state.plan_iterations == 0 && state.enable_background_investigation {
            if let Some(results) = &state.background_investigation_results {
                history.push(Content::user(format!(
                    "background investigation results of user query:\n{}\n",
                    results
                )));
            }
        }
        history
    }
}

#[async_trait]
impl Node for PlannerNode {
    fn name(&self) -> NodeName {
        NodeName::Planner
    }

    async fn run(&self, state: &State, ctx: &RunContext) -> Result<NodeOutcome, DeepflowError> {
        if state.plan_iterations >= ctx.config.max_plan_iterations {
            log::info!(
                "Plan iterations ({}) reached the limit, going to reporter",
                state.plan_iterations
            );
            return Ok(Command::goto(NodeName::Reporter).into());
        }

        log::info!("Planner generating full plan");
        let history = self.messages(state, ctx);
        let config = GenerationConfig::structured(PLAN_SCHEMA.clone());

        let raw = match self
            .model
            .generate_content(&history, Some(&config), None)
            .await
        {
            Ok(content) => content.text_content(),
            Err(ModelError::OutputParsing { raw }) => {
                log::warn!("Planner output is not valid JSON, repairing");
                raw
            }
            Err(e) => return Err(e.into()),
        };
        log::debug!("Planner raw output: {}", raw);

        let (mut plan, quality) = parse_plan(&raw);
        if quality != ParseQuality::Strict {
            log::warn!("Plan recovered with {:?} parsing", quality);
        }
        let dropped = plan.truncate_steps(ctx.config.max_step_num as usize);
        if dropped > 0 {
            log::warn!(
                "Plan exceeded {} steps, dropped {}",
                ctx.config.max_step_num,
                dropped
            );
        }

        let plan_json = plan.to_json_string();
        let id = next_message_id(state, ctx, "planner");
        ctx.emitter.message("planner", &id, &plan_json).await;

        let goto = if plan.has_enough_context {
            log::info!("Planner response has enough context");
            NodeName::Reporter
        } else {
            NodeName::HumanFeedback
        };

        let delta = StateDelta::new()
            .message(
                Message::assistant(plan_json)
                    .with_name("planner")
                    .with_id(id),
            )
            .plan(plan);
        Ok(Command::goto(goto).with_update(delta).into())
    }
}
