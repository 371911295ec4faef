// SPDX-License-Identifier: MIT

//! Plan review: suspends the run until the user accepts or revises the plan

use crate::adk::error::{DeepflowError, WorkflowError};
use crate::deepflow::graph::{Command, Node, NodeName, NodeOutcome, RunContext};
use crate::deepflow::interrupt::{Feedback, InterruptRequest};
use crate::deepflow::state::{Message, State, StateDelta};
use async_trait::async_trait;

pub struct HumanFeedbackNode;

impl HumanFeedbackNode {
    fn accept(state: &State) -> Result<Command, DeepflowError> {
        let plan = state
            .current_plan
            .as_ref()
            .ok_or_else(|| WorkflowError::InvalidPlan("no plan to accept".to_string()))?;
        plan.validate().map_err(WorkflowError::InvalidPlan)?;

        let goto = if plan.has_enough_context || plan.steps.is_empty() {
            NodeName::Reporter
        } else {
            NodeName::ResearchTeam
        };
        let delta = StateDelta::new()
            .plan(plan.clone())
            .plan_iterations(state.plan_iterations + 1)
            .locale(plan.locale.clone());
        Ok(Command::goto(goto).with_update(delta))
    }
}

#[async_trait]
impl Node for HumanFeedbackNode {
    fn name(&self) -> NodeName {
        NodeName::HumanFeedback
    }

    async fn run(&self, state: &State, _ctx: &RunContext) -> Result<NodeOutcome, DeepflowError> {
        if state.auto_accepted_plan {
            log::info!("Plan is auto-accepted");
            return Ok(Self::accept(state)?.into());
        }
        Ok(NodeOutcome::Interrupt(InterruptRequest::plan_review()))
    }

    async fn resume(
        &self,
        state: &State,
        ctx: &RunContext,
        feedback: &str,
    ) -> Result<Command, DeepflowError> {
        match Feedback::parse(feedback)? {
            Feedback::EditPlan(text) => {
                log::info!("Plan revision requested");
                let id = format!("{}-feedback-{}", ctx.thread_id, state.messages.len());
                let message = Message::user(text).with_name("feedback").with_id(id);
                Ok(Command::goto(NodeName::Planner).with_update(StateDelta::new().message(message)))
            }
            Feedback::Accepted => {
                log::info!("Plan is accepted by user");
                Self::accept(state)
            }
        }
    }
}
