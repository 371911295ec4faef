// SPDX-License-Identifier: MIT

//! Executes the plan's next step with a tool-calling agent
//!
//! Researcher and coder share this node; they differ in prompt, tools, and
//! the extra researcher input (resources and citation reminder). A step that
//! exhausts its round budget is closed with a summary instead of failing.

use super::{next_message_id, prompts};
use crate::adk::agent::{AgentEvent, AgentRun, ToolAgent};
use crate::adk::error::{DeepflowError, ModelError};
use crate::adk::model::{Content, Model};
use crate::adk::tool::ToolSet;
use crate::deepflow::graph::{Command, Node, NodeName, NodeOutcome, RunContext};
use crate::deepflow::plan::Plan;
use crate::deepflow::state::{Message, State, StateDelta};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Researcher,
    Coder,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Researcher => "researcher",
            AgentKind::Coder => "coder",
        }
    }

    pub fn node(&self) -> NodeName {
        match self {
            AgentKind::Researcher => NodeName::Researcher,
            AgentKind::Coder => NodeName::Coder,
        }
    }

    fn instruction(&self, locale: &str) -> String {
        match self {
            AgentKind::Researcher => prompts::researcher(locale),
            AgentKind::Coder => prompts::coder(locale),
        }
    }
}

pub struct AgentStepNode {
    kind: AgentKind,
    model: Arc<dyn Model>,
    tools: ToolSet,
}

impl AgentStepNode {
    pub fn new(kind: AgentKind, model: Arc<dyn Model>, tools: ToolSet) -> Self {
        Self { kind, model, tools }
    }

    fn input(&self, state: &State, plan: &Plan, index: usize) -> Vec<Content> {
        let step = &plan.steps[index];
        let mut findings = String::new();
        let completed: Vec<_> = plan.steps.iter().filter(|s| s.is_executed()).collect();
        if !completed.is_empty() {
            findings.push_str("# Existing Research Findings\n\n");
            for (i, done) in completed.iter().enumerate() {
                findings.push_str(&format!(
                    "## Existing Finding {}: {}\n\n<finding>\n{}\n</finding>\n\n",
                    i + 1,
                    done.title,
                    done.execution_res.as_deref().unwrap_or_default()
                ));
            }
        }

        let mut input = vec![Content::user(format!(
            "{}# Current Task\n\n## Title\n\n{}\n\n## Description\n\n{}\n\n## Locale\n\n{}",
            findings, step.title, step.description, state.locale
        ))];

        if self.kind == AgentKind::Researcher {
            if !state.resources.is_empty() {
                let mut listing =
                    String::from("**The user mentioned the following resource files:**\n\n");
                for resource in &state.resources {
                    listing.push_str(&format!("- {} ({})\n", resource.title, resource.uri));
                }
                input.push(Content::user(listing));
            }
            input.push(Content::user(prompts::CITATION_REMINDER));
        }
        input
    }
}

/// Run the agent to an answer; on round exhaustion ask for a summary instead
async fn execute(
    agent: &ToolAgent,
    input: Vec<Content>,
    events: mpsc::Sender<AgentEvent>,
    step_title: &str,
) -> Result<String, ModelError> {
    match agent.run(input, Some(&events)).await? {
        AgentRun::Answered { answer, .. } => Ok(answer),
        AgentRun::RoundLimit { history, rounds } => {
            log::warn!(
                "{} hit the round limit ({}) on '{}', summarizing",
                agent.name,
                rounds,
                step_title
            );
            let summary = agent
                .summarize(&history, prompts::SUMMARIZE_FINDINGS, Some(&events))
                .await?;
            if summary.trim().is_empty() {
                Ok(format!(
                    "The {} stopped after {} rounds without reaching a conclusion for '{}'.",
                    agent.name, rounds, step_title
                ))
            } else {
                Ok(summary)
            }
        }
    }
}

#[async_trait]
impl Node for AgentStepNode {
    fn name(&self) -> NodeName {
        self.kind.node()
    }

    async fn run(&self, state: &State, ctx: &RunContext) -> Result<NodeOutcome, DeepflowError> {
        let agent_name = self.kind.as_str();
        let found = state
            .current_plan
            .as_ref()
            .and_then(|plan| plan.first_unexecuted().map(|i| (plan, i)));
        let Some((plan, index)) = found else {
            log::warn!("No unexecuted step found for {}", agent_name);
            return Ok(Command::goto(NodeName::ResearchTeam).into());
        };
        let step = &plan.steps[index];
        log::info!("Executing step: {}, agent: {}", step.title, agent_name);

        let agent = ToolAgent::new(
            agent_name,
            self.kind.instruction(&state.locale),
            self.model.clone(),
            self.tools.clone(),
            ctx.config.agent_recursion_limit,
        );
        let input = self.input(state, plan, index);
        log::debug!("{} input: {:?}", agent_name, input);

        let agent = &agent;
        let title = step.title.as_str();
        let result = ctx
            .emitter
            .relay(agent_name, |tx| execute(agent, input, tx, title))
            .await?;
        log::info!("Step '{}' execution completed by {}", step.title, agent_name);

        let mut observations = state.observations.clone();
        observations.push(result.clone());
        let message = Message::assistant(result.clone())
            .with_name(agent_name)
            .with_id(next_message_id(state, ctx, agent_name));

        let delta = StateDelta::new()
            .plan(plan.with_step_result(index, result))
            .observations(observations)
            .message(message);
        Ok(Command::goto(NodeName::ResearchTeam).with_update(delta).into())
    }
}
