// SPDX-License-Identifier: MIT

//! Workflow nodes and the factory that wires them into a registry

mod agent_step;
mod background;
mod coordinator;
mod human_feedback;
mod planner;
pub mod prompts;
mod reporter;
mod research_team;

pub use agent_step::{AgentKind, AgentStepNode};
pub use background::BackgroundInvestigatorNode;
pub use coordinator::{CoordinatorNode, HANDOFF_TOOL_NAME};
pub use human_feedback::HumanFeedbackNode;
pub use planner::PlannerNode;
pub use reporter::ReporterNode;
pub use research_team::{schedule, ResearchTeamNode};

use crate::adk::error::{DeepflowError, WorkflowError};
use crate::adk::model::{Content, Model};
use crate::adk::tool::{Tool, ToolSet};
use crate::deepflow::config::{AppConfig, LlmType};
use crate::deepflow::graph::{Node, NodeRegistry, RunContext};
use crate::deepflow::state::{Role, State};
use std::collections::HashMap;
use std::sync::Arc;

/// Model used by each LLM-backed node
#[derive(Clone)]
pub struct AgentModels {
    pub coordinator: Arc<dyn Model>,
    pub planner: Arc<dyn Model>,
    pub researcher: Arc<dyn Model>,
    pub coder: Arc<dyn Model>,
    pub reporter: Arc<dyn Model>,
}

impl AgentModels {
    /// The same model for every agent
    pub fn uniform(model: Arc<dyn Model>) -> Self {
        Self {
            coordinator: model.clone(),
            planner: model.clone(),
            researcher: model.clone(),
            coder: model.clone(),
            reporter: model,
        }
    }

    /// Build one client per LLM type in use, following the agent map
    pub fn from_config(config: &AppConfig) -> Result<Self, DeepflowError> {
        let mut cache: HashMap<LlmType, Arc<dyn Model>> = HashMap::new();
        let mut model_for = |agent: &str| -> Result<Arc<dyn Model>, DeepflowError> {
            let llm = config.llm_type_for(agent);
            if let Some(model) = cache.get(&llm) {
                return Ok(model.clone());
            }
            let model: Arc<dyn Model> = Arc::new(config.build_model(llm)?);
            log::info!("Built {:?} model for agent {}", llm, agent);
            cache.insert(llm, model.clone());
            Ok(model)
        };

        Ok(Self {
            coordinator: model_for("coordinator")?,
            planner: model_for("planner")?,
            researcher: model_for("researcher")?,
            coder: model_for("coder")?,
            reporter: model_for("reporter")?,
        })
    }
}

/// Tools available to the nodes
#[derive(Clone, Default)]
pub struct AgentTools {
    /// Search used by the background investigator
    pub background_search: Option<Arc<dyn Tool>>,
    pub researcher: ToolSet,
    pub coder: ToolSet,
}

/// Assemble the full node set into a validated registry
pub fn build_registry(
    models: &AgentModels,
    tools: &AgentTools,
) -> Result<NodeRegistry, WorkflowError> {
    let nodes: Vec<Arc<dyn Node>> = vec![
        Arc::new(CoordinatorNode::new(models.coordinator.clone())),
        Arc::new(BackgroundInvestigatorNode::new(
            tools.background_search.clone(),
        )),
        Arc::new(PlannerNode::new(models.planner.clone())),
        Arc::new(HumanFeedbackNode),
        Arc::new(ResearchTeamNode),
        Arc::new(AgentStepNode::new(
            AgentKind::Researcher,
            models.researcher.clone(),
            tools.researcher.clone(),
        )),
        Arc::new(AgentStepNode::new(
            AgentKind::Coder,
            models.coder.clone(),
            tools.coder.clone(),
        )),
        Arc::new(ReporterNode::new(models.reporter.clone())),
    ];
    NodeRegistry::from_nodes(nodes)
}

/// The state's conversation as model input
pub(crate) fn conversation(state: &State) -> Vec<Content> {
    state
        .messages
        .iter()
        .map(|m| match m.role {
            Role::System => Content::system(m.content.clone()),
            Role::Assistant => Content::model(m.content.clone()),
            Role::User | Role::Tool => Content::user(m.content.clone()),
        })
        .collect()
}

/// Id for the next message a node appends. Derived from the thread and the
/// message count so replaying a resume produces the same ids.
pub(crate) fn next_message_id(state: &State, ctx: &RunContext, agent: &str) -> String {
    format!("{}-{}-{}", ctx.thread_id, agent, state.messages.len())
}
