// SPDX-License-Identifier: MIT

//! Graph model: node names, routing table, and the node contract
//!
//! The topology is fixed at compile time. Every node returns a [`Command`]
//! naming its successor; the router rejects any successor not listed in
//! [`NodeName::edges`].

mod executor;
mod registry;

pub use executor::{RunOptions, RunOutcome, Workflow};
pub use registry::NodeRegistry;

use crate::adk::error::{DeepflowError, WorkflowError};
use crate::deepflow::config::RunConfig;
use crate::deepflow::interrupt::InterruptRequest;
use crate::deepflow::state::{State, StateDelta};
use crate::deepflow::stream::EventEmitter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    Coordinator,
    BackgroundInvestigator,
    Planner,
    HumanFeedback,
    ResearchTeam,
    Researcher,
    Coder,
    Reporter,
}

impl NodeName {
    pub const ALL: [NodeName; 8] = [
        NodeName::Coordinator,
        NodeName::BackgroundInvestigator,
        NodeName::Planner,
        NodeName::HumanFeedback,
        NodeName::ResearchTeam,
        NodeName::Researcher,
        NodeName::Coder,
        NodeName::Reporter,
    ];

    /// Where every run starts
    pub const ENTRY: NodeName = NodeName::Coordinator;

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeName::Coordinator => "coordinator",
            NodeName::BackgroundInvestigator => "background_investigator",
            NodeName::Planner => "planner",
            NodeName::HumanFeedback => "human_feedback",
            NodeName::ResearchTeam => "research_team",
            NodeName::Researcher => "researcher",
            NodeName::Coder => "coder",
            NodeName::Reporter => "reporter",
        }
    }

    /// Declared successors of this node
    pub fn edges(&self) -> &'static [Goto] {
        use Goto::{End, Node};
        use NodeName::*;
        match self {
            Coordinator => &[Node(Planner), Node(BackgroundInvestigator), End],
            BackgroundInvestigator => &[Node(Planner)],
            Planner => &[Node(Reporter), Node(HumanFeedback)],
            HumanFeedback => &[Node(Planner), Node(ResearchTeam), Node(Reporter), End],
            ResearchTeam => &[Node(Researcher), Node(Coder), Node(Planner)],
            Researcher => &[Node(ResearchTeam)],
            Coder => &[Node(ResearchTeam)],
            Reporter => &[End],
        }
    }

    /// Check a transition against the routing table
    pub fn check_edge(&self, goto: Goto) -> Result<(), WorkflowError> {
        if self.edges().contains(&goto) {
            Ok(())
        } else {
            Err(WorkflowError::UndeclaredEdge {
                from: self.to_string(),
                to: goto.to_string(),
            })
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing target of a [`Command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goto {
    Node(NodeName),
    End,
}

impl fmt::Display for Goto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goto::Node(n) => write!(f, "{}", n),
            Goto::End => f.write_str("__end__"),
        }
    }
}

impl From<NodeName> for Goto {
    fn from(name: NodeName) -> Self {
        Goto::Node(name)
    }
}

/// A state delta plus the next node
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub update: StateDelta,
    pub goto: Goto,
}

impl Command {
    pub fn goto(goto: impl Into<Goto>) -> Self {
        Self {
            update: StateDelta::default(),
            goto: goto.into(),
        }
    }

    pub fn end() -> Self {
        Self::goto(Goto::End)
    }

    pub fn with_update(mut self, update: StateDelta) -> Self {
        self.update = update;
        self
    }
}

/// What a node's `run` produced
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Command(Command),
    /// Suspend the run until the user answers
    Interrupt(InterruptRequest),
}

impl From<Command> for NodeOutcome {
    fn from(cmd: Command) -> Self {
        NodeOutcome::Command(cmd)
    }
}

/// Cooperative cancellation, checked by the router between nodes
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run context handed to every node
#[derive(Clone)]
pub struct RunContext {
    pub thread_id: String,
    pub config: RunConfig,
    pub emitter: EventEmitter,
    pub cancel: CancelFlag,
}

#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> NodeName;

    async fn run(&self, state: &State, ctx: &RunContext) -> Result<NodeOutcome, DeepflowError>;

    /// Continue after an interrupt with the user's feedback
    async fn resume(
        &self,
        _state: &State,
        _ctx: &RunContext,
        _feedback: &str,
    ) -> Result<Command, DeepflowError> {
        Err(WorkflowError::NotResumable(self.name().to_string()).into())
    }
}
