// SPDX-License-Identifier: MIT

use super::{Node, NodeName};
use crate::adk::error::WorkflowError;
use std::collections::HashMap;
use std::sync::Arc;

/// One implementation per [`NodeName`], checked when built
#[derive(Clone)]
pub struct NodeRegistry {
    nodes: Arc<HashMap<NodeName, Arc<dyn Node>>>,
}

impl NodeRegistry {
    /// Build from `(slot, implementation)` pairs. Every slot must be filled
    /// exactly once by a node that reports the slot's name.
    pub fn build(entries: Vec<(NodeName, Arc<dyn Node>)>) -> Result<Self, WorkflowError> {
        let mut nodes = HashMap::new();
        for (slot, node) in entries {
            if node.name() != slot {
                return Err(WorkflowError::NodeMismatch {
                    slot: slot.to_string(),
                    actual: node.name().to_string(),
                });
            }
            if nodes.insert(slot, node).is_some() {
                return Err(WorkflowError::DuplicateNode(slot.to_string()));
            }
        }

        if let Some(missing) = NodeName::ALL.iter().find(|n| !nodes.contains_key(*n)) {
            return Err(WorkflowError::MissingNode(missing.to_string()));
        }

        Ok(Self {
            nodes: Arc::new(nodes),
        })
    }

    /// Build from implementations, using each node's own name as its slot
    pub fn from_nodes(nodes: Vec<Arc<dyn Node>>) -> Result<Self, WorkflowError> {
        Self::build(nodes.into_iter().map(|n| (n.name(), n)).collect())
    }

    pub fn get(&self, name: NodeName) -> Result<&Arc<dyn Node>, WorkflowError> {
        self.nodes
            .get(&name)
            .ok_or_else(|| WorkflowError::MissingNode(name.to_string()))
    }
}
