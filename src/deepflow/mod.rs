// SPDX-License-Identifier: MIT

//! The deep-research workflow: state, graph, nodes and their surroundings

pub mod checkpoint;
pub mod config;
pub mod graph;
pub mod interrupt;
pub mod json;
pub mod mcp;
pub mod nodes;
pub mod plan;
pub mod server;
pub mod state;
pub mod stream;
pub mod tools;

use crate::adk::error::DeepflowError;
use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use config::AppConfig;
use graph::Workflow;
use mcp::McpServiceManager;
use nodes::{build_registry, AgentModels};
use std::sync::Arc;
use tools::ToolRegistry;

/// Assemble the production workflow described by `config`: one model client
/// per LLM type, built-in and MCP tools, and a file or in-memory checkpoint
/// store.
pub async fn build_workflow(config: &AppConfig) -> Result<Workflow, DeepflowError> {
    let models = AgentModels::from_config(config)?;

    let registry = ToolRegistry::builtin(config).await;
    let manager = McpServiceManager::new();
    let mcp_tools = mcp::load_agent_tools(&manager, &config.mcp_servers).await;
    let tools = registry.agent_tools(config, &mcp_tools).await;

    let nodes = build_registry(&models, &tools)?;
    let checkpoints: Arc<dyn CheckpointStore> = match &config.checkpoint_dir {
        Some(dir) => {
            log::info!("Checkpoints stored in {}", dir.display());
            Arc::new(FileCheckpointStore::new(dir))
        }
        None => Arc::new(MemoryCheckpointStore::new()),
    };
    Ok(Workflow::new(nodes, checkpoints))
}
