// SPDX-License-Identifier: MIT

//! MCP (Model Context Protocol) servers as tool providers
//!
//! Each configured server is started as a child process speaking MCP over
//! stdio. Its tools, optionally filtered by `enabled_tools`, are offered to
//! the agents named in `add_to_agents`.

mod manager;
mod tool;

pub use manager::McpServiceManager;
pub use tool::McpTool;

use crate::adk::tool::Tool;
use crate::deepflow::config::McpServerConfig;
use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::{ClientHandler, ServiceExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;

const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct DeepflowClientHandler;

impl ClientHandler for DeepflowClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "deepflow-rs".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
        }
    }
}

/// A shared handle to a running MCP client session
pub type McpService = Arc<RwLock<RunningService<RoleClient, DeepflowClientHandler>>>;

/// Start the server process described by `config` and complete the MCP handshake
pub async fn create_mcp_service(
    config: &McpServerConfig,
) -> Result<RunningService<RoleClient, DeepflowClientHandler>, Box<dyn Error + Send + Sync>> {
    let mut server_cmd = Command::new(&config.command);
    server_cmd.args(&config.args).envs(&config.env);

    let transport = TokioChildProcess::new(server_cmd)?;
    let service = DeepflowClientHandler.serve(transport).await?;
    Ok(service)
}

/// Whether `config` exposes the tool called `name`
pub fn is_enabled(config: &McpServerConfig, name: &str) -> bool {
    match &config.enabled_tools {
        Some(enabled) => enabled.iter().any(|t| t == name),
        None => true,
    }
}

/// Start every server that feeds at least one agent and collect its tools per
/// agent. A server that fails to start is logged and skipped.
pub async fn load_agent_tools(
    manager: &McpServiceManager,
    servers: &HashMap<String, McpServerConfig>,
) -> HashMap<String, Vec<Arc<dyn Tool>>> {
    let mut by_agent: HashMap<String, Vec<Arc<dyn Tool>>> = HashMap::new();

    for (server, config) in servers {
        if config.add_to_agents.is_empty() {
            log::debug!("MCP server '{}' is not assigned to any agent", server);
            continue;
        }

        let tools = match load_server_tools(manager, server, config).await {
            Ok(tools) => tools,
            Err(e) => {
                log::warn!("Skipping MCP server '{}': {}", server, e);
                continue;
            }
        };

        for agent in &config.add_to_agents {
            by_agent
                .entry(agent.clone())
                .or_default()
                .extend(tools.iter().cloned());
        }
    }
    by_agent
}

async fn load_server_tools(
    manager: &McpServiceManager,
    server: &str,
    config: &McpServerConfig,
) -> Result<Vec<Arc<dyn Tool>>, Box<dyn Error + Send + Sync>> {
    let service = manager.get_or_create_service(server, config).await?;
    let listed = {
        let session = service.read().await;
        session.list_all_tools().await?
    };

    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
    for tool in listed {
        if !is_enabled(config, &tool.name) {
            continue;
        }
        let description = tool.description.as_deref().unwrap_or_default().to_string();
        let schema = Value::Object(tool.input_schema.as_ref().clone());
        log::info!("Loaded MCP tool {} from {}", tool.name, server);
        tools.push(Arc::new(McpTool::new(
            service.clone(),
            server,
            tool.name.to_string(),
            &description,
            schema,
        )));
    }
    Ok(tools)
}

/// Ad-hoc server to inspect, as posted by a client configuring MCP
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerMetadataRequest {
    pub transport: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct McpServerMetadataResponse {
    pub transport: String,
    pub command: String,
    pub args: Vec<String>,
    pub tools: Vec<McpToolInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Only the stdio transport is supported, got '{0}'")]
    UnsupportedTransport(String),

    #[error("'command' is required for the stdio transport")]
    MissingCommand,

    #[error("MCP server did not answer within {0}s")]
    Timeout(u64),

    #[error("MCP server failed: {0}")]
    Server(String),
}

impl MetadataError {
    /// Whether the request itself was at fault
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            MetadataError::UnsupportedTransport(_) | MetadataError::MissingCommand
        )
    }
}

impl McpServerMetadataRequest {
    pub fn server_config(&self) -> Result<McpServerConfig, MetadataError> {
        if self.transport != "stdio" {
            return Err(MetadataError::UnsupportedTransport(self.transport.clone()));
        }
        let command = self
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(MetadataError::MissingCommand)?;
        Ok(McpServerConfig {
            command: command.to_string(),
            args: self.args.clone(),
            env: self.env.clone(),
            ..Default::default()
        })
    }
}

/// Start the requested server, list its tools and shut it down again
pub async fn server_metadata(
    request: &McpServerMetadataRequest,
) -> Result<McpServerMetadataResponse, MetadataError> {
    let config = request.server_config()?;
    let secs = request
        .timeout_seconds
        .unwrap_or(DEFAULT_METADATA_TIMEOUT_SECS);
    log::info!("Getting MCP server metadata for {}", config.command);

    let listing = async {
        let service = create_mcp_service(&config).await?;
        let tools = service.list_all_tools().await?;
        if let Err(e) = service.cancel().await {
            log::warn!("MCP server {} did not shut down cleanly: {}", config.command, e);
        }
        Ok::<_, Box<dyn Error + Send + Sync>>(tools)
    };
    let listed = tokio::time::timeout(Duration::from_secs(secs), listing)
        .await
        .map_err(|_| MetadataError::Timeout(secs))?
        .map_err(|e| MetadataError::Server(e.to_string()))?;

    let tools = listed
        .into_iter()
        .map(|tool| McpToolInfo {
            name: tool.name.to_string(),
            description: tool.description.as_deref().unwrap_or_default().to_string(),
            input_schema: Value::Object(tool.input_schema.as_ref().clone()),
        })
        .collect();

    Ok(McpServerMetadataResponse {
        transport: request.transport.clone(),
        command: config.command,
        args: config.args,
        tools,
    })
}
