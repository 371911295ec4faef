// SPDX-License-Identifier: MIT

//! Built-in tools and the registry agents draw their tool sets from

mod crawl;
mod search;

pub use crawl::{CrawlTool, CRAWL_TOOL};
pub use search::{SearchHit, WebSearchTool, WEB_SEARCH_TOOL};

use crate::adk::tool::{Tool, ToolSet};
use crate::deepflow::config::AppConfig;
use crate::deepflow::nodes::AgentTools;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools that can be constructed in this environment
    pub async fn builtin(config: &AppConfig) -> Self {
        let registry = Self::new();
        let timeout = config.request_timeout();

        match WebSearchTool::from_env(timeout) {
            Ok(tool) => registry.register(Arc::new(tool)).await,
            Err(e) => log::warn!("web_search unavailable: {}", e),
        }
        match CrawlTool::new(timeout) {
            Ok(tool) => registry.register(Arc::new(tool)).await,
            Err(e) => log::warn!("crawl unavailable: {}", e),
        }
        registry
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        tools.insert(tool.name().to_string(), tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Tool set for `names`, skipping names that are not registered
    pub async fn collect(&self, names: &[String]) -> ToolSet {
        let tools = self.tools.read().await;
        let mut set = ToolSet::default();
        for name in names {
            match tools.get(name) {
                Some(tool) => set.push(tool.clone()),
                None => log::warn!("Tool '{}' is not registered", name),
            }
        }
        set
    }

    /// Per-agent tool sets from the configured names plus `extra` tools
    /// (e.g. MCP tools) keyed by agent name
    pub async fn agent_tools(
        &self,
        config: &AppConfig,
        extra: &HashMap<String, Vec<Arc<dyn Tool>>>,
    ) -> AgentTools {
        let mut researcher = self.collect(&config.tools_for("researcher")).await;
        let mut coder = self.collect(&config.tools_for("coder")).await;
        for (agent, set) in [("researcher", &mut researcher), ("coder", &mut coder)] {
            for tool in extra.get(agent).into_iter().flatten() {
                set.push(tool.clone());
            }
            log::info!("{} tools: {:?}", agent, set.names());
        }

        AgentTools {
            background_search: self.get(WEB_SEARCH_TOOL).await,
            researcher,
            coder,
        }
    }
}
