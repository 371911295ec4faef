// SPDX-License-Identifier: MIT

use super::{create_mcp_service, McpService};
use crate::deepflow::config::McpServerConfig;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Running MCP services keyed by server name
#[derive(Clone, Default)]
pub struct McpServiceManager {
    services: Arc<RwLock<HashMap<String, McpService>>>,
}

impl McpServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the running service for `name`, starting it from `config` if needed
    pub async fn get_or_create_service(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> Result<McpService, Box<dyn Error + Send + Sync>> {
        {
            let services = self.services.read().await;
            if let Some(service) = services.get(name) {
                return Ok(service.clone());
            }
        }

        log::info!(
            "Creating MCP service '{}' with command: {} {:?}",
            name,
            config.command,
            config.args
        );
        let service = Arc::new(RwLock::new(create_mcp_service(config).await?));

        let mut services = self.services.write().await;
        // Another task may have started the same server meanwhile; keep the first
        let service = services
            .entry(name.to_string())
            .or_insert(service)
            .clone();
        Ok(service)
    }

    pub async fn get_service(&self, name: &str) -> Option<McpService> {
        let services = self.services.read().await;
        services.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
