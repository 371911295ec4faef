// SPDX-License-Identifier: MIT

use super::McpService;
use crate::adk::tool::Tool;
use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use serde_json::Value;
use std::error::Error;

/// A tool served by an MCP server, exposed through the [`Tool`] trait
pub struct McpTool {
    service: McpService,
    server: String,
    name: String,
    description: String,
    schema: Value,
}

impl McpTool {
    /// `description` is prefixed with the serving server's name
    pub fn new(
        service: McpService,
        server: impl Into<String>,
        name: impl Into<String>,
        description: &str,
        schema: Value,
    ) -> Self {
        let server = server.into();
        Self {
            description: powered_by(&server, description),
            service,
            server,
            name: name.into(),
            schema,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

pub(crate) fn powered_by(server: &str, description: &str) -> String {
    format!("Powered by '{}'.\n{}", server, description)
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &Value {
        &self.schema
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let service = self.service.read().await;

        let arguments = match input {
            Value::Object(map) => Some(map),
            _ => None,
        };

        log::debug!("Calling MCP tool {} on {}", self.name, self.server);
        let result = service
            .call_tool(CallToolRequestParam {
                name: self.name.clone().into(),
                arguments,
            })
            .await?;

        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_names_the_server() {
        assert_eq!(
            powered_by("fetch", "Fetches a URL"),
            "Powered by 'fetch'.\nFetches a URL"
        );
    }
}
