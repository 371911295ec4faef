// SPDX-License-Identifier: MIT

use crate::adk::tool::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::error::Error;
use std::time::Duration;

pub const WEB_SEARCH_TOOL: &str = "web_search";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const MAX_RESULTS_CAP: u32 = 20;

static WEB_SEARCH_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "The search query"
            },
            "max_results": {
                "type": "integer",
                "description": "Number of results to return (max 20)"
            }
        },
        "required": ["query"]
    })
});

#[derive(Debug, Serialize, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// One hit, shaped for prompts: `content` is the result snippet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

/// Web search backed by the Brave Search API
pub struct WebSearchTool {
    client: Client,
    api_key: String,
    default_results: u32,
}

impl WebSearchTool {
    /// Reads `BRAVE_API_KEY`
    pub fn from_env(timeout: Option<Duration>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let api_key = env::var("BRAVE_API_KEY").map_err(|_| "BRAVE_API_KEY must be set")?;
        Self::new(api_key, timeout)
    }

    pub fn new(
        api_key: String,
        timeout: Option<Duration>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            api_key,
            default_results: 3,
        })
    }

    pub fn with_default_results(mut self, n: u32) -> Self {
        self.default_results = n.clamp(1, MAX_RESULTS_CAP);
        self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Searches the web. Returns a list of results with title, url and a content snippet."
    }

    fn schema(&self) -> &Value {
        &WEB_SEARCH_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let args: WebSearchArgs = serde_json::from_value(input)?;
        let count = args
            .max_results
            .unwrap_or(self.default_results)
            .clamp(1, MAX_RESULTS_CAP);

        let mut url = reqwest::Url::parse(BRAVE_ENDPOINT)?;
        url.query_pairs_mut()
            .append_pair("q", &args.query)
            .append_pair("count", &count.to_string());

        log::debug!("web_search: {} ({} results)", args.query, count);
        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(format!("Search API error: {}", text).into());
        }

        let body: Value = resp.json().await?;
        let hits = parse_results(&body)?;
        Ok(serde_json::to_value(hits)?)
    }
}

fn parse_results(body: &Value) -> Result<Vec<SearchHit>, Box<dyn Error + Send + Sync>> {
    let results = body
        .get("web")
        .and_then(|w| w.get("results"))
        .ok_or("Invalid response format: missing web.results")?;
    let results: Vec<BraveResult> = serde_json::from_value(results.clone())?;
    Ok(results
        .into_iter()
        .map(|r| SearchHit {
            title: r.title,
            url: r.url,
            content: r.description,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results_maps_description_to_content() {
        let body = json!({
            "web": {
                "results": [
                    {"title": "EV sales 2024", "url": "https://example.com/ev", "description": "Sales grew", "age": "2d"},
                    {"title": "No snippet", "url": "https://example.com/x"}
                ]
            }
        });
        let hits = parse_results(&body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Sales grew");
        assert_eq!(hits[1].content, "");
    }

    #[test]
    fn test_parse_results_rejects_unexpected_shape() {
        assert!(parse_results(&json!({"news": []})).is_err());
    }

    #[test]
    fn test_default_results_are_capped() {
        let tool = WebSearchTool::new("key".into(), None)
            .unwrap()
            .with_default_results(50);
        assert_eq!(tool.default_results, MAX_RESULTS_CAP);
    }
}
