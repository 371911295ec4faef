// SPDX-License-Identifier: MIT

use crate::adk::tool::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;
use std::time::Duration;

pub const CRAWL_TOOL: &str = "crawl";
const MAX_CONTENT_CHARS: usize = 8000;

static CRAWL_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "url": {
                "type": "string",
                "description": "The url to crawl"
            }
        },
        "required": ["url"]
    })
});

#[derive(Debug, Deserialize)]
struct CrawlArgs {
    url: String,
}

/// Fetches a page and returns its readable text
pub struct CrawlTool {
    client: Client,
}

impl CrawlTool {
    pub fn new(timeout: Option<Duration>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut builder = Client::builder().user_agent("deepflow-rs");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Tool for CrawlTool {
    fn name(&self) -> &str {
        CRAWL_TOOL
    }

    fn description(&self) -> &str {
        "Use this to crawl a url and get a readable content in markdown format."
    }

    fn schema(&self) -> &Value {
        &CRAWL_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let args: CrawlArgs = serde_json::from_value(input)?;
        let url = reqwest::Url::parse(&args.url)?;

        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(format!("Failed to fetch {}: {}", args.url, resp.status()).into());
        }
        let html = resp.text().await?;

        Ok(json!({
            "url": args.url,
            "crawled_content": readable_text(&html, MAX_CONTENT_CHARS),
        }))
    }
}

/// Drop tags, scripts and styles; collapse whitespace; cut at `limit` chars
fn readable_text(html: &str, limit: usize) -> String {
    let mut out = String::with_capacity(html.len().min(limit));
    let mut rest = html;
    let mut pending_space = false;
    let mut count = 0;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('<') {
            let lower = after.get(..6).map(|s| s.to_ascii_lowercase());
            let skip_block = match lower.as_deref() {
                Some("script") => Some("</script>"),
                Some("style>") | Some("style ") => Some("</style>"),
                _ => None,
            };
            rest = match skip_block.and_then(|end| find_ci(rest, end).map(|i| i + end.len())) {
                Some(end) => &rest[end..],
                None => match rest.find('>') {
                    Some(i) => &rest[i + 1..],
                    None => "",
                },
            };
            pending_space = true;
            continue;
        }

        let mut chars = rest.chars();
        let Some(c) = chars.next() else { break };
        rest = chars.as_str();
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
            count += 1;
        }
        pending_space = false;
        out.push(c);
        count += 1;
        if count >= limit {
            break;
        }
    }
    out
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}
