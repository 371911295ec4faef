// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions API implementation
//!
//! Works against any OpenAI-compatible endpoint (set `base_url`).

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::ModelError;
use crate::adk::tool::Tool;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat model
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    /// Create a new OpenAIModel from the environment
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing(PROVIDER.to_string()))?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_endpoint(model_name, api_key, base_url, None)
    }

    /// Create a model against an explicit endpoint
    pub fn with_endpoint(
        model_name: String,
        api_key: String,
        base_url: String,
        timeout: Option<Duration>,
    ) -> Result<Self, ModelError> {
        if api_key.is_empty() {
            return Err(ModelError::ApiKeyMissing(PROVIDER.to_string()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            api_key,
            model_name,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Convert internal Content to OpenAI messages.
    ///
    /// Tool responses expand to one `tool` message per response.
    fn content_to_openai_messages(content: &Content) -> Vec<Value> {
        let role = match content.role.as_str() {
            "model" | "assistant" => "assistant",
            other => other,
        };

        let responses: Vec<Value> = content
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionResponse { id, response, .. } => Some(json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": match response {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }
                })),
                _ => None,
            })
            .collect();
        if !responses.is_empty() {
            return responses;
        }

        let mut tool_calls = Vec::new();
        let mut text_content = String::new();

        for part in &content.parts {
            match part {
                Part::Text(t) => text_content.push_str(t),
                Part::FunctionCall { id, name, args } => {
                    tool_calls.push(json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": args.to_string()
                        }
                    }));
                }
                Part::FunctionResponse { .. } => {}
            }
        }

        if !tool_calls.is_empty() {
            vec![json!({
                "role": role,
                "content": if text_content.is_empty() { Value::Null } else { json!(text_content) },
                "tool_calls": tool_calls
            })]
        } else {
            vec![json!({
                "role": role,
                "content": text_content
            })]
        }
    }

    /// Convert tools to OpenAI function format
    fn tools_to_openai_format(tools: &[Arc<dyn Tool>]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.schema()
                    }
                })
            })
            .collect()
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(response: &Value) -> Result<Content, ModelError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("No choices in response".to_string()))?;

        let message = &choice["message"];
        let mut parts = Vec::new();

        if let Some(content) = message["content"].as_str() {
            if !content.is_empty() {
                parts.push(Part::Text(content.to_string()));
            }
        }

        if let Some(tool_calls) = message["tool_calls"].as_array() {
            for (i, tc) in tool_calls.iter().enumerate() {
                let name = tc["function"]["name"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let id = tc["id"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("call_{}", i));
                let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                // Unparseable arguments are kept verbatim so the tool can report the problem
                let args = serde_json::from_str(args_str)
                    .unwrap_or_else(|_| Value::String(args_str.to_string()));

                parts.push(Part::FunctionCall { id, name, args });
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }

    fn build_body(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Value {
        let messages: Vec<Value> = history
            .iter()
            .flat_map(Self::content_to_openai_messages)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
            if let Some(schema) = &cfg.response_schema {
                body["response_format"] = json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": "structured_output",
                        "schema": schema
                    }
                });
            }
        }

        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = json!(Self::tools_to_openai_format(tools));
                body["tool_choice"] = json!("auto");
            }
        }

        body
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(history, config, tools);

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(ModelError::api(PROVIDER, status.as_u16(), text));
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        let content = Self::parse_openai_response(&resp_json)?;

        // Structured output must be JSON; hand the raw text back for repair otherwise
        if config.and_then(|c| c.response_schema.as_ref()).is_some() {
            let text = content.text_content();
            if serde_json::from_str::<Value>(&text).is_err() {
                return Err(ModelError::OutputParsing { raw: text });
            }
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> OpenAIModel {
        OpenAIModel::with_endpoint(
            "gpt-4o-mini".to_string(),
            "test-key".to_string(),
            "http://localhost:1234/v1/".to_string(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        let result = OpenAIModel::with_endpoint(
            "gpt-4o-mini".to_string(),
            String::new(),
            DEFAULT_BASE_URL.to_string(),
            None,
        );
        assert!(matches!(result, Err(ModelError::ApiKeyMissing(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(model().base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn test_content_to_openai_user_message() {
        let msgs = OpenAIModel::content_to_openai_messages(&Content::user("Hello"));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[0]["content"], "Hello");
    }

    #[test]
    fn test_content_to_openai_assistant_message() {
        let msgs = OpenAIModel::content_to_openai_messages(&Content::model("I can help"));
        assert_eq!(msgs[0]["role"], "assistant");
        assert_eq!(msgs[0]["content"], "I can help");
    }

    #[test]
    fn test_content_to_openai_with_function_call() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![Part::FunctionCall {
                id: "call_1".to_string(),
                name: "web_search".to_string(),
                args: json!({"query": "rust"}),
            }],
        };

        let msgs = OpenAIModel::content_to_openai_messages(&content);
        assert_eq!(msgs[0]["role"], "assistant");
        assert!(msgs[0]["content"].is_null());
        let tool_call = &msgs[0]["tool_calls"][0];
        assert_eq!(tool_call["id"], "call_1");
        assert_eq!(tool_call["function"]["name"], "web_search");
    }

    #[test]
    fn test_tool_responses_expand_to_one_message_each() {
        let content = Content {
            role: "user".to_string(),
            parts: vec![
                Part::FunctionResponse {
                    id: "call_1".to_string(),
                    name: "web_search".to_string(),
                    response: json!({"results": []}),
                },
                Part::FunctionResponse {
                    id: "call_2".to_string(),
                    name: "crawl".to_string(),
                    response: json!("page text"),
                },
            ],
        };

        let msgs = OpenAIModel::content_to_openai_messages(&content);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "tool");
        assert_eq!(msgs[0]["tool_call_id"], "call_1");
        assert_eq!(msgs[1]["content"], "page text");
    }

    #[test]
    fn test_structured_config_sets_response_format() {
        let cfg = GenerationConfig::structured(json!({"type": "object"}));
        let body = model().build_body(&[Content::user("plan")], Some(&cfg), None);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["type"],
            "object"
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_openai_text_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Hello, how can I help?"
                }
            }]
        });

        let content = OpenAIModel::parse_openai_response(&response).unwrap();
        assert_eq!(content.role, "model");
        assert_eq!(content.text_content(), "Hello, how can I help?");
    }

    #[test]
    fn test_parse_openai_function_call_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "handoff_to_planner",
                            "arguments": "{\"task_title\": \"AI chips\", \"locale\": \"en-US\"}"
                        }
                    }]
                }
            }]
        });

        let content = OpenAIModel::parse_openai_response(&response).unwrap();
        let calls = content.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "call_123");
        assert_eq!(calls[0].1, "handoff_to_planner");
        assert_eq!(calls[0].2["locale"], "en-US");
    }

    #[test]
    fn test_parse_response_without_choices_fails() {
        let result = OpenAIModel::parse_openai_response(&json!({"choices": []}));
        assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
    }
}
