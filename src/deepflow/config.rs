// SPDX-License-Identifier: MIT

//! Configuration
//!
//! [`AppConfig`] is process-wide: model endpoints, tool assignment, MCP
//! servers, storage locations. It comes from an optional `conf.yaml` with
//! environment fallbacks. [`RunConfig`] holds per-run limits, resolved as
//! request value, then environment variable, then default.

use crate::adk::error::DeepflowError;
use crate::adk::model::openai::{OpenAIModel, DEFAULT_BASE_URL};
use crate::deepflow::state::Resource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "conf.yaml";
const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    #[default]
    Basic,
    Reasoning,
    Vision,
}

/// Endpoint settings for one LLM type; unset fields fall back to `OPENAI_*`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// A stdio MCP server whose tools are offered to agents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Only these tools are exposed; all tools when unset
    #[serde(default)]
    pub enabled_tools: Option<Vec<String>>,
    /// Agents that receive this server's tools
    #[serde(default)]
    pub add_to_agents: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub models: HashMap<LlmType, ModelSettings>,
    /// Agent name to LLM type; unlisted agents use `basic`
    pub agents: HashMap<String, LlmType>,
    /// Agent name to built-in tool names
    pub tools: HashMap<String, Vec<String>>,
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// File checkpoint directory; checkpoints stay in memory when unset
    pub checkpoint_dir: Option<PathBuf>,
    /// Replay recording directory; recording is off when unset
    pub replay_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    /// Resource catalog offered to clients for attaching to a request
    pub resources: Vec<Resource>,
}

impl AppConfig {
    /// Load from `path`, or from `conf.yaml` when it exists. An explicit path
    /// that cannot be read is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, DeepflowError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                log::info!("Loading configuration from {}", path.display());
                Self::from_yaml(&text)
            }
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No {} found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(DeepflowError::config(format!(
                "Cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, DeepflowError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn llm_type_for(&self, agent: &str) -> LlmType {
        self.agents.get(agent).copied().unwrap_or_default()
    }

    /// Built-in tools for an agent. Researchers get search and crawl by default.
    pub fn tools_for(&self, agent: &str) -> Vec<String> {
        match self.tools.get(agent) {
            Some(tools) => tools.clone(),
            None if agent == "researcher" => vec!["web_search".to_string(), "crawl".to_string()],
            None => Vec::new(),
        }
    }

    /// Catalog resources whose title or uri contains `query`, ignoring case
    pub fn list_resources(&self, query: Option<&str>) -> Vec<Resource> {
        filter_resources(&self.resources, query)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Effective endpoint settings for an LLM type, filling gaps from `env`
    pub fn resolve_model(
        &self,
        llm: LlmType,
        env: impl Fn(&str) -> Option<String>,
    ) -> ModelSettings {
        let configured = self.models.get(&llm).cloned().unwrap_or_default();
        ModelSettings {
            model: configured
                .model
                .or_else(|| env("OPENAI_MODEL"))
                .or_else(|| Some(DEFAULT_MODEL.to_string())),
            base_url: configured
                .base_url
                .or_else(|| env("OPENAI_BASE_URL"))
                .or_else(|| Some(DEFAULT_BASE_URL.to_string())),
            api_key: configured.api_key.or_else(|| env("OPENAI_API_KEY")),
        }
    }

    /// Build the chat model serving `llm`
    pub fn build_model(&self, llm: LlmType) -> Result<OpenAIModel, DeepflowError> {
        let settings = self.resolve_model(llm, env_var);
        let api_key = settings.api_key.ok_or_else(|| {
            DeepflowError::config("OPENAI_API_KEY is not set and no api_key is configured")
        })?;
        Ok(OpenAIModel::with_endpoint(
            settings.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            settings
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            self.request_timeout(),
        )?)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Per-run limits explicitly set by a request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunOverrides {
    pub max_plan_iterations: Option<u32>,
    pub max_step_num: Option<u32>,
    pub max_search_results: Option<u32>,
    pub recursion_limit: Option<u32>,
    pub agent_recursion_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub max_plan_iterations: u32,
    pub max_step_num: u32,
    pub max_search_results: u32,
    /// Ceiling on node executions per run or resume
    pub recursion_limit: u32,
    /// Ceiling on rounds per agent step
    pub agent_recursion_limit: u32,
    pub resources: Vec<Resource>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_plan_iterations: 1,
            max_step_num: 3,
            max_search_results: 3,
            recursion_limit: 25,
            agent_recursion_limit: 25,
            resources: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Resolve against the process environment
    pub fn resolve(overrides: &RunOverrides, resources: Vec<Resource>) -> Self {
        Self::resolve_with(overrides, resources, env_var)
    }

    pub fn resolve_with(
        overrides: &RunOverrides,
        resources: Vec<Resource>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let defaults = Self::default();
        let pick = |value: Option<u32>, key: &str, default: u32, allow_zero: bool| {
            let valid = |v: &u32| allow_zero || *v > 0;
            if let Some(v) = value.filter(valid) {
                return v;
            }
            match env(key) {
                Some(raw) => match raw.trim().parse::<u32>().ok().filter(valid) {
                    Some(v) => v,
                    None => {
                        log::warn!("Invalid {}={:?}, using {}", key, raw, default);
                        default
                    }
                },
                None => default,
            }
        };

        Self {
            max_plan_iterations: pick(
                overrides.max_plan_iterations,
                "MAX_PLAN_ITERATIONS",
                defaults.max_plan_iterations,
                true,
            ),
            max_step_num: pick(
                overrides.max_step_num,
                "MAX_STEP_NUM",
                defaults.max_step_num,
                false,
            ),
            max_search_results: pick(
                overrides.max_search_results,
                "MAX_SEARCH_RESULTS",
                defaults.max_search_results,
                false,
            ),
            recursion_limit: pick(
                overrides.recursion_limit,
                "RECURSION_LIMIT",
                defaults.recursion_limit,
                false,
            ),
            agent_recursion_limit: pick(
                overrides.agent_recursion_limit,
                "AGENT_RECURSION_LIMIT",
                defaults.agent_recursion_limit,
                false,
            ),
            resources,
        }
    }
}

/// Resources whose title or uri contains `query`, ignoring case. A blank
/// query keeps everything.
pub fn filter_resources(resources: &[Resource], query: Option<&str>) -> Vec<Resource> {
    let query = query.map(str::trim).unwrap_or_default().to_lowercase();
    resources
        .iter()
        .filter(|r| {
            query.is_empty()
                || r.title.to_lowercase().contains(&query)
                || r.uri.to_lowercase().contains(&query)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_run_config_defaults() {
        let cfg = RunConfig::resolve_with(&RunOverrides::default(), vec![], env_from(&[]));
        assert_eq!(cfg, RunConfig::default());
        assert_eq!(cfg.recursion_limit, 25);
        assert_eq!(cfg.agent_recursion_limit, 25);
    }

    #[test]
    fn test_request_beats_env_beats_default() {
        let overrides = RunOverrides {
            max_step_num: Some(7),
            ..Default::default()
        };
        let env = env_from(&[("MAX_STEP_NUM", "5"), ("MAX_SEARCH_RESULTS", "9")]);
        let cfg = RunConfig::resolve_with(&overrides, vec![], env);
        assert_eq!(cfg.max_step_num, 7);
        assert_eq!(cfg.max_search_results, 9);
        assert_eq!(cfg.max_plan_iterations, 1);
    }

    #[test]
    fn test_invalid_agent_recursion_limit_falls_back() {
        for raw in ["0", "-3", "lots"] {
            let env = env_from(&[("AGENT_RECURSION_LIMIT", raw)]);
            let cfg = RunConfig::resolve_with(&RunOverrides::default(), vec![], env);
            assert_eq!(cfg.agent_recursion_limit, 25, "value {:?}", raw);
        }
        let env = env_from(&[("AGENT_RECURSION_LIMIT", "4")]);
        let cfg = RunConfig::resolve_with(&RunOverrides::default(), vec![], env);
        assert_eq!(cfg.agent_recursion_limit, 4);
    }

    #[test]
    fn test_zero_plan_iterations_is_allowed() {
        let overrides = RunOverrides {
            max_plan_iterations: Some(0),
            ..Default::default()
        };
        let cfg = RunConfig::resolve_with(&overrides, vec![], env_from(&[]));
        assert_eq!(cfg.max_plan_iterations, 0);
    }

    #[test]
    fn test_app_config_from_yaml() {
        let yaml = r#"
models:
  basic:
    model: qwen-plus
    base_url: https://example.com/v1
  reasoning:
    model: deepseek-r1
agents:
  planner: reasoning
tools:
  coder: [python_repl]
mcp_servers:
  fetch:
    command: uvx
    args: [mcp-server-fetch]
    add_to_agents: [researcher]
checkpoint_dir: /tmp/deepflow
request_timeout_secs: 60
"#;
        let cfg = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.llm_type_for("planner"), LlmType::Reasoning);
        assert_eq!(cfg.llm_type_for("reporter"), LlmType::Basic);
        assert_eq!(cfg.tools_for("coder"), vec!["python_repl"]);
        assert_eq!(cfg.tools_for("researcher"), vec!["web_search", "crawl"]);
        assert!(cfg.tools_for("reporter").is_empty());
        assert_eq!(cfg.mcp_servers["fetch"].add_to_agents, vec!["researcher"]);
        assert!(cfg.mcp_servers["fetch"].enabled_tools.is_none());
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_list_resources_filters_by_query() {
        let yaml = r#"
resources:
  - uri: rag://dataset/ev-sales
    title: EV Sales 2024
  - uri: rag://dataset/battery
    title: Battery Costs
"#;
        let cfg = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.list_resources(None).len(), 2);
        assert_eq!(cfg.list_resources(Some("  ")).len(), 2);

        let hits = cfg.list_resources(Some("ev sales"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uri, "rag://dataset/ev-sales");
        assert_eq!(cfg.list_resources(Some("BATTERY"))[0].title, "Battery Costs");
        assert!(cfg.list_resources(Some("solar")).is_empty());
    }

    #[test]
    fn test_model_settings_fall_back_to_env() {
        let cfg = AppConfig::from_yaml("models:\n  reasoning:\n    model: r1\n").unwrap();
        let env = env_from(&[("OPENAI_MODEL", "gpt-x"), ("OPENAI_API_KEY", "sk-test")]);

        let reasoning = cfg.resolve_model(LlmType::Reasoning, &env);
        assert_eq!(reasoning.model.as_deref(), Some("r1"));
        assert_eq!(reasoning.api_key.as_deref(), Some("sk-test"));

        let basic = cfg.resolve_model(LlmType::Basic, &env);
        assert_eq!(basic.model.as_deref(), Some("gpt-x"));
        assert_eq!(basic.base_url.as_deref(), Some(DEFAULT_BASE_URL));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(AppConfig::from_yaml("  \n").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let missing = Path::new("/definitely/not/here/conf.yaml");
        assert!(matches!(
            AppConfig::load(Some(missing)),
            Err(DeepflowError::Config(_))
        ));
    }
}
