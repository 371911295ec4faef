// SPDX-License-Identifier: MIT

//! Research plan produced by the planner node
//!
//! Planner output goes through three stages in [`parse_plan`]: a strict parse,
//! a repair pass over fenced or malformed JSON, and finally a best-effort
//! rebuild from whatever step-like objects can be found. Parsing never fails;
//! a plan with no usable steps is marked as having enough context so the
//! workflow moves straight to reporting.

use crate::deepflow::json;
use crate::deepflow::state::DEFAULT_LOCALE;
use once_cell::sync::Lazy;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of work a step needs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Information gathering, routed to the researcher
    #[default]
    Research,
    /// Computation or data processing, routed to the coder
    Processing,
    /// Anything the scheduler does not know how to route
    #[serde(other)]
    #[schemars(skip)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Step {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "step_type", alias = "type", default)]
    pub step_type: StepType,
    #[serde(default = "default_true")]
    pub need_search: bool,
    /// Filled in once the step has been executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub execution_res: Option<String>,
}

impl Step {
    pub fn new(title: impl Into<String>, step_type: StepType) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            step_type,
            need_search: true,
            execution_res: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_executed(&self) -> bool {
        self.execution_res.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Plan {
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub has_enough_context: bool,
    pub thought: String,
    pub title: String,
    pub steps: Vec<Step>,
}

fn default_true() -> bool {
    true
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

/// JSON schema the planner model is asked to follow
pub static PLAN_SCHEMA: Lazy<Value> =
    Lazy::new(|| serde_json::to_value(schema_for!(Plan)).unwrap_or(Value::Null));

impl Plan {
    /// Structural checks beyond what deserialization enforces
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("plan title is empty".to_string());
        }
        if let Some(i) = self.steps.iter().position(|s| s.title.trim().is_empty()) {
            return Err(format!("step {} has an empty title", i));
        }
        Ok(())
    }

    /// Index of the first step without a result
    pub fn first_unexecuted(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.is_executed())
    }

    pub fn is_complete(&self) -> bool {
        self.first_unexecuted().is_none()
    }

    /// A copy of this plan with one step's result filled in
    pub fn with_step_result(&self, index: usize, result: impl Into<String>) -> Plan {
        let mut next = self.clone();
        if let Some(step) = next.steps.get_mut(index) {
            step.execution_res = Some(result.into());
        }
        next
    }

    /// Drop steps beyond `max`; returns how many were removed
    pub fn truncate_steps(&mut self, max: usize) -> usize {
        let extra = self.steps.len().saturating_sub(max);
        self.steps.truncate(max);
        extra
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Strict parse of an already-decoded JSON value
    pub fn from_value(value: Value) -> Result<Plan, String> {
        let plan: Plan = serde_json::from_value(value).map_err(|e| e.to_string())?;
        plan.validate()?;
        Ok(plan)
    }

    /// Rebuild a plan from loosely shaped JSON, keeping steps that have a title
    pub fn best_effort(value: &Value) -> Plan {
        let steps: Vec<Step> = value
            .get("steps")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let title = item.get("title")?.as_str()?.trim();
                        if title.is_empty() {
                            return None;
                        }
                        Some(Step {
                            title: title.to_string(),
                            description: str_field(item, "description").unwrap_or_default(),
                            step_type: step_type_field(item),
                            need_search: item
                                .get("need_search")
                                .and_then(Value::as_bool)
                                .unwrap_or(true),
                            execution_res: str_field(item, "execution_res"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let has_enough_context = value
            .get("has_enough_context")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Plan {
            locale: str_field(value, "locale").unwrap_or_else(default_locale),
            has_enough_context: has_enough_context || steps.is_empty(),
            thought: str_field(value, "thought").unwrap_or_default(),
            title: str_field(value, "title")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Deep Research".to_string()),
            steps,
        }
    }
}

/// The item's `step_type` (or `type`); Research when absent or not a string
fn step_type_field(item: &Value) -> StepType {
    item.get("step_type")
        .or_else(|| item.get("type"))
        .filter(|v| v.is_string())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Which stage of [`parse_plan`] produced the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseQuality {
    Strict,
    Repaired,
    BestEffort,
}

/// Parse planner output. Never fails.
pub fn parse_plan(raw: &str) -> (Plan, ParseQuality) {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if let Ok(plan) = Plan::from_value(value) {
            return (plan, ParseQuality::Strict);
        }
    }

    log::warn!("Planner output failed strict parsing, attempting repair");
    let value = json::parse_lenient(raw).unwrap_or(Value::Null);
    match Plan::from_value(value.clone()) {
        Ok(plan) => (plan, ParseQuality::Repaired),
        Err(e) => {
            log::warn!("Repaired plan still invalid ({}), rebuilding best-effort", e);
            (Plan::best_effort(&value), ParseQuality::BestEffort)
        }
    }
}
