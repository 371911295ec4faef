// SPDX-License-Identifier: MIT

//! State record and per-field reducers

use super::{Message, Resource};
use crate::deepflow::plan::Plan;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCALE: &str = "en-US";

/// Runtime workflow state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub plan_iterations: u32,
    #[serde(default)]
    pub current_plan: Option<Plan>,
    #[serde(default)]
    pub final_report: String,
    #[serde(default)]
    pub auto_accepted_plan: bool,
    #[serde(default = "default_true")]
    pub enable_background_investigation: bool,
    #[serde(default)]
    pub background_investigation_results: Option<String>,
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for State {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            locale: default_locale(),
            observations: Vec::new(),
            resources: Vec::new(),
            plan_iterations: 0,
            current_plan: None,
            final_report: String::new(),
            auto_accepted_plan: false,
            enable_background_investigation: true,
            background_investigation_results: None,
        }
    }
}

/// A partial state update. `None` fields leave the prior value untouched.
///
/// `current_plan` and `background_investigation_results` are doubly optional:
/// `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    /// Appended; an entry whose id already exists replaces that entry in place
    pub messages: Option<Vec<Message>>,
    pub locale: Option<String>,
    pub observations: Option<Vec<String>>,
    pub resources: Option<Vec<Resource>>,
    pub plan_iterations: Option<u32>,
    pub current_plan: Option<Option<Plan>>,
    pub final_report: Option<String>,
    pub auto_accepted_plan: Option<bool>,
    pub enable_background_investigation: Option<bool>,
    pub background_investigation_results: Option<Option<String>>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.get_or_insert_with(Vec::new).push(message);
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn observations(mut self, observations: Vec<String>) -> Self {
        self.observations = Some(observations);
        self
    }

    pub fn plan_iterations(mut self, n: u32) -> Self {
        self.plan_iterations = Some(n);
        self
    }

    pub fn plan(mut self, plan: Plan) -> Self {
        self.current_plan = Some(Some(plan));
        self
    }

    pub fn final_report(mut self, report: impl Into<String>) -> Self {
        self.final_report = Some(report.into());
        self
    }

    pub fn background_results(mut self, results: Option<String>) -> Self {
        self.background_investigation_results = Some(results);
        self
    }
}

impl State {
    /// Seed a state for a new run with the given user messages
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Fold a delta into this state, producing the next state
    pub fn apply(self, delta: StateDelta) -> State {
        let mut next = self;

        if let Some(incoming) = delta.messages {
            for message in incoming {
                match next.messages.iter_mut().find(|m| m.id == message.id) {
                    Some(existing) => *existing = message,
                    None => next.messages.push(message),
                }
            }
        }
        if let Some(v) = delta.locale {
            next.locale = v;
        }
        if let Some(v) = delta.observations {
            next.observations = v;
        }
        if let Some(v) = delta.resources {
            next.resources = v;
        }
        if let Some(v) = delta.plan_iterations {
            next.plan_iterations = v;
        }
        if let Some(v) = delta.current_plan {
            next.current_plan = v;
        }
        if let Some(v) = delta.final_report {
            next.final_report = v;
        }
        if let Some(v) = delta.auto_accepted_plan {
            next.auto_accepted_plan = v;
        }
        if let Some(v) = delta.enable_background_investigation {
            next.enable_background_investigation = v;
        }
        if let Some(v) = delta.background_investigation_results {
            next.background_investigation_results = v;
        }

        next
    }

    /// Content of the most recent user message, if any
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::Role::User)
    }
}
