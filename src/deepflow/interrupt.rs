// SPDX-License-Identifier: MIT

//! Human-in-the-loop decisions
//!
//! A node that needs a human decision returns an [`InterruptRequest`]. The
//! answer comes back as free text prefixed with the chosen option value in
//! brackets, e.g. `"[edit_plan] add a cost section"`.

use crate::adk::error::WorkflowError;
use serde::{Deserialize, Serialize};

pub const PLAN_REVIEW_PROMPT: &str = "Please Review the Plan.";

/// A decision offered to the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterruptOption {
    pub text: String,
    pub value: String,
}

impl InterruptOption {
    pub fn new(text: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            value: value.into(),
        }
    }
}

/// What a suspended node asks of the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterruptRequest {
    pub prompt: String,
    pub options: Vec<InterruptOption>,
}

impl InterruptRequest {
    /// The plan review shown after every planning round
    pub fn plan_review() -> Self {
        Self {
            prompt: PLAN_REVIEW_PROMPT.to_string(),
            options: vec![
                InterruptOption::new("Edit plan", "edit_plan"),
                InterruptOption::new("Start research", "accepted"),
            ],
        }
    }
}

/// Parsed plan-review feedback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    /// Revise the plan; carries the full feedback text
    EditPlan(String),
    Accepted,
}

impl Feedback {
    /// Parse feedback by its bracketed prefix, ignoring case
    pub fn parse(text: &str) -> Result<Feedback, WorkflowError> {
        let trimmed = text.trim_start();
        if has_prefix(trimmed, "[EDIT_PLAN]") {
            Ok(Feedback::EditPlan(text.to_string()))
        } else if has_prefix(trimmed, "[ACCEPTED]") {
            Ok(Feedback::Accepted)
        } else {
            Err(WorkflowError::UnsupportedResume(text.to_string()))
        }
    }
}

fn has_prefix(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// Build resume text from a chosen option value and the user's message
pub fn resume_text(option_value: &str, message: &str) -> String {
    if message.is_empty() {
        format!("[{}]", option_value)
    } else {
        format!("[{}] {}", option_value, message)
    }
}
