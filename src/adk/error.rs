// SPDX-License-Identifier: MIT

//! Typed error handling for deepflow-rs
//!
//! Errors are split by where they originate: the model collaborator, the
//! workflow graph, and the surrounding run machinery. Only the variants that
//! reach the run boundary are surfaced to callers; recoverable conditions
//! (plan repair, tool failures, agent round limits) are absorbed by the nodes.

use thiserror::Error;

/// Top-level error type for deepflow-rs
#[derive(Debug, Error)]
pub enum DeepflowError {
    /// Model/LLM collaborator failures that could not be recovered locally
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Graph and routing errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// The router's global step ceiling was exceeded
    #[error("Recursion limit of {limit} node executions reached without hitting END")]
    RecursionLimit { limit: u32 },

    /// The caller cancelled the run between two node executions
    #[error("Run cancelled")]
    Cancelled,

    /// Checkpoint persistence failures
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Workflow-specific errors. These are fatal for the run they occur in.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A node asked to go somewhere its edge list does not allow
    #[error("Node '{from}' routed to undeclared target '{to}'")]
    UndeclaredEdge { from: String, to: String },

    /// Resume feedback did not start with a supported decision prefix
    #[error("Interrupt value of '{0}' is not supported")]
    UnsupportedResume(String),

    /// The accepted plan is missing or fails validation
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Resume requested for a thread with no suspended run
    #[error("No checkpoint found for thread '{0}'")]
    NoCheckpoint(String),

    /// A checkpoint names a node that cannot be resumed
    #[error("Node '{0}' does not support resume")]
    NotResumable(String),

    /// The registry has no implementation for a node
    #[error("No implementation registered for node '{0}'")]
    MissingNode(String),

    /// Two implementations were registered for the same node
    #[error("Node '{0}' registered more than once")]
    DuplicateNode(String),

    /// A registered implementation reports a different name than its slot
    #[error("Node registered as '{slot}' reports name '{actual}'")]
    NodeMismatch { slot: String, actual: String },
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Non-success response from the provider
    #[error("API error from {provider} ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// Transport failure
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Structured output could not be parsed; carries the raw text for repair
    #[error("Failed to parse model output as structured data")]
    OutputParsing { raw: String },
}

impl DeepflowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the error is a resource-exhaustion condition rather than a node failure
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::RecursionLimit { .. })
    }
}

impl ModelError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }
}

impl From<&str> for DeepflowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for DeepflowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
