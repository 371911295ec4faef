// SPDX-License-Identifier: MIT

//! Checkpoints of suspended runs
//!
//! A checkpoint is written when a node interrupts and removed once the run is
//! resumed. Stores hold at most one checkpoint per thread.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use crate::adk::error::DeepflowError;
use crate::deepflow::graph::NodeName;
use crate::deepflow::interrupt::{InterruptOption, InterruptRequest};
use crate::deepflow::state::State;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A suspended run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: State,
    /// The node waiting for feedback
    pub node: NodeName,
    pub prompt: String,
    pub options: Vec<InterruptOption>,
    /// Stream message id of the interrupt event
    pub interrupt_id: String,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        state: State,
        node: NodeName,
        request: InterruptRequest,
        interrupt_id: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            state,
            node,
            prompt: request.prompt,
            options: request.options,
            interrupt_id: interrupt_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint, replacing any existing one for the thread
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), DeepflowError>;

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, DeepflowError>;

    /// Remove the thread's checkpoint; returns whether one existed
    async fn remove(&self, thread_id: &str) -> Result<bool, DeepflowError>;
}
