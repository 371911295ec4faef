// SPDX-License-Identifier: MIT

use super::{Checkpoint, CheckpointStore};
use crate::adk::error::DeepflowError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local checkpoint store
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), DeepflowError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, DeepflowError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(thread_id).cloned())
    }

    async fn remove(&self, thread_id: &str) -> Result<bool, DeepflowError> {
        let mut checkpoints = self.checkpoints.write().await;
        Ok(checkpoints.remove(thread_id).is_some())
    }
}
