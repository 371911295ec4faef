// SPDX-License-Identifier: MIT

//! File-backed checkpoint store
//!
//! One JSON file per thread, `{dir}/{thread_id}.json`. Writes go to a
//! temporary file first and are renamed into place, so a crash never leaves a
//! half-written checkpoint behind.

use super::{Checkpoint, CheckpointStore};
use crate::adk::error::DeepflowError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checkpoint_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(thread_id)))
    }

    fn temp_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", sanitize(thread_id)))
    }
}

/// Keep thread ids from escaping the checkpoint directory
fn sanitize(thread_id: &str) -> String {
    thread_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), DeepflowError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            DeepflowError::checkpoint(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let temp = self.temp_path(&checkpoint.thread_id);
        let target = self.checkpoint_path(&checkpoint.thread_id);

        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| DeepflowError::checkpoint(format!("Failed to create temp file: {}", e)))?;
        file.write_all(&json)
            .await
            .map_err(|e| DeepflowError::checkpoint(format!("Failed to write checkpoint: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| DeepflowError::checkpoint(format!("Failed to sync checkpoint: {}", e)))?;
        drop(file);

        fs::rename(&temp, &target)
            .await
            .map_err(|e| DeepflowError::checkpoint(format!("Failed to rename checkpoint: {}", e)))?;

        log::debug!(
            "Saved checkpoint for thread {} at {}",
            checkpoint.thread_id,
            target.display()
        );
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, DeepflowError> {
        let path = self.checkpoint_path(thread_id);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DeepflowError::checkpoint(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let checkpoint = serde_json::from_slice(&data)?;
        Ok(Some(checkpoint))
    }

    async fn remove(&self, thread_id: &str) -> Result<bool, DeepflowError> {
        match fs::remove_file(self.checkpoint_path(thread_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DeepflowError::checkpoint(format!(
                "Failed to remove checkpoint: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deepflow::graph::NodeName;
    use crate::deepflow::interrupt::InterruptRequest;
    use crate::deepflow::plan::{Plan, Step, StepType};
    use crate::deepflow::state::{Message, State, StateDelta};
    use tempfile::TempDir;

    fn checkpoint(thread_id: &str) -> Checkpoint {
        let plan = Plan {
            locale: "en-US".into(),
            has_enough_context: false,
            thought: "t".into(),
            title: "Plan".into(),
            steps: vec![Step::new("A", StepType::Research)],
        };
        let state = State::default().apply(
            StateDelta::new()
                .message(Message::user("research EVs"))
                .plan(plan),
        );
        Checkpoint::new(
            thread_id,
            state,
            NodeName::HumanFeedback,
            InterruptRequest::plan_review(),
            "int-1",
        )
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));

        let cp = checkpoint("thread-1");
        store.save(&cp).await.unwrap();

        let loaded = store.load("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded, cp);
        assert!(!dir.path().join("checkpoints/thread-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load("nope").await.unwrap().is_none());
        assert!(!store.remove("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_deletes_file() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.save(&checkpoint("t")).await.unwrap();
        assert!(store.remove("t").await.unwrap());
        assert!(store.load("t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_thread_id_cannot_escape_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("cp"));
        store.save(&checkpoint("../evil")).await.unwrap();
        assert!(dir.path().join("cp/___evil.json").exists());
        assert!(store.load("../evil").await.unwrap().is_some());
    }
}
