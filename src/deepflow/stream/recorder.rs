// SPDX-License-Identifier: MIT

//! Conversation replay recording
//!
//! Each thread's stream is appended to `{dir}/{thread_id}.txt` in SSE framing,
//! so a recording can be fed back through [`parse_sse`](super::parse_sse).
//! Later rounds of the same thread are separated by a `conversation_separator`
//! event that clients ignore.

use super::event::{EventData, EventKind, StreamEvent};
use crate::adk::error::DeepflowError;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Recording sessions keyed by thread id
#[derive(Clone)]
pub struct ReplayRecorder {
    dir: PathBuf,
    sessions: Arc<Mutex<HashMap<String, Arc<RecordingSession>>>>,
}

impl ReplayRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open a session for `thread_id`, closing any session already open for it
    pub async fn start(&self, thread_id: &str) -> Result<Arc<RecordingSession>, DeepflowError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.remove(thread_id) {
            log::info!("Closing existing recording session for thread {}", thread_id);
            existing.close().await;
        }

        fs::create_dir_all(&self.dir).await?;
        let session = Arc::new(RecordingSession::open(&self.dir, thread_id).await?);
        sessions.insert(thread_id.to_string(), session.clone());
        log::info!("Started recording for thread {}", thread_id);
        Ok(session)
    }

    pub async fn get(&self, thread_id: &str) -> Option<Arc<RecordingSession>> {
        self.sessions.lock().await.get(thread_id).cloned()
    }

    /// Close and forget the thread's session; returns whether one was open
    pub async fn stop(&self, thread_id: &str) -> bool {
        let session = self.sessions.lock().await.remove(thread_id);
        match session {
            Some(session) => {
                session.close().await;
                log::info!("Stopped recording for thread {}", thread_id);
                true
            }
            None => false,
        }
    }

    /// Close `session` and forget it if it is still the thread's current
    /// session. A newer session for the same thread is left open.
    pub async fn finish(&self, session: &Arc<RecordingSession>) -> bool {
        let mut sessions = self.sessions.lock().await;
        let current = sessions
            .get(&session.thread_id)
            .is_some_and(|open| Arc::ptr_eq(open, session));
        if current {
            sessions.remove(&session.thread_id);
        }
        drop(sessions);

        session.close().await;
        log::info!("Finished recording for thread {}", session.thread_id);
        current
    }
}

/// One open recording file
pub struct RecordingSession {
    thread_id: String,
    path: PathBuf,
    file: Mutex<Option<File>>,
    closed: AtomicBool,
}

impl RecordingSession {
    async fn open(dir: &std::path::Path, thread_id: &str) -> Result<Self, DeepflowError> {
        let path = dir.join(format!("{}.txt", thread_id.replace(['/', '\\'], "_")));
        let existing_len = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let session = Self {
            thread_id: thread_id.to_string(),
            path,
            file: Mutex::new(Some(file)),
            closed: AtomicBool::new(false),
        };

        if existing_len > 0 {
            let separator = json!({
                "separator_type": "conversation_round",
                "timestamp": Utc::now().to_rfc3339(),
                "thread_id": thread_id,
                "round_number": Utc::now().timestamp_millis(),
            });
            session
                .write(&format!(
                    "event: conversation_separator\ndata: {}\n\n",
                    separator
                ))
                .await;
        }

        Ok(session)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Record the user's message as a finished chunk
    pub async fn record_user_message(&self, message_id: &str, content: &str) {
        let event = StreamEvent::new(
            EventKind::MessageChunk,
            EventData {
                thread_id: self.thread_id.clone(),
                id: message_id.to_string(),
                role: "user".to_string(),
                content: content.to_string(),
                finish_reason: Some("stop".to_string()),
                ..Default::default()
            },
        );
        self.record(&event).await;
    }

    pub async fn record(&self, event: &StreamEvent) {
        self.write(&event.to_sse()).await;
    }

    async fn write(&self, text: &str) {
        if self.is_closed() {
            return;
        }
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(text.as_bytes()).await {
                log::error!("Failed to write recording {}: {}", self.path.display(), e);
                self.closed.store(true, Ordering::SeqCst);
                *guard = None;
            }
        }
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            if let Err(e) = file.flush().await {
                log::warn!("Error closing recording {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deepflow::stream::parse_sse;
    use tempfile::TempDir;

    fn chunk(content: &str) -> StreamEvent {
        StreamEvent::new(
            EventKind::MessageChunk,
            EventData {
                thread_id: "t1".into(),
                id: "m1".into(),
                role: "assistant".into(),
                content: content.into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_recording_is_replayable() {
        let dir = TempDir::new().unwrap();
        let recorder = ReplayRecorder::new(dir.path());

        let session = recorder.start("t1").await.unwrap();
        session.record_user_message("u1", "research EVs").await;
        session.record(&chunk("Plan ready")).await;
        assert!(recorder.stop("t1").await);

        let text = tokio::fs::read_to_string(dir.path().join("t1.txt"))
            .await
            .unwrap();
        let events = parse_sse(&text);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data.role, "user");
        assert_eq!(events[1].data.content, "Plan ready");
    }

    #[tokio::test]
    async fn test_restart_closes_previous_session_and_separates_rounds() {
        let dir = TempDir::new().unwrap();
        let recorder = ReplayRecorder::new(dir.path());

        let first = recorder.start("t1").await.unwrap();
        first.record(&chunk("round one")).await;
        let second = recorder.start("t1").await.unwrap();

        assert!(first.is_closed());
        first.record(&chunk("ignored")).await;
        second.record(&chunk("round two")).await;
        recorder.stop("t1").await;

        let text = tokio::fs::read_to_string(dir.path().join("t1.txt"))
            .await
            .unwrap();
        assert!(text.contains("event: conversation_separator"));
        assert!(!text.contains("ignored"));
        let contents: Vec<String> = parse_sse(&text)
            .into_iter()
            .map(|e| e.data.content)
            .collect();
        assert_eq!(contents, vec!["round one", "round two"]);
    }

    #[tokio::test]
    async fn test_finishing_a_superseded_session_keeps_the_newer_one() {
        let dir = TempDir::new().unwrap();
        let recorder = ReplayRecorder::new(dir.path());

        let first = recorder.start("t1").await.unwrap();
        let second = recorder.start("t1").await.unwrap();
        assert!(!recorder.finish(&first).await);

        assert!(!second.is_closed());
        let open = recorder.get("t1").await.unwrap();
        assert!(Arc::ptr_eq(&open, &second));

        assert!(recorder.finish(&second).await);
        assert!(second.is_closed());
        assert!(recorder.get("t1").await.is_none());
    }

    #[tokio::test]
    async fn test_stop_unknown_thread() {
        let dir = TempDir::new().unwrap();
        let recorder = ReplayRecorder::new(dir.path());
        assert!(!recorder.stop("missing").await);
        assert!(recorder.get("missing").await.is_none());
    }
}
