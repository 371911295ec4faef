// SPDX-License-Identifier: MIT

//! Streaming: wire events, the emitter nodes publish through, the merger that
//! folds events into client messages, and replay recording.

mod emitter;
mod event;
mod merger;
mod recorder;

pub use emitter::EventEmitter;
pub use event::{parse_sse, EventData, EventKind, StreamEvent, WireToolCall, WireToolCallChunk};
pub use merger::{MergedMessage, MergedToolCall, MessageMerger};
pub use recorder::{RecordingSession, ReplayRecorder};
