// SPDX-License-Identifier: MIT

//! Router: drives a thread through the graph until END or a suspension

use super::{CancelFlag, Command, Goto, NodeName, NodeOutcome, NodeRegistry, RunContext};
use crate::adk::error::{DeepflowError, WorkflowError};
use crate::deepflow::checkpoint::{Checkpoint, CheckpointStore};
use crate::deepflow::config::RunConfig;
use crate::deepflow::state::State;
use crate::deepflow::stream::{EventEmitter, StreamEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-invocation options
#[derive(Clone, Default)]
pub struct RunOptions {
    pub config: RunConfig,
    /// Stream sink; events are dropped when unset
    pub events: Option<mpsc::Sender<StreamEvent>>,
    pub cancel: CancelFlag,
}

impl RunOptions {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<StreamEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn context(&self, thread_id: &str) -> RunContext {
        let emitter = match &self.events {
            Some(tx) => EventEmitter::new(thread_id, tx.clone()),
            None => EventEmitter::disabled(thread_id),
        };
        RunContext {
            thread_id: thread_id.to_string(),
            config: self.config.clone(),
            emitter,
            cancel: self.cancel.clone(),
        }
    }
}

/// How an invocation ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(State),
    /// Suspended waiting for feedback; the checkpoint has been stored
    Interrupted(Checkpoint),
}

impl RunOutcome {
    pub fn state(&self) -> &State {
        match self {
            RunOutcome::Completed(state) => state,
            RunOutcome::Interrupted(checkpoint) => &checkpoint.state,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// The research workflow: a validated node registry plus checkpoint storage
#[derive(Clone)]
pub struct Workflow {
    registry: NodeRegistry,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Workflow {
    pub fn new(registry: NodeRegistry, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            registry,
            checkpoints,
        }
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Start a new run at the entry node, superseding any stale checkpoint
    pub async fn run(
        &self,
        thread_id: &str,
        state: State,
        options: RunOptions,
    ) -> Result<RunOutcome, DeepflowError> {
        let ctx = options.context(thread_id);
        log::info!("Starting workflow for thread {}", thread_id);

        let result = async {
            if self.checkpoints.remove(thread_id).await? {
                log::info!("Discarded stale checkpoint for thread {}", thread_id);
            }
            self.drive(&ctx, state, Goto::Node(NodeName::ENTRY), 0).await
        }
        .await;
        self.finish(&ctx, result).await
    }

    /// Resume the thread's suspended run with the user's feedback
    pub async fn resume(
        &self,
        thread_id: &str,
        feedback: &str,
        options: RunOptions,
    ) -> Result<RunOutcome, DeepflowError> {
        match self.checkpoints.load(thread_id).await {
            Ok(Some(checkpoint)) => self.resume_from(checkpoint, feedback, options).await,
            Ok(None) => {
                let ctx = options.context(thread_id);
                let err = WorkflowError::NoCheckpoint(thread_id.to_string()).into();
                self.finish(&ctx, Err(err)).await
            }
            Err(e) => {
                let ctx = options.context(thread_id);
                self.finish(&ctx, Err(e)).await
            }
        }
    }

    /// Re-enter the suspended node of `checkpoint` with `feedback`.
    ///
    /// The stored checkpoint is only removed once the node accepted the
    /// feedback, so a rejected resume can be retried.
    pub async fn resume_from(
        &self,
        checkpoint: Checkpoint,
        feedback: &str,
        options: RunOptions,
    ) -> Result<RunOutcome, DeepflowError> {
        let ctx = options.context(&checkpoint.thread_id);
        log::info!(
            "Resuming thread {} at {}",
            checkpoint.thread_id,
            checkpoint.node
        );

        let result = async {
            let node = self.registry.get(checkpoint.node)?;
            let command = node.resume(&checkpoint.state, &ctx, feedback).await?;
            checkpoint.node.check_edge(command.goto)?;

            let state = checkpoint.state.clone().apply(command.update);
            self.checkpoints.remove(&checkpoint.thread_id).await?;
            self.drive(&ctx, state, command.goto, 1).await
        }
        .await;
        self.finish(&ctx, result).await
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        mut state: State,
        mut goto: Goto,
        mut steps: u32,
    ) -> Result<RunOutcome, DeepflowError> {
        let limit = ctx.config.recursion_limit;
        loop {
            let current = match goto {
                Goto::End => {
                    log::info!("Thread {} reached END after {} step(s)", ctx.thread_id, steps);
                    return Ok(RunOutcome::Completed(state));
                }
                Goto::Node(name) => name,
            };

            if ctx.cancel.is_cancelled() {
                return Err(DeepflowError::Cancelled);
            }
            steps += 1;
            if steps > limit {
                return Err(DeepflowError::RecursionLimit { limit });
            }

            log::info!("Thread {} -> {} (step {})", ctx.thread_id, current, steps);
            let node = self.registry.get(current)?;
            let outcome = node.run(&state, ctx).await?;
            if ctx.cancel.is_cancelled() {
                log::info!("Discarding result of {} after cancellation", current);
                return Err(DeepflowError::Cancelled);
            }

            match outcome {
                NodeOutcome::Command(Command { update, goto: next }) => {
                    current.check_edge(next)?;
                    state = state.apply(update);
                    goto = next;
                }
                NodeOutcome::Interrupt(request) => {
                    let interrupt_id = Uuid::new_v4().to_string();
                    let checkpoint =
                        Checkpoint::new(&ctx.thread_id, state, current, request, &interrupt_id);
                    self.checkpoints.save(&checkpoint).await?;
                    ctx.emitter
                        .interrupt(
                            current.as_str(),
                            &interrupt_id,
                            &checkpoint.prompt,
                            &checkpoint.options,
                        )
                        .await;
                    log::info!("Thread {} suspended at {}", ctx.thread_id, current);
                    return Ok(RunOutcome::Interrupted(checkpoint));
                }
            }
        }
    }

    async fn finish(
        &self,
        ctx: &RunContext,
        result: Result<RunOutcome, DeepflowError>,
    ) -> Result<RunOutcome, DeepflowError> {
        if let Err(e) = &result {
            log::error!("Thread {} failed: {}", ctx.thread_id, e);
            ctx.emitter.error(&e.to_string()).await;
        }
        result
    }
}
