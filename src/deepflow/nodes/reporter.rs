// SPDX-License-Identifier: MIT

use super::prompts;
use crate::adk::agent::stream_turn;
use crate::adk::error::DeepflowError;
use crate::adk::model::{Content, Model};
use crate::deepflow::graph::{Command, Goto, Node, NodeName, NodeOutcome, RunContext};
use crate::deepflow::state::{State, StateDelta};
use async_trait::async_trait;
use std::sync::Arc;

/// Writes the final report from the plan and the collected observations
pub struct ReporterNode {
    model: Arc<dyn Model>,
}

impl ReporterNode {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    fn messages(state: &State) -> Vec<Content> {
        let (task, description) = match &state.current_plan {
            Some(plan) => (plan.title.clone(), plan.thought.clone()),
            None => (
                state
                    .last_user_message()
                    .map(|m| m.content.clone())
                    .unwrap_or_default(),
                String::new(),
            ),
        };

        let mut history = vec![
            Content::system(prompts::reporter(&state.locale)),
            Content::user(format!(
                "# Research Requirements\n\n## Task\n\n{}\n\n## Description\n\n{}",
                task, description
            )),
            Content::user(prompts::REPORT_FORMAT_REMINDER),
        ];
        for observation in &state.observations {
            history.push(Content::user(format!(
                "Below are some observations for the research task:\n\n{}",
                observation
            )));
        }
        history
    }
}

#[async_trait]
impl Node for ReporterNode {
    fn name(&self) -> NodeName {
        NodeName::Reporter
    }

    async fn run(&self, state: &State, ctx: &RunContext) -> Result<NodeOutcome, DeepflowError> {
        log::info!("Reporter write final report");
        let history = Self::messages(state);
        let model = self.model.as_ref();
        let history = &history;

        let response = ctx
            .emitter
            .relay("reporter", |tx| async move {
                stream_turn(model, history, None, None, Some(&tx)).await
            })
            .await?;
        let report = response.text_content();
        log::info!("Final report written ({} chars)", report.len());

        Ok(Command::goto(Goto::End)
            .with_update(StateDelta::new().final_report(report))
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;
    use crate::adk::model::GenerationConfig;
    use crate::adk::tool::Tool;
    use crate::deepflow::config::RunConfig;
    use crate::deepflow::graph::CancelFlag;
    use crate::deepflow::plan::Plan;
    use crate::deepflow::state::Message;
    use crate::deepflow::stream::{EventEmitter, EventKind};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct EchoCount(Mutex<Vec<Vec<Content>>>);

    #[async_trait]
    impl Model for EchoCount {
        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
            _tools: Option<&[Arc<dyn Tool>]>,
        ) -> Result<Content, ModelError> {
            self.0.lock().unwrap().push(history.to_vec());
            Ok(Content::model(format!("# Report\n\n{} inputs", history.len())))
        }
    }

    #[tokio::test]
    async fn test_report_uses_plan_and_observations() {
        let model = Arc::new(EchoCount(Mutex::new(Vec::new())));
        let node = ReporterNode::new(model.clone());
        let mut state = State::with_messages(vec![Message::user("EV market")]);
        state.current_plan = Some(Plan {
            locale: "en-US".into(),
            has_enough_context: false,
            thought: "Compare EV makers".into(),
            title: "EV market".into(),
            steps: Vec::new(),
        });
        state.observations = vec!["obs one".into(), "obs two".into()];

        let (tx, mut rx) = mpsc::channel(16);
        let ctx = RunContext {
            thread_id: "t1".into(),
            config: RunConfig::default(),
            emitter: EventEmitter::new("t1", tx),
            cancel: CancelFlag::new(),
        };

        let outcome = node.run(&state, &ctx).await.unwrap();
        let cmd = match outcome {
            NodeOutcome::Command(cmd) => cmd,
            NodeOutcome::Interrupt(_) => panic!("reporter never interrupts"),
        };
        assert_eq!(cmd.goto, Goto::End);
        assert_eq!(cmd.update.final_report.as_deref(), Some("# Report\n\n5 inputs"));

        let seen = model.0.lock().unwrap();
        assert!(seen[0][1].text_content().contains("## Description\n\nCompare EV makers"));
        assert!(seen[0][4].text_content().ends_with("obs two"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::MessageChunk);
        assert_eq!(event.data.agent.as_deref(), Some("reporter"));
    }

    #[tokio::test]
    async fn test_report_without_plan_uses_user_query() {
        let model = Arc::new(EchoCount(Mutex::new(Vec::new())));
        let node = ReporterNode::new(model.clone());
        let state = State::with_messages(vec![Message::user("What is an EV?")]);

        let ctx = RunContext {
            thread_id: "t1".into(),
            config: RunConfig::default(),
            emitter: EventEmitter::disabled("t1"),
            cancel: CancelFlag::new(),
        };
        node.run(&state, &ctx).await.unwrap();
        let seen = model.0.lock().unwrap();
        assert!(seen[0][1].text_content().contains("## Task\n\nWhat is an EV?"));
    }
}
