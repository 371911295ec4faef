// SPDX-License-Identifier: MIT

use crate::adk::error::DeepflowError;
use crate::deepflow::graph::{Command, Node, NodeName, NodeOutcome, RunContext};
use crate::deepflow::plan::{Plan, StepType};
use crate::deepflow::state::State;
use async_trait::async_trait;

/// Pick the node for the plan's first unexecuted step. Anything that cannot
/// be executed goes back to the planner.
pub fn schedule(plan: Option<&Plan>) -> NodeName {
    let Some(plan) = plan else {
        return NodeName::Planner;
    };
    match plan.steps.iter().find(|s| !s.is_executed()) {
        Some(step) => match step.step_type {
            StepType::Research => NodeName::Researcher,
            StepType::Processing => NodeName::Coder,
            StepType::Unknown => NodeName::Planner,
        },
        None => NodeName::Planner,
    }
}

pub struct ResearchTeamNode;

#[async_trait]
impl Node for ResearchTeamNode {
    fn name(&self) -> NodeName {
        NodeName::ResearchTeam
    }

    async fn run(&self, state: &State, _ctx: &RunContext) -> Result<NodeOutcome, DeepflowError> {
        let next = schedule(state.current_plan.as_ref());
        log::info!("Research team routes to {}", next);
        Ok(Command::goto(next).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deepflow::plan::{parse_plan, ParseQuality, Step};

    fn plan(steps: Vec<Step>) -> Plan {
        Plan {
            locale: "en-US".into(),
            has_enough_context: false,
            thought: "t".into(),
            title: "EV market".into(),
            steps,
        }
    }

    #[test]
    fn test_missing_or_empty_plan_goes_to_planner() {
        assert_eq!(schedule(None), NodeName::Planner);
        assert_eq!(schedule(Some(&plan(Vec::new()))), NodeName::Planner);
    }

    #[test]
    fn test_research_then_processing_then_planner() {
        let p = plan(vec![
            Step::new("A", StepType::Research),
            Step::new("B", StepType::Processing),
        ]);
        assert_eq!(schedule(Some(&p)), NodeName::Researcher);

        let p = p.with_step_result(0, "found A");
        assert_eq!(schedule(Some(&p)), NodeName::Coder);

        let p = p.with_step_result(1, "computed B");
        assert_eq!(schedule(Some(&p)), NodeName::Planner);
    }

    #[test]
    fn test_only_first_unexecuted_step_counts() {
        let p = plan(vec![
            Step::new("A", StepType::Unknown),
            Step::new("B", StepType::Research),
        ]);
        assert_eq!(schedule(Some(&p)), NodeName::Planner);

        let p = plan(vec![
            Step::new("A", StepType::Research),
            Step::new("B", StepType::Processing),
        ])
        .with_step_result(1, "out of order");
        assert_eq!(schedule(Some(&p)), NodeName::Researcher);
    }

    #[test]
    fn test_recovered_processing_step_goes_to_coder() {
        // No `thought`, so the plan only survives best-effort recovery
        let raw = r#"{"title": "EV", "steps": [{"title": "Compute growth", "step_type": "processing", "need_search": false}]}"#;
        let (p, quality) = parse_plan(raw);
        assert_eq!(quality, ParseQuality::BestEffort);
        assert_eq!(schedule(Some(&p)), NodeName::Coder);
    }
}
