// SPDX-License-Identifier: MIT

//! deepflow-rs: a checkpointed, human-in-the-loop research workflow engine.
//!
//! - [`adk`] holds the workflow-agnostic agent toolkit (models, tools, the tool-calling agent)
//! - [`deepflow`] holds the research graph, its state model, nodes and streaming layer

pub mod adk;
pub mod deepflow;
