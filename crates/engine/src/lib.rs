#![deny(unused)]
//! Research DAG engine.
//!
//! This crate builds a DAG of research sub-questions for a topic, answers
//! it bottom-up with literature search and structured prediction, and
//! composes the answers into a single report.

pub mod builder;
pub mod collaborators;
pub mod composer;
pub mod dag;
pub mod gap;
pub mod generator;
pub mod orchestrator;
pub mod processor;

pub use builder::ResearchBuilder;
pub use collaborators::Collaborators;
pub use composer::ReportComposer;
pub use dag::{merge_subtree, topological_layers, MergeOutcome};
pub use gap::{gap_filler_for, QuestionGapFiller, SubtreeGapFiller};
pub use generator::{
    generator_for, DagGenerator, GenerationBudget, IterativeGenerator, SingleShotGenerator,
};
pub use orchestrator::ResearchOrchestrator;
pub use processor::{DagProcessor, ERROR_PREFIX, NO_ANSWER};
