//! Records describing a whole research run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::Document;
use super::graph::ResearchGraph;
use crate::config::{GeneratorStrategy, ResearchConfig};

/// Out-of-band `node_id -> answer text` map. Canonical source of node answers.
pub type NodeResults = HashMap<String, String>;

/// Parameters a run was started with; persisted before generation begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfigRecord {
    pub run_id: String,
    pub topic: String,
    pub max_retriever_calls: usize,
    pub max_depth: usize,
    pub max_nodes: usize,
    pub max_subtasks: usize,
    pub max_refinements: usize,
    pub strategy: GeneratorStrategy,
    /// Whether the graph was loaded instead of generated.
    pub prebuilt_graph: bool,
    pub started_at: DateTime<Utc>,
}

impl RunConfigRecord {
    pub fn new(run_id: impl Into<String>, topic: impl Into<String>, config: &ResearchConfig) -> Self {
        Self {
            run_id: run_id.into(),
            topic: topic.into(),
            max_retriever_calls: config.processing.max_retriever_calls,
            max_depth: config.generation.max_depth,
            max_nodes: config.generation.max_nodes,
            max_subtasks: config.generation.max_subtasks,
            max_refinements: config.processing.max_refinements,
            strategy: config.generation.strategy,
            prebuilt_graph: false,
            started_at: Utc::now(),
        }
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub run_id: String,
    pub report: String,
    pub citations: Vec<Document>,
    pub root_node_id: String,
    pub graph: ResearchGraph,
    pub results: NodeResults,
}
