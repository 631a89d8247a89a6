//! DAG generation: turn a topic into a budgeted graph of sub-questions.
//!
//! Two interchangeable strategies sit behind [`DagGenerator`]:
//! - [`IterativeGenerator`]: breadth-first, one quick search and prediction per node
//! - [`SingleShotGenerator`]: one search and one whole-graph prediction

pub mod iterative;
pub mod single_shot;

use std::sync::Arc;

use async_trait::async_trait;
use deep_research_core::{
    config::{GenerationConfig, GeneratorStrategy},
    FormatRequest, OutputFormat, ResearchGraph, Result, SearchRequest,
};

use crate::collaborators::Collaborators;

pub use iterative::IterativeGenerator;
pub use single_shot::SingleShotGenerator;

pub(crate) const QUICK_SEARCH_GUIDELINE: &str = "Quick overview to inform task decomposition";
pub(crate) const NO_SEARCH_RESULTS: &str = "No literature search results available";

/// Hard limits for one generated graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationBudget {
    /// Levels below the root. Every node satisfies `depth < max_depth`,
    /// except the lone root when `max_depth` is 0.
    pub max_depth: usize,
    pub max_nodes: usize,
    pub max_subtasks: usize,
}

impl GenerationBudget {
    pub fn new(max_depth: usize, max_nodes: usize, max_subtasks: usize) -> Self {
        Self {
            max_depth,
            max_nodes,
            max_subtasks,
        }
    }

    /// Whether a node at `depth` may have children.
    pub fn allows_children_at(&self, depth: usize) -> bool {
        depth + 1 < self.max_depth
    }
}

impl From<&GenerationConfig> for GenerationBudget {
    fn from(config: &GenerationConfig) -> Self {
        Self::new(config.max_depth, config.max_nodes, config.max_subtasks)
    }
}

/// Builds the initial research graph for a topic.
///
/// Implementations never fail because a collaborator failed: per-node failures
/// fall back to a `report` format and no children.
#[async_trait]
pub trait DagGenerator: Send + Sync {
    async fn generate(&self, topic: &str, budget: &GenerationBudget) -> Result<ResearchGraph>;
}

/// Generator for the configured strategy.
pub fn generator_for(config: &GenerationConfig, collab: Collaborators) -> Arc<dyn DagGenerator> {
    match config.strategy {
        GeneratorStrategy::Iterative => Arc::new(
            IterativeGenerator::new(collab)
                .with_quick_search_calls(config.quick_search_calls)
                .with_summary_chars(config.summary_chars),
        ),
        GeneratorStrategy::SingleShot => Arc::new(
            SingleShotGenerator::new(collab)
                .with_quick_search_calls(config.quick_search_calls)
                .with_summary_chars(config.summary_chars),
        ),
    }
}

/// Quick literature search used as decomposition context, truncated to
/// `summary_chars` characters. Falls back to a fixed sentence on failure.
pub(crate) async fn quick_summary(
    collab: &Collaborators,
    topic: &str,
    retriever_calls: usize,
    summary_chars: usize,
) -> String {
    let request = SearchRequest::new(topic, retriever_calls, QUICK_SEARCH_GUIDELINE);
    match collab.search(&request).await {
        Ok(response) if !response.writeup.trim().is_empty() => {
            response.writeup.chars().take(summary_chars).collect()
        }
        Ok(_) => NO_SEARCH_RESULTS.to_string(),
        Err(e) => {
            tracing::warn!(topic, error = %e, "Quick search failed, continuing without context");
            NO_SEARCH_RESULTS.to_string()
        }
    }
}

/// Predict the output format for a question; `report` with no details on failure.
pub(crate) async fn classify(
    collab: &Collaborators,
    question: &str,
    context_summary: &str,
) -> (OutputFormat, String) {
    let request = FormatRequest {
        question: question.to_string(),
        context_summary: context_summary.to_string(),
    };
    match collab
        .bounded("format classification", collab.predictor.classify_format(&request))
        .await
    {
        Ok(prediction) => {
            let format = match prediction.format_type.parse::<OutputFormat>() {
                Ok(format) => format,
                Err(e) => {
                    tracing::warn!(question, error = %e, "Unknown format, using report");
                    OutputFormat::Report
                }
            };
            (format, prediction.format_details)
        }
        Err(e) => {
            tracing::warn!(question, error = %e, "Format classification failed, using report");
            (OutputFormat::Report, String::new())
        }
    }
}
