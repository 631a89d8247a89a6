//! Gap fillers used by parent refinement.

use std::sync::Arc;

use async_trait::async_trait;
use deep_research_core::{
    config::{GapFillingConfig, GapFillingMode},
    GapFiller, GapQuestionsRequest, OutputFormat, ResearchGraph, Result,
};

use crate::collaborators::Collaborators;
use crate::generator::{DagGenerator, GenerationBudget};

/// Asks the predictor for a few standalone questions and turns each into a
/// `report` leaf.
pub struct QuestionGapFiller {
    collab: Collaborators,
    max_questions: usize,
}

impl QuestionGapFiller {
    pub fn new(collab: Collaborators, max_questions: usize) -> Self {
        Self {
            collab,
            max_questions,
        }
    }
}

#[async_trait]
impl GapFiller for QuestionGapFiller {
    async fn fill(&self, question: &str, missing_topics: &[String]) -> Result<ResearchGraph> {
        let request = GapQuestionsRequest {
            question: question.to_string(),
            missing_topics: missing_topics.to_vec(),
        };
        let raw = self
            .collab
            .bounded(
                "gap questions",
                self.collab.predictor.generate_gap_questions(&request),
            )
            .await?;

        let mut subtree = ResearchGraph::new();
        let questions = raw
            .iter()
            .flat_map(|q| q.lines())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .take(self.max_questions);
        for q in questions {
            let node = subtree.get_or_create_node(q, None, 0);
            node.expected_output_format = Some(OutputFormat::Report);
        }

        tracing::debug!(question, added = subtree.len(), "Gap questions generated");
        Ok(subtree)
    }
}

/// Runs a DAG generator with tight budgets over the question and its missing topics.
pub struct SubtreeGapFiller {
    generator: Arc<dyn DagGenerator>,
    budget: GenerationBudget,
}

impl SubtreeGapFiller {
    pub fn new(generator: Arc<dyn DagGenerator>, budget: GenerationBudget) -> Self {
        Self { generator, budget }
    }
}

#[async_trait]
impl GapFiller for SubtreeGapFiller {
    async fn fill(&self, question: &str, missing_topics: &[String]) -> Result<ResearchGraph> {
        let topic = format!("{} (focus on: {})", question, missing_topics.join(", "));
        self.generator.generate(&topic, &self.budget).await
    }
}

/// Gap filler for the configured mode, or `None` when gap filling is disabled.
pub fn gap_filler_for(
    config: &GapFillingConfig,
    collab: Collaborators,
    generator: Arc<dyn DagGenerator>,
) -> Option<Arc<dyn GapFiller>> {
    if !config.enabled {
        return None;
    }
    Some(match config.mode {
        GapFillingMode::Questions => Arc::new(QuestionGapFiller::new(collab, config.max_questions)),
        GapFillingMode::Subtree => Arc::new(SubtreeGapFiller::new(
            generator,
            GenerationBudget::new(config.max_depth, config.max_nodes, config.max_subtasks),
        )),
    })
}
