//! Breadth-first, per-node DAG expansion.

use std::collections::HashSet;

use async_trait::async_trait;
use deep_research_core::{normalize_question, DecomposeRequest, ResearchGraph, Result};

use super::{classify, quick_summary, DagGenerator, GenerationBudget};
use crate::collaborators::Collaborators;

/// Expands the graph one depth level at a time.
///
/// For each node: a quick search for context, a format prediction, and, when
/// the depth and node budgets allow, a decomposition prediction whose
/// sub-questions become children. Sub-questions that repeat an ancestor are
/// skipped; sub-questions that repeat any other node reuse it.
pub struct IterativeGenerator {
    collab: Collaborators,
    quick_search_calls: usize,
    summary_chars: usize,
}

impl IterativeGenerator {
    pub fn new(collab: Collaborators) -> Self {
        Self {
            collab,
            quick_search_calls: 1,
            summary_chars: 500,
        }
    }

    pub fn with_quick_search_calls(mut self, calls: usize) -> Self {
        self.quick_search_calls = calls;
        self
    }

    pub fn with_summary_chars(mut self, chars: usize) -> Self {
        self.summary_chars = chars;
        self
    }

    /// Classify one node and, budget permitting, materialize its children.
    /// Returns the ids of newly created children.
    async fn expand_node(
        &self,
        graph: &mut ResearchGraph,
        node_id: &str,
        budget: &GenerationBudget,
    ) -> Result<Vec<String>> {
        let (question, depth) = {
            let node = graph.get(node_id)?;
            (node.question.clone(), node.depth)
        };

        let summary = quick_summary(
            &self.collab,
            &question,
            self.quick_search_calls,
            self.summary_chars,
        )
        .await;

        let (format, details) = classify(&self.collab, &question, &summary).await;
        {
            let node = graph.get_mut(node_id)?;
            node.expected_output_format = Some(format);
            node.set_format_details(details);
        }
        tracing::debug!(node_id, depth, format = %format, "Node classified");

        let remaining = budget.max_nodes.saturating_sub(graph.len());
        if !budget.allows_children_at(depth) || remaining == 0 {
            return Ok(Vec::new());
        }

        let request = DecomposeRequest {
            question: question.clone(),
            quick_search_summary: summary,
            current_depth: depth,
            max_depth: budget.max_depth,
            remaining_nodes: remaining,
            max_subtasks: budget.max_subtasks,
        };
        let prediction = match self
            .collab
            .bounded("decomposition", self.collab.predictor.decompose(&request))
            .await
        {
            Ok(prediction) => prediction,
            Err(e) => {
                tracing::warn!(node_id, error = %e, "Decomposition failed, keeping node as leaf");
                return Ok(Vec::new());
            }
        };

        if !prediction.should_decompose || prediction.subtasks.is_empty() {
            return Ok(Vec::new());
        }

        {
            let node = graph.get_mut(node_id)?;
            node.subtasks = prediction.subtasks.clone();
            let instructions = prediction.composition_instructions.trim();
            if !instructions.is_empty() {
                node.composition_instructions = Some(instructions.to_string());
            }
        }

        let lineage = graph.lineage_questions(node_id);
        let mut created = Vec::new();
        for subtask in prediction.subtasks.iter().take(budget.max_subtasks) {
            let normalized = normalize_question(subtask);
            if normalized.is_empty() {
                continue;
            }
            if lineage.contains(&normalized) {
                tracing::debug!(node_id, subtask = %subtask, "Skipping sub-question that repeats an ancestor");
                continue;
            }
            let is_new = graph.find_by_question(subtask).is_none();
            if is_new && graph.len() >= budget.max_nodes {
                tracing::debug!(node_id, subtask = %subtask, "Node budget reached, sub-question dropped");
                continue;
            }
            let child_id = graph
                .get_or_create_node(subtask.trim(), Some(node_id), depth + 1)
                .id
                .clone();
            if is_new {
                created.push(child_id);
            }
        }

        Ok(created)
    }
}

#[async_trait]
impl DagGenerator for IterativeGenerator {
    async fn generate(&self, topic: &str, budget: &GenerationBudget) -> Result<ResearchGraph> {
        tracing::info!(
            topic,
            max_depth = budget.max_depth,
            max_nodes = budget.max_nodes,
            max_subtasks = budget.max_subtasks,
            "Generating research DAG"
        );

        let mut graph = ResearchGraph::new();
        let root_id = graph.get_or_create_node(topic, None, 0).id.clone();

        let mut queued: HashSet<String> = HashSet::from([root_id.clone()]);
        let mut frontier = vec![root_id];
        let mut level = 0;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for node_id in &frontier {
                for child in self.expand_node(&mut graph, node_id, budget).await? {
                    if queued.insert(child.clone()) {
                        next.push(child);
                    }
                }
            }
            tracing::debug!(level, expanded = frontier.len(), created = next.len(), "Level expanded");
            frontier = next;
            level += 1;
        }

        tracing::info!(nodes = graph.len(), depth = graph.max_depth(), "DAG generation complete");
        Ok(graph)
    }
}
