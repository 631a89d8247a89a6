//! Bottom-up processing of a research graph.
//!
//! Layers run in order. Within a layer every leaf runs concurrently and the
//! layer waits for all of them; parents then run one at a time, because a
//! parent may refine itself by grafting and processing a gap subtree.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;

use deep_research_core::{
    config::ProcessingConfig, CitationLedger, Document, Error, GapFiller, GraphSnapshot,
    LeafAnswerRequest, NodeResults, NodeStatus, OutputFormat, ResearchGraph, ResearchNode, Result,
    SearchRequest, SnapshotObserver, SynthesisRequest, ValidationRequest, META_PARENT_NODE,
    META_REFINEMENT_ITERATION, SOURCE_SNAPSHOT,
};

use crate::collaborators::Collaborators;
use crate::dag;

const LEAF_SEARCH_GUIDELINE: &str = "Comprehensive search to answer the research question";
const DEFAULT_COMPOSITION: &str = "Combine the child results to answer the parent question.";
const MISSING_CHILD_ANSWER: &str = "No answer available";

/// Answer recorded for a node whose formatted answer or synthesis came back empty.
pub const NO_ANSWER: &str = "No answer available.";
/// Prefix of the answer recorded for a node that exhausted its attempts.
pub const ERROR_PREFIX: &str = "ERROR: Processing failed: ";

/// Fills in every node's answer, leaves first.
pub struct DagProcessor {
    collab: Collaborators,
    config: ProcessingConfig,
    gap_filler: Option<Arc<dyn GapFiller>>,
}

/// Mutable state of one `process` call.
struct RunState {
    graph: ResearchGraph,
    results: NodeResults,
    /// Nodes that reached a terminal state in this pass.
    done: HashSet<String>,
    observer: Option<Arc<dyn SnapshotObserver>>,
}

impl RunState {
    fn emit(&self) {
        let Some(observer) = &self.observer else {
            return;
        };
        let snapshot = GraphSnapshot::capture(&self.graph, SOURCE_SNAPSHOT);
        if let Err(e) = observer.on_snapshot(&snapshot) {
            tracing::warn!(error = %e, "Snapshot observer failed");
        }
    }

    fn set_status(&mut self, id: &str, status: NodeStatus) {
        if let Some(node) = self.graph.node_mut(id) {
            node.status = status;
        }
    }

    /// Store the answer in the results map and on the node; the root also
    /// mirrors it into `report`.
    fn record(&mut self, id: &str, answer: String, status: NodeStatus) {
        let is_root = self.graph.root_id() == Some(id);
        if let Some(node) = self.graph.node_mut(id) {
            node.set_answer(answer.clone());
            node.report = is_root.then(|| answer.clone());
            node.status = status;
        }
        self.results.insert(id.to_string(), answer);
        self.done.insert(id.to_string());
    }

    fn complete_leaf(&mut self, id: &str, answer: String, citations: Vec<Document>) {
        if let Some(node) = self.graph.node_mut(id) {
            node.cited_documents = citations;
        }
        self.record(id, answer, NodeStatus::Complete);
        tracing::debug!(node_id = id, "Leaf complete");
    }

    fn fail(&mut self, id: &str, error: &Error) {
        if let Some(node) = self.graph.node_mut(id) {
            node.cited_documents.clear();
        }
        self.record(id, format!("{}{}", ERROR_PREFIX, error), NodeStatus::Failed);
    }

    /// Clear everything an attempt may have left on the node.
    fn reset(&mut self, id: &str) {
        self.results.remove(id);
        if let Some(node) = self.graph.node_mut(id) {
            node.clear_answer();
            node.cited_documents.clear();
            node.report = None;
            node.status = NodeStatus::InProgress;
        }
    }
}

/// Owned inputs of one leaf, so leaves can run without borrowing the graph.
struct LeafJob {
    id: String,
    question: String,
    format: OutputFormat,
    format_details: String,
}

impl From<&ResearchNode> for LeafJob {
    fn from(node: &ResearchNode) -> Self {
        Self {
            id: node.id.clone(),
            question: node.question.clone(),
            format: node.format(),
            format_details: node.format_details().to_string(),
        }
    }
}

impl DagProcessor {
    pub fn new(collab: Collaborators, config: ProcessingConfig) -> Self {
        Self {
            collab,
            config,
            gap_filler: None,
        }
    }

    /// Enable refinement. Without a gap filler parents never refine.
    pub fn with_gap_filler(mut self, gap_filler: Option<Arc<dyn GapFiller>>) -> Self {
        self.gap_filler = gap_filler;
        self
    }

    /// Override the per-leaf retriever budget and the refinement budget.
    pub fn with_budget(mut self, max_retriever_calls: usize, max_refinements: usize) -> Self {
        self.config.max_retriever_calls = max_retriever_calls;
        self.config.max_refinements = max_refinements;
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Process every node bottom-up.
    ///
    /// The retriever-call budget per leaf search and the refinement budget per
    /// parent come from `ProcessingConfig::{max_retriever_calls,
    /// max_refinements}`, set at construction or through
    /// [`DagProcessor::with_budget`]. `observer` receives a snapshot at every
    /// status transition.
    ///
    /// Returns the mutated graph and the `node_id -> answer` map. Individual
    /// node failures are recorded on the node; only a graph that cannot be
    /// layered fails the call.
    pub async fn process(
        &self,
        graph: ResearchGraph,
        observer: Option<Arc<dyn SnapshotObserver>>,
    ) -> Result<(ResearchGraph, NodeResults)> {
        let layers = dag::topological_layers(&graph)?;
        tracing::info!(
            nodes = graph.len(),
            layers = layers.len(),
            max_retriever_calls = self.config.max_retriever_calls,
            max_refinements = self.config.max_refinements,
            "Processing research DAG"
        );

        let mut state = RunState {
            graph,
            results: NodeResults::new(),
            done: HashSet::new(),
            observer,
        };
        self.process_layers(&mut state, layers, 0).await;

        tracing::info!(
            nodes = state.graph.len(),
            complete = state.graph.count_status(NodeStatus::Complete),
            failed = state.graph.count_status(NodeStatus::Failed),
            "DAG processing complete"
        );
        Ok((state.graph, state.results))
    }

    fn process_layers<'a>(
        &'a self,
        state: &'a mut RunState,
        layers: Vec<Vec<String>>,
        gap_depth: usize,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for (index, layer) in layers.into_iter().enumerate() {
                let pending: Vec<String> = layer
                    .into_iter()
                    .filter(|id| !state.done.contains(id) && state.graph.contains(id))
                    .collect();
                if pending.is_empty() {
                    continue;
                }

                for id in &pending {
                    state.set_status(id, NodeStatus::InProgress);
                }
                tracing::debug!(layer = index, nodes = pending.len(), gap_depth, "Layer started");
                state.emit();

                let (leaves, parents): (Vec<String>, Vec<String>) = pending
                    .into_iter()
                    .partition(|id| state.graph.node(id).map(ResearchNode::is_leaf).unwrap_or(true));

                let mut jobs: FuturesUnordered<_> = leaves
                    .iter()
                    .filter_map(|id| state.graph.node(id))
                    .map(LeafJob::from)
                    .map(|job| self.run_leaf(job))
                    .collect();
                while let Some((id, outcome)) = jobs.next().await {
                    match outcome {
                        Ok((answer, citations)) => state.complete_leaf(&id, answer, citations),
                        Err(e) => {
                            tracing::error!(node_id = %id, error = %e, "Leaf failed after all attempts");
                            state.fail(&id, &e);
                        }
                    }
                    state.emit();
                }

                for id in parents {
                    self.process_parent_with_retry(state, &id, gap_depth).await;
                    state.emit();
                }

                tracing::debug!(layer = index, gap_depth, "Layer finished");
                state.emit();
            }
        })
    }

    // =========================================================================
    // Leaves
    // =========================================================================

    async fn run_leaf(&self, job: LeafJob) -> (String, Result<(String, Vec<Document>)>) {
        let attempts = self.config.node_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.research_leaf(&job).await {
                Ok(outcome) => return (job.id, Ok(outcome)),
                Err(e) => {
                    tracing::warn!(node_id = %job.id, attempt, attempts, error = %e, "Leaf attempt failed");
                    last_err = Some(e);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| Error::internal("no attempt was made"));
        (job.id, Err(err))
    }

    /// Search, then format the writeup. A formatting failure falls back to the
    /// raw writeup; a search failure fails the attempt.
    async fn research_leaf(&self, job: &LeafJob) -> Result<(String, Vec<Document>)> {
        tracing::debug!(node_id = %job.id, "Leaf search");
        let request = SearchRequest::new(
            &job.question,
            self.config.max_retriever_calls,
            LEAF_SEARCH_GUIDELINE,
        );
        let response = self.collab.search(&request).await?;

        let format_request = LeafAnswerRequest {
            question: job.question.clone(),
            literature_search_results: response.writeup.clone(),
            expected_format: job.format,
            format_details: job.format_details.clone(),
        };
        let formatted = match self
            .collab
            .bounded(
                "leaf answer formatting",
                self.collab.predictor.format_leaf_answer(&format_request),
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(node_id = %job.id, error = %e, "Formatting failed, using raw writeup");
                response.writeup.clone()
            }
        };

        let trimmed = formatted.trim();
        let answer = if trimmed.is_empty() {
            NO_ANSWER.to_string()
        } else {
            trimmed.to_string()
        };
        Ok((answer, response.cited_documents))
    }

    // =========================================================================
    // Parents
    // =========================================================================

    async fn process_parent_with_retry(&self, state: &mut RunState, id: &str, gap_depth: usize) {
        let attempts = self.config.node_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.process_parent(state, id, gap_depth).await {
                Ok(answer) => {
                    state.record(id, answer, NodeStatus::Complete);
                    tracing::debug!(node_id = id, attempt, "Parent complete");
                    return;
                }
                Err(e) => {
                    tracing::warn!(node_id = id, attempt, attempts, error = %e, "Parent attempt failed");
                    state.reset(id);
                    last_err = Some(e);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| Error::internal("no attempt was made"));
        tracing::error!(node_id = id, error = %err, "Parent failed after all attempts");
        state.fail(id, &err);
    }

    /// Synthesize from the children, then refine while the validator reports
    /// gaps and budget remains. At most `max_refinements + 1` syntheses run.
    async fn process_parent(&self, state: &mut RunState, id: &str, gap_depth: usize) -> Result<String> {
        let max_refinements = self.config.max_refinements;
        let mut answer = String::new();

        for iteration in 0..=max_refinements {
            let (question, format, format_details, instructions) = {
                let node = state.graph.get(id)?;
                (
                    node.question.clone(),
                    node.format(),
                    node.format_details().to_string(),
                    node.composition_instructions()
                        .unwrap_or(DEFAULT_COMPOSITION)
                        .to_string(),
                )
            };

            let (child_results, ledger) = gather_children(&state.graph, &state.results, id)?;
            let request = SynthesisRequest {
                question: question.clone(),
                child_results: child_results.clone(),
                citations: citation_block(&ledger),
                composition_instructions: instructions,
                expected_format: format,
                format_details,
            };
            answer = match self
                .collab
                .bounded(
                    "parent synthesis",
                    self.collab.predictor.synthesize_parent(&request),
                )
                .await
            {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => {
                    tracing::warn!(node_id = id, "Empty synthesis");
                    NO_ANSWER.to_string()
                }
                Err(e) => {
                    tracing::warn!(node_id = id, error = %e, "Synthesis failed, using concatenation");
                    format!("# {}\n\n{}", question, child_results)
                }
            };
            state.graph.get_mut(id)?.cited_documents = ledger.into_documents();
            tracing::debug!(node_id = id, iteration, "Parent synthesized");

            if iteration >= max_refinements {
                break;
            }
            let Some(filler) = &self.gap_filler else {
                break;
            };
            if gap_depth >= self.config.max_gap_depth {
                tracing::debug!(node_id = id, gap_depth, "Gap depth exhausted, no refinement");
                break;
            }
            let Some(missing) = self.find_gaps(id, &question, &answer).await else {
                break;
            };

            tracing::info!(node_id = id, iteration, missing = ?missing, "Gaps detected, refining");
            state.set_status(id, NodeStatus::Refining);
            state.emit();

            let refined = self
                .refine(state, filler.as_ref(), id, &question, &missing, iteration + 1, gap_depth)
                .await;
            state.set_status(id, NodeStatus::InProgress);
            state.emit();

            if !refined? {
                break;
            }
        }

        Ok(answer)
    }

    /// Missing topics reported by the validator, or `None` to stop refining.
    async fn find_gaps(&self, id: &str, question: &str, answer: &str) -> Option<Vec<String>> {
        let request = ValidationRequest {
            question: question.to_string(),
            composed_answer: answer.to_string(),
        };
        match self
            .collab
            .bounded(
                "composition validation",
                self.collab.predictor.validate_composition(&request),
            )
            .await
        {
            Ok(validation) => {
                let topics: Vec<String> = validation
                    .missing_topics
                    .iter()
                    .flat_map(|t| t.split(','))
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                if validation.is_sufficient || topics.is_empty() {
                    tracing::debug!(node_id = id, "Answer sufficient");
                    None
                } else {
                    Some(topics)
                }
            }
            Err(e) => {
                tracing::warn!(node_id = id, error = %e, "Validation failed, skipping refinement");
                None
            }
        }
    }

    /// Build, graft, and process one gap subtree. Returns false when nothing
    /// new was added.
    #[allow(clippy::too_many_arguments)]
    async fn refine(
        &self,
        state: &mut RunState,
        filler: &dyn GapFiller,
        id: &str,
        question: &str,
        missing: &[String],
        refinement: usize,
        gap_depth: usize,
    ) -> Result<bool> {
        let subtree = match filler.fill(question, missing).await {
            Ok(subtree) => subtree,
            Err(e) => {
                tracing::warn!(node_id = id, error = %e, "Gap filling failed");
                return Ok(false);
            }
        };
        if subtree.is_empty() {
            tracing::debug!(node_id = id, "Gap filler produced nothing");
            return Ok(false);
        }

        let salt = format!("{}_r{}", id, refinement);
        let outcome = dag::merge_subtree(&mut state.graph, &subtree, id, &salt)?;
        if outcome.is_empty() {
            tracing::debug!(node_id = id, dropped = outcome.dropped, "Gap subtree added nothing new");
            return Ok(false);
        }

        for new_id in &outcome.created {
            if let Some(node) = state.graph.node_mut(new_id) {
                node.metadata
                    .insert(META_REFINEMENT_ITERATION.to_string(), json!(refinement));
                if node.parents.iter().any(|p| p == id) {
                    node.metadata.insert(META_PARENT_NODE.to_string(), json!(id));
                }
            }
        }
        tracing::info!(
            node_id = id,
            created = outcome.created.len(),
            reused = outcome.reused.len(),
            "Gap subtree merged"
        );
        state.emit();

        let pending: HashSet<String> = dag::descendants(&state.graph, id)
            .into_iter()
            .filter(|d| !state.done.contains(d))
            .collect();
        let layers = dag::layers_for(&state.graph, &pending)?;
        self.process_layers(state, layers, gap_depth + 1).await;
        Ok(true)
    }
}

/// `Child i: <question>\nAnswer:\n<answer>` blocks plus a ledger over every
/// child's documents.
fn gather_children(
    graph: &ResearchGraph,
    results: &NodeResults,
    id: &str,
) -> Result<(String, CitationLedger)> {
    let node = graph.get(id)?;
    let mut blocks = Vec::with_capacity(node.children.len());
    let mut ledger = CitationLedger::new();

    for (i, child_id) in node.children.iter().enumerate() {
        let Some(child) = graph.node(child_id) else {
            continue;
        };
        let answer = results
            .get(child_id)
            .map(String::as_str)
            .or_else(|| child.answer())
            .unwrap_or(MISSING_CHILD_ANSWER);
        blocks.push(format!("Child {}: {}\nAnswer:\n{}\n", i + 1, child.question, answer));
        ledger.extend(&child.cited_documents);
    }

    Ok((blocks.join("\n"), ledger))
}

/// `[n] title - url` per ledger entry.
fn citation_block(ledger: &CitationLedger) -> String {
    ledger
        .documents()
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] {} - {}", i + 1, doc.display_title(), doc.url))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_share_one_citation_numbering() {
        let mut graph = ResearchGraph::new();
        let root = graph.get_or_create_node("Root", None, 0).id.clone();
        let a = graph.get_or_create_node("A", Some(&root), 1).id.clone();
        let b = graph.get_or_create_node("B", Some(&root), 1).id.clone();
        graph.get_mut(&a).unwrap().cited_documents = vec![
            Document::new("https://one").with_title("One"),
            Document::new("https://two"),
        ];
        graph.get_mut(&b).unwrap().cited_documents = vec![
            Document::new("https://two"),
            Document::new("https://three").with_title("Three"),
        ];
        let mut results = NodeResults::new();
        results.insert(a.clone(), "Answer A".into());

        let (text, ledger) = gather_children(&graph, &results, &root).unwrap();
        assert_eq!(ledger.len(), 3);
        assert!(text.starts_with("Child 1: A\nAnswer:\nAnswer A\n"));
        assert!(text.contains("Child 2: B\nAnswer:\nNo answer available\n"));
        assert_eq!(
            citation_block(&ledger),
            "[1] One - https://one\n[2] Untitled - https://two\n[3] Three - https://three"
        );
    }
}
