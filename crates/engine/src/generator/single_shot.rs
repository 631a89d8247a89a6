//! Whole-graph generation from a single planner prediction.

use std::collections::HashMap;

use anyhow::{bail, Context};
use async_trait::async_trait;
use deep_research_core::{
    normalize_question, ChildOutline, ComposeInstructionsRequest, OutputFormat, PlanDagRequest,
    ResearchGraph, Result,
};
use serde::Deserialize;
use serde_json::Value;

use super::{quick_summary, DagGenerator, GenerationBudget};
use crate::collaborators::Collaborators;

/// One record of the planner's flat node list.
#[derive(Debug, Clone, Deserialize)]
struct PlanRecord {
    #[serde(default)]
    id: Value,
    question: String,
    #[serde(default)]
    parent_id: Value,
    #[serde(default)]
    expected_output_format: Option<String>,
    #[serde(default)]
    composition_instructions: Option<String>,
}

/// Planner ids may be strings or numbers; null and empty mean "none".
fn plan_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the node list from planner output.
///
/// Accepts a bare JSON array, an object holding the array under `nodes` or
/// `dag`, or either of those embedded in surrounding prose or a code fence.
/// Individual records that do not parse are skipped.
fn parse_plan(text: &str) -> anyhow::Result<Vec<PlanRecord>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        bail!("planner returned no output");
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => {
            let start = trimmed.find('[').context("no JSON array in planner output")?;
            let end = trimmed.rfind(']').context("unterminated JSON array in planner output")?;
            if end <= start {
                bail!("malformed JSON array in planner output");
            }
            serde_json::from_str(&trimmed[start..=end]).context("planner array is not valid JSON")?
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("nodes").or_else(|| map.remove("dag")) {
            Some(Value::Array(items)) => items,
            _ => bail!("planner object has no node list"),
        },
        _ => bail!("planner output is neither an array nor an object"),
    };

    let total = items.len();
    let records: Vec<PlanRecord> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .filter(|r: &PlanRecord| !r.question.trim().is_empty())
        .collect();
    if records.len() < total {
        tracing::warn!(skipped = total - records.len(), "Skipped malformed planner records");
    }
    Ok(records)
}

/// Materialize planner records under the budget.
///
/// Parents are resolved iteratively: a record is placed once its parent has
/// been placed, until a pass makes no progress. The first parentless record
/// becomes the root; further parentless records hang below it.
fn build_graph(records: Vec<PlanRecord>, budget: &GenerationBudget) -> ResearchGraph {
    let mut graph = ResearchGraph::new();
    let mut placed: HashMap<String, String> = HashMap::new();

    let Some(root_pos) = records.iter().position(|r| plan_key(&r.parent_id).is_none()) else {
        tracing::warn!(records = records.len(), "Planner output has no root record");
        return graph;
    };

    let mut pending = records;
    let root = pending.remove(root_pos);
    let root_id = graph.get_or_create_node(root.question.trim(), None, 0).id.clone();
    apply_record(&mut graph, &root_id, &root);
    if let Some(key) = plan_key(&root.id) {
        placed.insert(key, root_id.clone());
    }

    loop {
        let before = pending.len();
        let mut unresolved = Vec::new();

        for record in pending {
            let parent_id = match plan_key(&record.parent_id) {
                None => Some(root_id.clone()),
                Some(key) => placed.get(&key).cloned(),
            };
            let Some(parent_id) = parent_id else {
                unresolved.push(record);
                continue;
            };

            if let Some(node_id) = place_record(&mut graph, &parent_id, &record, budget) {
                if let Some(key) = plan_key(&record.id) {
                    placed.entry(key).or_insert(node_id);
                }
            }
        }

        pending = unresolved;
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    if !pending.is_empty() {
        tracing::warn!(dropped = pending.len(), "Dropped planner records with unresolvable parents");
    }
    graph
}

/// Place one record below `parent_id`, enforcing every budget. Returns the
/// node it maps to, or `None` if it was dropped.
fn place_record(
    graph: &mut ResearchGraph,
    parent_id: &str,
    record: &PlanRecord,
    budget: &GenerationBudget,
) -> Option<String> {
    let question = record.question.trim();
    let (parent_depth, parent_children) = {
        let parent = graph.node(parent_id)?;
        (parent.depth, parent.children.len())
    };

    if !budget.allows_children_at(parent_depth) {
        tracing::debug!(question, "Planner record exceeds max depth, dropped");
        return None;
    }
    if graph.lineage_questions(parent_id).contains(&normalize_question(question)) {
        tracing::debug!(question, "Planner record repeats an ancestor, dropped");
        return None;
    }
    let existing = graph.find_by_question(question).map(|n| n.id.clone());
    if let Some(existing) = &existing {
        if graph.reaches(existing, parent_id) {
            return None;
        }
    }
    let already_child = existing
        .as_ref()
        .map(|id| graph.node(parent_id).map(|p| p.children.contains(id)).unwrap_or(false))
        .unwrap_or(false);
    if !already_child && parent_children >= budget.max_subtasks {
        tracing::debug!(question, parent_id, "Parent reached max subtasks, record dropped");
        return None;
    }
    if existing.is_none() && graph.len() >= budget.max_nodes {
        tracing::debug!(question, "Node budget reached, record dropped");
        return None;
    }

    let node_id = graph
        .get_or_create_node(question, Some(parent_id), parent_depth + 1)
        .id
        .clone();
    if let Some(parent) = graph.node_mut(parent_id) {
        parent.subtasks.push(question.to_string());
    }
    if existing.is_none() {
        apply_record(graph, &node_id, record);
    }
    Some(node_id)
}

fn apply_record(graph: &mut ResearchGraph, node_id: &str, record: &PlanRecord) {
    if let Some(node) = graph.node_mut(node_id) {
        node.expected_output_format = Some(
            record
                .expected_output_format
                .as_deref()
                .map(OutputFormat::clamp)
                .unwrap_or(OutputFormat::Report),
        );
        node.composition_instructions = record
            .composition_instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }
}

/// Plans the whole graph with one search and one planner call.
pub struct SingleShotGenerator {
    collab: Collaborators,
    quick_search_calls: usize,
    summary_chars: usize,
}

impl SingleShotGenerator {
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

    /// Ask the predictor for composition instructions on every parent, citing
    /// children by id. Failures leave the planner's instructions in place.
    async fn fill_composition_instructions(&self, graph: &mut ResearchGraph) {
        let parents: Vec<String> = graph
            .iter()
            .filter(|n| !n.is_leaf())
            .map(|n| n.id.clone())
            .collect();

        for parent_id in parents {
            let Some(parent) = graph.node(&parent_id) else {
                continue;
            };
            let request = ComposeInstructionsRequest {
                question: parent.question.clone(),
                expected_format: parent.format(),
                children: parent
                    .children
                    .iter()
                    .filter_map(|c| graph.node(c))
                    .map(|child| ChildOutline {
                        id: child.id.clone(),
                        question: child.question.clone(),
                        expected_format: child.format(),
                    })
                    .collect(),
            };

            match self
                .collab
                .bounded(
                    "composition instructions",
                    self.collab.predictor.compose_instructions(&request),
                )
                .await
            {
                Ok(instructions) if !instructions.trim().is_empty() => {
                    if let Some(node) = graph.node_mut(&parent_id) {
                        node.composition_instructions = Some(instructions.trim().to_string());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(node_id = %parent_id, error = %e, "Composition instructions failed");
                }
            }
        }
    }
}

#[async_trait]
impl DagGenerator for SingleShotGenerator {
    async fn generate(&self, topic: &str, budget: &GenerationBudget) -> Result<ResearchGraph> {
        tracing::info!(topic, max_nodes = budget.max_nodes, "Planning research DAG in one shot");

        let summary =
            quick_summary(&self.collab, topic, self.quick_search_calls, self.summary_chars).await;

        let request = PlanDagRequest {
            topic: topic.to_string(),
            context_summary: summary,
            max_depth: budget.max_depth,
            max_nodes: budget.max_nodes,
            max_subtasks: budget.max_subtasks,
        };
        let records = match self
            .collab
            .bounded("DAG planning", self.collab.predictor.plan_dag(&request))
            .await
        {
            Ok(prediction) => match parse_plan(&prediction.dag_json) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(error = %e, "Unusable planner output");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "DAG planning failed");
                Vec::new()
            }
        };

        let mut graph = build_graph(records, budget);
        if graph.is_empty() {
            tracing::warn!(topic, "Falling back to a single-node graph");
            let root = graph.get_or_create_node(topic, None, 0);
            root.expected_output_format = Some(OutputFormat::Report);
            return Ok(graph);
        }

        self.fill_composition_instructions(&mut graph).await;

        tracing::info!(nodes = graph.len(), depth = graph.max_depth(), "DAG planning complete");
        Ok(graph)
    }
}
