//! Final report composition from a processed graph.

use std::collections::HashSet;

use deep_research_core::{
    CitationLedger, Document, NodeResults, NodeStatus, OutlineRequest, ReportRequest,
    ResearchGraph, ResearchNode, Result,
};

use crate::collaborators::Collaborators;

const FALLBACK_OUTLINE: &str = "## Introduction\n\n## Findings\n\n## Conclusion";
const MISSING_ANSWER: &str = "No answer available";

/// Turns a processed graph plus its results map into one report with a
/// unified bibliography.
pub struct ReportComposer {
    collab: Collaborators,
}

impl ReportComposer {
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    /// Compose the report and return it with the deduplicated citations.
    ///
    /// Fails only when the graph has no valid root. Outline and report
    /// prediction failures fall back to fixed text.
    pub async fn compose_report(
        &self,
        graph: &ResearchGraph,
        results: &NodeResults,
    ) -> Result<(String, Vec<Document>)> {
        let root = graph.root()?;
        if root.status != NodeStatus::Complete {
            tracing::warn!(root_id = %root.id, status = %root.status, "Composing report for an incomplete root");
        }

        let root_answer = answer_for(root, results).to_string();
        let dag_structure = dag_summary(graph);
        let dag_results = results_listing(graph, results);
        let citations = collect_citations(graph);

        let outline_request = OutlineRequest {
            root_question: root.question.clone(),
            root_answer: root_answer.clone(),
            root_format: root.format(),
            dag_structure,
        };
        let outline = match self
            .collab
            .bounded(
                "outline generation",
                self.collab.predictor.generate_outline(&outline_request),
            )
            .await
        {
            Ok(outline) if !outline.trim().is_empty() => outline,
            Ok(_) => FALLBACK_OUTLINE.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Outline generation failed, using generic outline");
                FALLBACK_OUTLINE.to_string()
            }
        };

        let report_request = ReportRequest {
            outline,
            root_question: root.question.clone(),
            root_answer: root_answer.clone(),
            root_format: root.format(),
            dag_results: dag_results.clone(),
        };
        let fallback = || {
            format!(
                "# {}\n\n{}\n\n## Research Process\n\n{}",
                root.question, root_answer, dag_results
            )
        };
        let mut report = match self
            .collab
            .bounded(
                "report generation",
                self.collab.predictor.generate_report(&report_request),
            )
            .await
        {
            Ok(report) if !report.trim().is_empty() => report,
            Ok(_) => fallback(),
            Err(e) => {
                tracing::warn!(error = %e, "Report generation failed, using raw results");
                fallback()
            }
        };

        report.push_str(&bibliography(&citations));
        tracing::info!(
            chars = report.len(),
            citations = citations.len(),
            "Final report composed"
        );
        Ok((report, citations))
    }
}

fn answer_for<'a>(node: &'a ResearchNode, results: &'a NodeResults) -> &'a str {
    results
        .get(&node.id)
        .map(String::as_str)
        .or_else(|| node.answer())
        .unwrap_or(MISSING_ANSWER)
}

/// Indented `- question (Format: fmt)` lines, two spaces per level, from the root down.
pub fn dag_summary(graph: &ResearchGraph) -> String {
    fn walk(graph: &ResearchGraph, id: &str, level: usize, path: &mut HashSet<String>, out: &mut Vec<String>) {
        let Some(node) = graph.node(id) else {
            return;
        };
        if !path.insert(id.to_string()) {
            return;
        }
        out.push(format!(
            "{}- {} (Format: {})",
            "  ".repeat(level),
            node.question,
            node.format()
        ));
        for child in &node.children {
            walk(graph, child, level + 1, path, out);
        }
        path.remove(id);
    }

    let mut lines = Vec::new();
    if let Some(root) = graph.root_id() {
        walk(graph, root, 0, &mut HashSet::new(), &mut lines);
    }
    lines.join("\n")
}

/// Every node's answer, sorted by `(depth, id)`.
pub fn results_listing(graph: &ResearchGraph, results: &NodeResults) -> String {
    let mut nodes: Vec<&ResearchNode> = graph.iter().collect();
    nodes.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.id.cmp(&b.id)));
    nodes
        .into_iter()
        .map(|node| {
            format!(
                "Node {} (depth={}):\nQuestion: {}\nFormat: {}\nAnswer:\n{}",
                node.id,
                node.depth,
                node.question,
                node.format(),
                answer_for(node, results)
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

/// Union of every node's documents, deduplicated by url in first-seen order.
pub fn collect_citations(graph: &ResearchGraph) -> Vec<Document> {
    let mut ledger = CitationLedger::new();
    for node in graph.iter() {
        ledger.extend(&node.cited_documents);
    }
    ledger.into_documents()
}

/// `## References` section, or nothing when there are no citations.
pub fn bibliography(citations: &[Document]) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let mut section = String::from("\n\n## References\n\n");
    for (i, doc) in citations.iter().enumerate() {
        section.push_str(&format!("[{}] {} - {}\n", i + 1, doc.display_title(), doc.url));
    }
    section
}
