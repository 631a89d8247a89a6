use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::Document;

/// Metadata key holding phrasing guidance for a node's answer.
pub const META_FORMAT_DETAILS: &str = "format_details";
/// Metadata key holding a node's computed answer.
pub const META_ANSWER: &str = "answer";
/// Metadata key set on gap-filling nodes: the refinement pass that created them.
pub const META_REFINEMENT_ITERATION: &str = "refinement_iteration";
/// Metadata key set on gap-filling nodes: the node that requested them.
pub const META_PARENT_NODE: &str = "parent_node";

/// Lowercase, trim, and collapse internal whitespace. This is the node identity key.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// =============================================================================
// Node Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
    /// Transient sub-state of `InProgress` while a parent fills gaps.
    Refining,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Refining => "refining",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Output Format
// =============================================================================

/// How a node's answer must be phrased, and how its parent consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Boolean,
    ShortAnswer,
    List,
    TableCsv,
    Report,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Boolean,
        OutputFormat::ShortAnswer,
        OutputFormat::List,
        OutputFormat::TableCsv,
        OutputFormat::Report,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::ShortAnswer => "short_answer",
            Self::List => "list",
            Self::TableCsv => "table_csv",
            Self::Report => "report",
        }
    }

    /// Clamp a free-form label into the vocabulary, falling back to `Report`.
    pub fn clamp(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Report)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "boolean" | "bool" => Ok(Self::Boolean),
            "short_answer" => Ok(Self::ShortAnswer),
            "list" => Ok(Self::List),
            "table_csv" | "csv" | "table" => Ok(Self::TableCsv),
            "report" => Ok(Self::Report),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Research Node
// =============================================================================

/// One research sub-question in the DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchNode {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub normalized_question: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub status: NodeStatus,
    /// Fixed at creation; later parents at other depths do not change it.
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub expected_output_format: Option<OutputFormat>,
    #[serde(default)]
    pub composition_instructions: Option<String>,
    /// Raw child questions proposed during generation.
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub cited_documents: Vec<Document>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Only populated on the root once processed.
    #[serde(default)]
    pub report: Option<String>,
}

impl ResearchNode {
    pub fn new(id: impl Into<String>, question: impl Into<String>, depth: usize) -> Self {
        let question = question.into();
        Self {
            id: id.into(),
            normalized_question: normalize_question(&question),
            question,
            parents: Vec::new(),
            children: Vec::new(),
            status: NodeStatus::Pending,
            depth,
            expected_output_format: None,
            composition_instructions: None,
            subtasks: Vec::new(),
            cited_documents: Vec::new(),
            metadata: Map::new(),
            report: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The expected format, or `Report` when none was assigned.
    pub fn format(&self) -> OutputFormat {
        self.expected_output_format.unwrap_or(OutputFormat::Report)
    }

    pub fn format_details(&self) -> &str {
        self.metadata
            .get(META_FORMAT_DETAILS)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn set_format_details(&mut self, details: impl Into<String>) {
        self.metadata
            .insert(META_FORMAT_DETAILS.to_string(), Value::String(details.into()));
    }

    pub fn answer(&self) -> Option<&str> {
        self.metadata.get(META_ANSWER).and_then(Value::as_str)
    }

    pub fn set_answer(&mut self, answer: impl Into<String>) {
        self.metadata
            .insert(META_ANSWER.to_string(), Value::String(answer.into()));
    }

    pub fn clear_answer(&mut self) {
        self.metadata.remove(META_ANSWER);
    }

    pub fn composition_instructions(&self) -> Option<&str> {
        self.composition_instructions
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert_eq!(
            normalize_question("  What IS\tthe   GDP\nof France? "),
            "what is the gdp of france?"
        );
        assert_eq!(normalize_question(""), "");
    }

    #[test]
    fn format_parsing_is_lenient_and_clamps() {
        assert_eq!("Short Answer".parse::<OutputFormat>(), Ok(OutputFormat::ShortAnswer));
        assert_eq!("table-csv".parse::<OutputFormat>(), Ok(OutputFormat::TableCsv));
        assert_eq!(OutputFormat::clamp(" LIST "), OutputFormat::List);
        assert_eq!(OutputFormat::clamp("essay"), OutputFormat::Report);
    }

    #[test]
    fn metadata_accessors() {
        let mut node = ResearchNode::new("node_1", "Q", 0);
        assert_eq!(node.format_details(), "");
        assert!(node.answer().is_none());
        node.set_format_details("A yes/no with justification");
        node.set_answer("Yes.");
        assert_eq!(node.format_details(), "A yes/no with justification");
        assert_eq!(node.answer(), Some("Yes."));
        node.clear_answer();
        assert!(node.answer().is_none());
        assert_eq!(node.format(), OutputFormat::Report);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(NodeStatus::InProgress).unwrap();
        assert_eq!(json, "in_progress");
        assert!(NodeStatus::Failed.is_terminal());
        assert!(!NodeStatus::Refining.is_terminal());
    }
}
