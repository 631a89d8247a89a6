//! Structured-prediction collaborator.
//!
//! Each operation takes a fixed set of named inputs and yields a fixed set of
//! named outputs. How the prediction is produced (prompting, model choice,
//! parsing) is outside the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::OutputFormat;

// =============================================================================
// Generation
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatRequest {
    pub question: String,
    pub context_summary: String,
}

/// `format_type` is free text; callers clamp it with [`OutputFormat::clamp`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatPrediction {
    pub format_type: String,
    pub format_details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecomposeRequest {
    pub question: String,
    pub quick_search_summary: String,
    pub current_depth: usize,
    pub max_depth: usize,
    pub remaining_nodes: usize,
    pub max_subtasks: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecomposePrediction {
    pub should_decompose: bool,
    pub subtasks: Vec<String>,
    pub composition_instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDagRequest {
    pub topic: String,
    pub context_summary: String,
    pub max_depth: usize,
    pub max_nodes: usize,
    pub max_subtasks: usize,
}

/// Raw planner output: a JSON array of
/// `{id, question, parent_id, expected_output_format, composition_instructions}`
/// records, possibly wrapped in prose or a code fence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanDagPrediction {
    pub dag_json: String,
}

/// A child as seen from its parent when writing composition instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildOutline {
    pub id: String,
    pub question: String,
    pub expected_format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeInstructionsRequest {
    pub question: String,
    pub expected_format: OutputFormat,
    pub children: Vec<ChildOutline>,
}

// =============================================================================
// Processing
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafAnswerRequest {
    pub question: String,
    pub literature_search_results: String,
    pub expected_format: OutputFormat,
    pub format_details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub question: String,
    /// `Child i: <question>\nAnswer:\n<answer>` blocks.
    pub child_results: String,
    /// `[n] title - url` lines; the only indices the answer may cite.
    pub citations: String,
    pub composition_instructions: String,
    pub expected_format: OutputFormat,
    pub format_details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub question: String,
    pub composed_answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationPrediction {
    pub is_sufficient: bool,
    pub missing_topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapQuestionsRequest {
    pub question: String,
    pub missing_topics: Vec<String>,
}

// =============================================================================
// Final report
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineRequest {
    pub root_question: String,
    pub root_answer: String,
    pub root_format: OutputFormat,
    pub dag_structure: String,
}

/// The report must keep the root answer's stance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub outline: String,
    pub root_question: String,
    pub root_answer: String,
    pub root_format: OutputFormat,
    pub dag_results: String,
}

/// Structured predictor used by generation, processing, and report composition.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn classify_format(&self, request: &FormatRequest) -> Result<FormatPrediction>;

    async fn decompose(&self, request: &DecomposeRequest) -> Result<DecomposePrediction>;

    /// Whole-graph plan for single-shot generation.
    async fn plan_dag(&self, request: &PlanDagRequest) -> Result<PlanDagPrediction>;

    async fn compose_instructions(&self, request: &ComposeInstructionsRequest) -> Result<String>;

    async fn format_leaf_answer(&self, request: &LeafAnswerRequest) -> Result<String>;

    async fn synthesize_parent(&self, request: &SynthesisRequest) -> Result<String>;

    async fn validate_composition(&self, request: &ValidationRequest) -> Result<ValidationPrediction>;

    async fn generate_gap_questions(&self, request: &GapQuestionsRequest) -> Result<Vec<String>>;

    async fn generate_outline(&self, request: &OutlineRequest) -> Result<String>;

    async fn generate_report(&self, request: &ReportRequest) -> Result<String>;
}
