//! Mock implementations of core traits for testing.
//!
//! The mocks are scripted per normalized question, so tests can describe a
//! whole research tree up front and then assert on call counts.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    traits::{
        ComposeInstructionsRequest, DecomposePrediction, DecomposeRequest, FormatPrediction,
        FormatRequest, GapQuestionsRequest, LeafAnswerRequest, LiteratureSearch, OutlineRequest,
        PlanDagPrediction, PlanDagRequest, Predictor, ReportRequest, SearchRequest,
        SearchResponse, SnapshotObserver, SynthesisRequest, ValidationPrediction,
        ValidationRequest,
    },
    types::{normalize_question, Document, GraphSnapshot, NodeStatus},
    Error, Result,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Mock Literature Search
// =============================================================================

/// Literature search returning canned writeups and documents per topic.
///
/// Unscripted topics get the writeup `Findings about <topic>.` and no documents.
#[derive(Default)]
pub struct MockLiteratureSearch {
    writeups: HashMap<String, String>,
    documents: HashMap<String, Vec<Document>>,
    /// Remaining forced failures per topic.
    failures: Mutex<HashMap<String, usize>>,
    always_fail: bool,
    requests: Mutex<Vec<SearchRequest>>,
}

impl MockLiteratureSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writeup(mut self, topic: &str, writeup: &str) -> Self {
        self.writeups
            .insert(normalize_question(topic), writeup.to_string());
        self
    }

    pub fn with_documents(mut self, topic: &str, documents: Vec<Document>) -> Self {
        self.documents.insert(normalize_question(topic), documents);
        self
    }

    /// Fail the first `times` searches for `topic`, then succeed.
    pub fn fail_first(self, topic: &str, times: usize) -> Self {
        lock(&self.failures).insert(normalize_question(topic), times);
        self
    }

    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Total number of searches made.
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Number of searches made for `topic`.
    pub fn calls_for(&self, topic: &str) -> usize {
        let key = normalize_question(topic);
        lock(&self.requests)
            .iter()
            .filter(|r| normalize_question(&r.topic) == key)
            .count()
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LiteratureSearch for MockLiteratureSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        lock(&self.requests).push(request.clone());
        let key = normalize_question(&request.topic);

        if self.always_fail {
            return Err(Error::search(format!("search unavailable for '{}'", request.topic)));
        }
        {
            let mut failures = lock(&self.failures);
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::search(format!("transient failure for '{}'", request.topic)));
                }
            }
        }

        let writeup = self
            .writeups
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("Findings about {}.", request.topic));
        Ok(SearchResponse {
            writeup,
            cited_documents: self.documents.get(&key).cloned().unwrap_or_default(),
        })
    }
}

// =============================================================================
// Scripted Predictor
// =============================================================================

/// Named predictor operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredictorOp {
    ClassifyFormat,
    Decompose,
    PlanDag,
    ComposeInstructions,
    FormatLeafAnswer,
    SynthesizeParent,
    ValidateComposition,
    GenerateGapQuestions,
    GenerateOutline,
    GenerateReport,
}

/// Predictor whose answers are scripted per normalized question.
///
/// Defaults: every node is formatted as `report`, nothing decomposes, leaf
/// answers are `<format>: <writeup>`, every synthesis is judged sufficient.
#[derive(Default)]
pub struct ScriptedPredictor {
    formats: HashMap<String, (String, String)>,
    decompositions: HashMap<String, Vec<String>>,
    plan: Option<String>,
    insufficient: HashMap<String, Vec<String>>,
    always_insufficient: Option<Vec<String>>,
    gap_questions: Option<Vec<String>>,
    failing: HashSet<PredictorOp>,
    blank_synthesis: bool,
    calls: Mutex<HashMap<PredictorOp, usize>>,
    syntheses: Mutex<Vec<SynthesisRequest>>,
    reports: Mutex<Vec<ReportRequest>>,
}

impl ScriptedPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, question: &str, format: &str, details: &str) -> Self {
        self.formats.insert(
            normalize_question(question),
            (format.to_string(), details.to_string()),
        );
        self
    }

    /// Script `question` to decompose into `subtasks`.
    pub fn with_decomposition(mut self, question: &str, subtasks: &[&str]) -> Self {
        self.decompositions.insert(
            normalize_question(question),
            subtasks.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Raw text returned by `plan_dag`.
    pub fn with_plan(mut self, dag_json: &str) -> Self {
        self.plan = Some(dag_json.to_string());
        self
    }

    /// Validator reports `question`'s synthesis as missing `topics`.
    pub fn with_insufficient(mut self, question: &str, topics: &[&str]) -> Self {
        self.insufficient.insert(
            normalize_question(question),
            topics.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Validator reports every synthesis as missing `topics`.
    pub fn always_insufficient(mut self, topics: &[&str]) -> Self {
        self.always_insufficient = Some(topics.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Fixed gap questions instead of one per missing topic.
    pub fn with_gap_questions(mut self, questions: &[&str]) -> Self {
        self.gap_questions = Some(questions.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Make every call to `op` fail.
    pub fn failing(mut self, op: PredictorOp) -> Self {
        self.failing.insert(op);
        self
    }

    /// Every synthesis comes back as whitespace.
    pub fn with_blank_synthesis(mut self) -> Self {
        self.blank_synthesis = true;
        self
    }

    pub fn calls(&self, op: PredictorOp) -> usize {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    pub fn synthesis_requests(&self) -> Vec<SynthesisRequest> {
        lock(&self.syntheses).clone()
    }

    pub fn report_requests(&self) -> Vec<ReportRequest> {
        lock(&self.reports).clone()
    }

    fn enter(&self, op: PredictorOp) -> Result<()> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;
        if self.failing.contains(&op) {
            return Err(Error::predictor(format!("{:?} failed", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl Predictor for ScriptedPredictor {
    async fn classify_format(&self, request: &FormatRequest) -> Result<FormatPrediction> {
        self.enter(PredictorOp::ClassifyFormat)?;
        let (format_type, format_details) = self
            .formats
            .get(&normalize_question(&request.question))
            .cloned()
            .unwrap_or_else(|| ("report".to_string(), String::new()));
        Ok(FormatPrediction {
            format_type,
            format_details,
        })
    }

    async fn decompose(&self, request: &DecomposeRequest) -> Result<DecomposePrediction> {
        self.enter(PredictorOp::Decompose)?;
        match self.decompositions.get(&normalize_question(&request.question)) {
            Some(subtasks) => Ok(DecomposePrediction {
                should_decompose: true,
                subtasks: subtasks.clone(),
                composition_instructions: "Combine the child answers.".to_string(),
            }),
            None => Ok(DecomposePrediction::default()),
        }
    }

    async fn plan_dag(&self, _request: &PlanDagRequest) -> Result<PlanDagPrediction> {
        self.enter(PredictorOp::PlanDag)?;
        Ok(PlanDagPrediction {
            dag_json: self.plan.clone().unwrap_or_default(),
        })
    }

    async fn compose_instructions(&self, request: &ComposeInstructionsRequest) -> Result<String> {
        self.enter(PredictorOp::ComposeInstructions)?;
        let ids: Vec<&str> = request.children.iter().map(|c| c.id.as_str()).collect();
        Ok(format!("Combine {}.", ids.join(", ")))
    }

    async fn format_leaf_answer(&self, request: &LeafAnswerRequest) -> Result<String> {
        self.enter(PredictorOp::FormatLeafAnswer)?;
        Ok(format!(
            "{}: {}",
            request.expected_format, request.literature_search_results
        ))
    }

    async fn synthesize_parent(&self, request: &SynthesisRequest) -> Result<String> {
        self.enter(PredictorOp::SynthesizeParent)?;
        lock(&self.syntheses).push(request.clone());
        if self.blank_synthesis {
            return Ok("  \n".to_string());
        }
        Ok(format!("Synthesis for {}:\n{}", request.question, request.child_results))
    }

    async fn validate_composition(&self, request: &ValidationRequest) -> Result<ValidationPrediction> {
        self.enter(PredictorOp::ValidateComposition)?;
        let missing = self
            .insufficient
            .get(&normalize_question(&request.question))
            .or(self.always_insufficient.as_ref());
        Ok(match missing {
            Some(topics) => ValidationPrediction {
                is_sufficient: false,
                missing_topics: topics.clone(),
            },
            None => ValidationPrediction {
                is_sufficient: true,
                missing_topics: Vec::new(),
            },
        })
    }

    async fn generate_gap_questions(&self, request: &GapQuestionsRequest) -> Result<Vec<String>> {
        self.enter(PredictorOp::GenerateGapQuestions)?;
        Ok(match &self.gap_questions {
            Some(questions) => questions.clone(),
            None => request
                .missing_topics
                .iter()
                .map(|topic| format!("What is known about {}?", topic))
                .collect(),
        })
    }

    async fn generate_outline(&self, _request: &OutlineRequest) -> Result<String> {
        self.enter(PredictorOp::GenerateOutline)?;
        Ok("## Overview\n\n## Details".to_string())
    }

    async fn generate_report(&self, request: &ReportRequest) -> Result<String> {
        self.enter(PredictorOp::GenerateReport)?;
        lock(&self.reports).push(request.clone());
        Ok(format!("# {}\n\n{}", request.root_question, request.root_answer))
    }
}

// =============================================================================
// Recording Observer
// =============================================================================

/// Snapshot observer that keeps every snapshot it sees.
#[derive(Default)]
pub struct RecordingObserver {
    snapshots: Mutex<Vec<GraphSnapshot>>,
    fail: bool,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records snapshots but reports an error for each one.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn count(&self) -> usize {
        lock(&self.snapshots).len()
    }

    pub fn snapshots(&self) -> Vec<GraphSnapshot> {
        lock(&self.snapshots).clone()
    }

    /// Distinct consecutive statuses `node_id` went through across snapshots.
    pub fn status_trail(&self, node_id: &str) -> Vec<NodeStatus> {
        let mut trail: Vec<NodeStatus> = Vec::new();
        for snapshot in lock(&self.snapshots).iter() {
            if let Some(node) = snapshot.graph.node(node_id) {
                if trail.last() != Some(&node.status) {
                    trail.push(node.status);
                }
            }
        }
        trail
    }
}

impl SnapshotObserver for RecordingObserver {
    fn on_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()> {
        lock(&self.snapshots).push(snapshot.clone());
        if self.fail {
            return Err(Error::internal("observer rejected snapshot"));
        }
        Ok(())
    }
}
