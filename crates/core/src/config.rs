//! Layered configuration for a research run.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ResearchConfig {
    pub generation: GenerationConfig,
    pub processing: ProcessingConfig,
    pub gap_filling: GapFillingConfig,
    pub telemetry: TelemetryConfig,
    pub output: OutputConfig,
}

/// Which generator implementation builds the initial graph.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorStrategy {
    /// Breadth-first per-node expansion.
    #[default]
    Iterative,
    /// One prediction for the whole graph.
    SingleShot,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub strategy: GeneratorStrategy,
    /// Levels below the root; the root alone is depth 0.
    pub max_depth: usize,
    pub max_nodes: usize,
    pub max_subtasks: usize,
    /// Retriever budget for the quick search that informs generation.
    pub quick_search_calls: usize,
    /// How much of the quick-search writeup is passed to the predictor.
    pub summary_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            strategy: GeneratorStrategy::Iterative,
            max_depth: 2,
            max_nodes: 50,
            max_subtasks: 10,
            quick_search_calls: 1,
            summary_chars: 500,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProcessingConfig {
    pub max_retriever_calls: usize,
    pub max_refinements: usize,
    /// How many nested levels of refinement-within-refinement are allowed.
    pub max_gap_depth: usize,
    /// Total attempts per node, including the first.
    pub node_attempts: usize,
    pub call_timeout_secs: Option<u64>,
}

impl ProcessingConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_retriever_calls: 3,
            max_refinements: 1,
            max_gap_depth: 1,
            node_attempts: 2,
            call_timeout_secs: None,
        }
    }
}

/// How gap-filling subtrees are produced during refinement.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GapFillingMode {
    /// Predictor proposes a few standalone questions, each becomes a leaf.
    #[default]
    Questions,
    /// The DAG generator builds a small subtree with tight budgets.
    Subtree,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GapFillingConfig {
    pub enabled: bool,
    pub mode: GapFillingMode,
    pub max_questions: usize,
    pub max_depth: usize,
    pub max_nodes: usize,
    pub max_subtasks: usize,
}

impl Default for GapFillingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: GapFillingMode::Questions,
            max_questions: 2,
            max_depth: 2,
            max_nodes: 3,
            max_subtasks: 2,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    /// Overrides `RUST_LOG` when set.
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for the JSON run recorder; nothing is written when unset.
    pub run_dir: Option<String>,
}

impl ResearchConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("DEEP_RESEARCH_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map DEEP_RESEARCH__PROCESSING__MAX_REFINEMENTS=2 to processing.max_refinements
            .add_source(Environment::with_prefix("DEEP_RESEARCH").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
