//! Run artifact persistence.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{GraphSnapshot, RunConfigRecord};

/// Step names used for the standard run artifacts.
pub mod steps {
    pub const RUN_CONFIG: &str = "00_run_config";
    pub const DAG_GENERATION: &str = "00_dag_generation";
    pub const DAG_PROCESSED: &str = "01_dag_processed";
    pub const FINAL_REPORT: &str = "02_final_report";
    pub const PROCESSING_SNAPSHOT: &str = "dag_processing_snapshot";
}

/// Persists the run configuration, live snapshots, and named step artifacts.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn record_config(&self, run_id: &str, config: &RunConfigRecord) -> Result<()>;

    /// Latest snapshot wins.
    async fn record_snapshot(&self, run_id: &str, snapshot: &GraphSnapshot) -> Result<()>;

    async fn record_step(&self, run_id: &str, step: &str, data: Value) -> Result<()>;
}
