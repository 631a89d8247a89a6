//! In-memory run recorder using DashMap.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use deep_research_core::{GraphSnapshot, Result, RunConfigRecord, RunRecorder};

/// Keeps every artifact of every run in concurrent maps.
///
/// Only the latest snapshot per run is retained; the count of snapshots seen
/// is tracked separately.
#[derive(Debug, Default)]
pub struct InMemoryRunRecorder {
    configs: DashMap<String, RunConfigRecord>,
    snapshots: DashMap<String, GraphSnapshot>,
    snapshot_counts: DashMap<String, usize>,
    /// (run_id, step) -> data
    steps: DashMap<(String, String), Value>,
}

impl InMemoryRunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self, run_id: &str) -> Option<RunConfigRecord> {
        self.configs.get(run_id).map(|r| r.value().clone())
    }

    pub fn latest_snapshot(&self, run_id: &str) -> Option<GraphSnapshot> {
        self.snapshots.get(run_id).map(|r| r.value().clone())
    }

    pub fn snapshot_count(&self, run_id: &str) -> usize {
        self.snapshot_counts.get(run_id).map(|r| *r.value()).unwrap_or(0)
    }

    pub fn step(&self, run_id: &str, step: &str) -> Option<Value> {
        self.steps
            .get(&(run_id.to_string(), step.to_string()))
            .map(|r| r.value().clone())
    }

    /// Step names recorded for a run, sorted.
    pub fn steps(&self, run_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .steps
            .iter()
            .filter(|r| r.key().0 == run_id)
            .map(|r| r.key().1.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of runs with a recorded configuration.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[async_trait]
impl RunRecorder for InMemoryRunRecorder {
    async fn record_config(&self, run_id: &str, config: &RunConfigRecord) -> Result<()> {
        self.configs.insert(run_id.to_string(), config.clone());
        Ok(())
    }

    async fn record_snapshot(&self, run_id: &str, snapshot: &GraphSnapshot) -> Result<()> {
        self.snapshots.insert(run_id.to_string(), snapshot.clone());
        *self.snapshot_counts.entry(run_id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn record_step(&self, run_id: &str, step: &str, data: Value) -> Result<()> {
        self.steps.insert((run_id.to_string(), step.to_string()), data);
        Ok(())
    }
}
