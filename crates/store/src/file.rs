//! JSON-file run recorder.
//!
//! Layout: `<root>/<run_id>/<step>.json`, each file wrapping its payload as
//! `{step, timestamp, data, metadata}`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use deep_research_core::{
    steps, Error, GraphSnapshot, ResearchGraph, Result, RunConfigRecord, RunRecorder,
};

/// Writes run artifacts as pretty-printed JSON files.
#[derive(Debug, Clone)]
pub struct FileRunRecorder {
    root: PathBuf,
}

impl FileRunRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    pub fn step_path(&self, run_id: &str, step: &str) -> PathBuf {
        self.run_dir(run_id).join(format!("{}.json", step))
    }

    /// Read back the `data` of a recorded step, if the file exists.
    pub async fn read_step(&self, run_id: &str, step: &str) -> Result<Option<Value>> {
        let path = self.step_path(run_id, step);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        let mut wrapper = read_json(&path).await?;
        Ok(wrapper.get_mut("data").map(Value::take))
    }

    async fn write_step(&self, run_id: &str, step: &str, data: Value) -> Result<()> {
        let dir = self.run_dir(run_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(format!("Failed to create run directory: {}", e)))?;

        let wrapper = json!({
            "step": step,
            "timestamp": Utc::now().to_rfc3339(),
            "data": data,
            "metadata": {},
        });
        let content = serde_json::to_string_pretty(&wrapper)
            .map_err(|e| Error::storage(format!("Failed to serialize step {}: {}", step, e)))?;

        let path = self.step_path(run_id, step);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", path.display(), e)))?;
        tracing::debug!(run_id, step, path = %path.display(), "Step artifact written");
        Ok(())
    }
}

#[async_trait]
impl RunRecorder for FileRunRecorder {
    async fn record_config(&self, run_id: &str, config: &RunConfigRecord) -> Result<()> {
        self.write_step(run_id, steps::RUN_CONFIG, serde_json::to_value(config)?)
            .await
    }

    async fn record_snapshot(&self, run_id: &str, snapshot: &GraphSnapshot) -> Result<()> {
        self.write_step(
            run_id,
            steps::PROCESSING_SNAPSHOT,
            serde_json::to_value(snapshot)?,
        )
        .await
    }

    async fn record_step(&self, run_id: &str, step: &str, data: Value) -> Result<()> {
        self.write_step(run_id, step, data).await
    }
}

async fn read_json(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::storage(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::storage(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load a previously saved graph.
///
/// Accepts a bare `{root_id, nodes}` document, a step artifact wrapping one in
/// `data`, or a snapshot (`data.graph` or top-level `graph`).
pub async fn load_graph_file(path: impl AsRef<Path>) -> Result<ResearchGraph> {
    let path = path.as_ref();
    let mut value = read_json(path).await?;

    if let Some(data) = value.get_mut("data") {
        value = data.take();
    }
    if let Some(graph) = value.get_mut("graph") {
        value = graph.take();
    }
    if value.get("nodes").is_none() {
        return Err(Error::invalid_graph(format!(
            "{} does not contain a graph",
            path.display()
        )));
    }

    let graph = ResearchGraph::from_value(value)?;
    tracing::info!(path = %path.display(), nodes = graph.len(), "Loaded prebuilt graph");
    Ok(graph)
}
