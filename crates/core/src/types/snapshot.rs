//! Live-progress payload handed to snapshot observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::graph::ResearchGraph;
use super::node::NodeStatus;

/// Snapshot `source` values.
pub const SOURCE_SNAPSHOT: &str = "snapshot";
pub const SOURCE_GENERATION: &str = "generation";
pub const SOURCE_PROCESSED: &str = "processed";

/// Summary counts that accompany every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub total_nodes: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// `{graph: {root_id, nodes}, metadata: {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub graph: ResearchGraph,
    pub metadata: SnapshotMetadata,
}

impl GraphSnapshot {
    /// Clone the graph and count node states. `refining` nodes count as in progress.
    pub fn capture(graph: &ResearchGraph, source: impl Into<String>) -> Self {
        let metadata = SnapshotMetadata {
            total_nodes: graph.len(),
            completed: graph.count_status(NodeStatus::Complete),
            in_progress: graph.count_status(NodeStatus::InProgress)
                + graph.count_status(NodeStatus::Refining),
            source: source.into(),
            timestamp: Utc::now(),
        };
        Self {
            graph: graph.clone(),
            metadata,
        }
    }
}
