//! Error types for the deep research pipeline.

use thiserror::Error;

/// Result type alias using the pipeline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the deep research pipeline.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("Literature search failed: {0}")]
    Search(String),

    #[error("Predictor failed: {0}")]
    Predictor(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // Graph Errors
    // =========================================================================
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Graph has no valid root node")]
    MissingRoot,

    #[error("Cycle detected while layering: {remaining} nodes could not be scheduled")]
    CycleDetected { remaining: usize },

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    // =========================================================================
    // Persistence & Configuration Errors
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a literature search error.
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Create a predictor error.
    pub fn predictor(msg: impl Into<String>) -> Self {
        Self::Predictor(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a node-not-found error.
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound(id.into())
    }

    /// Create an invalid graph error.
    pub fn invalid_graph(msg: impl Into<String>) -> Self {
        Self::InvalidGraph(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from a collaborator (search, predictor, timeout)
    /// and is therefore recoverable at the node boundary.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, Self::Search(_) | Self::Predictor(_) | Self::Timeout(_))
    }
}
