//! Literature search collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Document;

/// One literature search invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub topic: String,
    pub max_retriever_calls: usize,
    pub guideline: String,
    pub with_synthesis: bool,
}

impl SearchRequest {
    pub fn new(topic: impl Into<String>, max_retriever_calls: usize, guideline: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            max_retriever_calls,
            guideline: guideline.into(),
            with_synthesis: true,
        }
    }
}

/// Writeup plus the documents it cites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub writeup: String,
    #[serde(default)]
    pub cited_documents: Vec<Document>,
}

/// Retrieval-augmented search service. Called concurrently from leaf tasks.
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}
