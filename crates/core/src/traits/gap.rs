//! Gap-filling subtree builders.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ResearchGraph;

/// Builds a small standalone graph that covers `missing_topics` for `question`.
///
/// The returned graph is merged into the main graph by the processor; its
/// unparented nodes become children of the refining node. An empty graph
/// means nothing new to add.
#[async_trait]
pub trait GapFiller: Send + Sync {
    async fn fill(&self, question: &str, missing_topics: &[String]) -> Result<ResearchGraph>;
}
