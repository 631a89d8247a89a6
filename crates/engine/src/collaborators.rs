//! Shared handle on the two external services, with optional per-call deadlines.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use deep_research_core::{Error, LiteratureSearch, Predictor, Result, SearchRequest, SearchResponse};

/// Literature search plus predictor, cloned into every engine component.
///
/// Every call made through [`Collaborators::bounded`] is subject to the
/// configured timeout; expiry surfaces as [`Error::Timeout`] and is handled
/// like any other collaborator failure.
#[derive(Clone)]
pub struct Collaborators {
    pub searcher: Arc<dyn LiteratureSearch>,
    pub predictor: Arc<dyn Predictor>,
    call_timeout: Option<Duration>,
}

impl Collaborators {
    pub fn new(searcher: Arc<dyn LiteratureSearch>, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            searcher,
            predictor,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Run one collaborator call under the deadline, if any.
    pub async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                Error::timeout(format!("{} exceeded {}ms", operation, limit.as_millis()))
            })?,
            None => call.await,
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.bounded("literature search", self.searcher.search(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deep_research_core::mocks::{MockLiteratureSearch, ScriptedPredictor};

    struct SlowSearch;

    #[async_trait]
    impl LiteratureSearch for SlowSearch {
        async fn search(&self, _request: &SearchRequest) -> Result<SearchResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SearchResponse::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let collab = Collaborators::new(Arc::new(SlowSearch), Arc::new(ScriptedPredictor::new()))
            .with_call_timeout(Some(Duration::from_secs(5)));
        let err = collab
            .search(&SearchRequest::new("t", 1, "g"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_collaborator_failure());
    }

    #[tokio::test]
    async fn no_timeout_passes_through() {
        let collab = Collaborators::new(
            Arc::new(MockLiteratureSearch::new().with_writeup("t", "body")),
            Arc::new(ScriptedPredictor::new()),
        );
        let resp = collab.search(&SearchRequest::new("t", 1, "g")).await.unwrap();
        assert_eq!(resp.writeup, "body");
    }
}
