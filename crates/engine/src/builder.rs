//! Builder for ResearchOrchestrator.

use std::sync::Arc;

use deep_research_core::{
    config::ResearchConfig, Error, GapFiller, LiteratureSearch, ObserverSet, Predictor, Result,
    RunRecorder, SnapshotObserver,
};
use deep_research_store::recorder_from_config;

use crate::collaborators::Collaborators;
use crate::composer::ReportComposer;
use crate::gap::gap_filler_for;
use crate::generator::{generator_for, DagGenerator};
use crate::orchestrator::ResearchOrchestrator;
use crate::processor::DagProcessor;

/// Builder for constructing a ResearchOrchestrator.
///
/// Literature search and predictor are required. Everything else defaults
/// from the configuration: the generator strategy, the gap filler, and the
/// recorder (file-backed when `output.run_dir` is set).
pub struct ResearchBuilder {
    config: ResearchConfig,
    searcher: Option<Arc<dyn LiteratureSearch>>,
    predictor: Option<Arc<dyn Predictor>>,
    recorder: Option<Arc<dyn RunRecorder>>,
    generator: Option<Arc<dyn DagGenerator>>,
    gap_filler: Option<Arc<dyn GapFiller>>,
    observers: ObserverSet,
}

impl ResearchBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ResearchConfig::default(),
            searcher: None,
            predictor: None,
            recorder: None,
            generator: None,
            gap_filler: None,
            observers: ObserverSet::new(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the literature search collaborator.
    pub fn with_search(mut self, searcher: Arc<dyn LiteratureSearch>) -> Self {
        self.searcher = Some(searcher);
        self
    }

    /// Set the structured predictor.
    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Set the run recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Replace the configured generator strategy.
    pub fn with_generator(mut self, generator: Arc<dyn DagGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the configured gap filler. Ignored when gap filling is disabled.
    pub fn with_gap_filler(mut self, gap_filler: Arc<dyn GapFiller>) -> Self {
        self.gap_filler = Some(gap_filler);
        self
    }

    /// Register a live snapshot observer.
    pub fn with_observer(mut self, observer: Arc<dyn SnapshotObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<ResearchOrchestrator> {
        let searcher = self
            .searcher
            .ok_or_else(|| Error::config("A literature search collaborator is required"))?;
        let predictor = self
            .predictor
            .ok_or_else(|| Error::config("A predictor is required"))?;

        let config = self.config;
        let collab = Collaborators::new(searcher, predictor)
            .with_call_timeout(config.processing.call_timeout());

        let generator = self
            .generator
            .unwrap_or_else(|| generator_for(&config.generation, collab.clone()));

        let gap_filler = if config.gap_filling.enabled {
            self.gap_filler.or_else(|| {
                gap_filler_for(&config.gap_filling, collab.clone(), generator.clone())
            })
        } else {
            None
        };

        let processor =
            DagProcessor::new(collab.clone(), config.processing.clone()).with_gap_filler(gap_filler);
        let composer = ReportComposer::new(collab);
        let recorder = self
            .recorder
            .unwrap_or_else(|| recorder_from_config(&config.output));

        Ok(ResearchOrchestrator {
            config,
            generator,
            processor,
            composer,
            recorder,
            observers: self.observers,
        })
    }
}

impl Default for ResearchBuilder {
    fn default() -> Self {
        Self::new()
    }
}
