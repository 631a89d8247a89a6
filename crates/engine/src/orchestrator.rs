//! Generator -> Processor -> Composer sequencing for one research run.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use deep_research_core::{
    config::ResearchConfig, steps, Document, Error, GraphSnapshot, NodeResults, ObserverSet,
    ResearchGraph, ResearchOutcome, Result, RunConfigRecord, RunRecorder, SnapshotObserver,
    SOURCE_GENERATION, SOURCE_PROCESSED,
};

use crate::composer::ReportComposer;
use crate::generator::{DagGenerator, GenerationBudget};
use crate::processor::DagProcessor;

#[derive(Serialize)]
struct GenerationStep<'a> {
    topic: &'a str,
    prebuilt: bool,
    graph: &'a ResearchGraph,
}

#[derive(Serialize)]
struct ProcessedStep<'a> {
    graph: &'a ResearchGraph,
    results: &'a NodeResults,
}

#[derive(Serialize)]
struct ReportStep<'a> {
    report: &'a str,
    citations: &'a [Document],
    root_node_id: &'a str,
}

/// Runs the full pipeline and persists its artifacts.
///
/// Built with [`crate::ResearchBuilder`]. Recorder and observer failures are
/// logged and never abort a run; generator, processor, and composer errors
/// propagate.
pub struct ResearchOrchestrator {
    pub(crate) config: ResearchConfig,
    pub(crate) generator: Arc<dyn DagGenerator>,
    pub(crate) processor: DagProcessor,
    pub(crate) composer: ReportComposer,
    pub(crate) recorder: Arc<dyn RunRecorder>,
    pub(crate) observers: ObserverSet,
}

impl ResearchOrchestrator {
    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Generate a graph for `topic` with the configured budget, without processing it.
    pub async fn generate(&self, topic: &str) -> Result<ResearchGraph> {
        let budget = GenerationBudget::from(&self.config.generation);
        self.generator.generate(topic, &budget).await
    }

    /// Generate, process, and compose a report for `topic`.
    pub async fn run(&self, topic: &str) -> Result<ResearchOutcome> {
        self.execute(topic, None).await
    }

    /// Process and compose from a previously built graph; the topic is the
    /// root question.
    pub async fn run_with_graph(&self, graph: ResearchGraph) -> Result<ResearchOutcome> {
        let topic = graph.root()?.question.clone();
        self.execute(&topic, Some(graph)).await
    }

    async fn execute(&self, topic: &str, prebuilt: Option<ResearchGraph>) -> Result<ResearchOutcome> {
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, topic, prebuilt = prebuilt.is_some(), "Research run started");

        let mut record = RunConfigRecord::new(&run_id, topic, &self.config);
        record.prebuilt_graph = prebuilt.is_some();
        if let Err(e) = self.recorder.record_config(&run_id, &record).await {
            tracing::warn!(run_id = %run_id, error = %e, "Failed to record run configuration");
        }

        let was_prebuilt = prebuilt.is_some();
        let graph = match prebuilt {
            Some(graph) => graph,
            None => self.generate(topic).await?,
        };
        graph.root()?;
        tracing::info!(run_id = %run_id, nodes = graph.len(), "Research DAG ready");
        self.record_step(
            &run_id,
            steps::DAG_GENERATION,
            &GenerationStep {
                topic,
                prebuilt: was_prebuilt,
                graph: &graph,
            },
        )
        .await;
        self.publish(&run_id, &graph, SOURCE_GENERATION).await;

        let (observer, writer) = self.snapshot_pipeline(&run_id);
        let processed = self.processor.process(graph, Some(observer)).await;
        if let Err(e) = writer.await {
            tracing::warn!(run_id = %run_id, error = %e, "Snapshot writer stopped abnormally");
        }
        let (graph, results) = processed?;

        self.record_step(
            &run_id,
            steps::DAG_PROCESSED,
            &ProcessedStep {
                graph: &graph,
                results: &results,
            },
        )
        .await;
        self.publish(&run_id, &graph, SOURCE_PROCESSED).await;

        let (report, citations) = self.composer.compose_report(&graph, &results).await?;
        let root_node_id = graph.root()?.id.clone();
        self.record_step(
            &run_id,
            steps::FINAL_REPORT,
            &ReportStep {
                report: &report,
                citations: &citations,
                root_node_id: &root_node_id,
            },
        )
        .await;

        tracing::info!(run_id = %run_id, citations = citations.len(), "Research run complete");
        Ok(ResearchOutcome {
            run_id,
            report,
            citations,
            root_node_id,
            graph,
            results,
        })
    }

    /// Observer for the processor: the registered observers plus a channel
    /// feeding a background task that persists each snapshot. The task ends
    /// once the returned observer is dropped.
    fn snapshot_pipeline(&self, run_id: &str) -> (Arc<dyn SnapshotObserver>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<GraphSnapshot>();

        let recorder = self.recorder.clone();
        let writer_run_id = run_id.to_string();
        let writer = tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                if let Err(e) = recorder.record_snapshot(&writer_run_id, &snapshot).await {
                    tracing::warn!(run_id = %writer_run_id, error = %e, "Failed to persist snapshot");
                }
            }
        });

        let mut observers = self.observers.clone();
        observers.push(Arc::new(move |snapshot: &GraphSnapshot| {
            tx.send(snapshot.clone())
                .map_err(|_| Error::internal("snapshot writer stopped"))
        }));
        (Arc::new(observers), writer)
    }

    async fn publish(&self, run_id: &str, graph: &ResearchGraph, source: &str) {
        let snapshot = GraphSnapshot::capture(graph, source);
        if let Err(e) = self.observers.on_snapshot(&snapshot) {
            tracing::warn!(run_id, source, error = %e, "Snapshot observer failed");
        }
        if let Err(e) = self.recorder.record_snapshot(run_id, &snapshot).await {
            tracing::warn!(run_id, source, error = %e, "Failed to persist snapshot");
        }
    }

    async fn record_step<T: Serialize>(&self, run_id: &str, step: &str, data: &T) {
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(run_id, step, error = %e, "Failed to serialize step artifact");
                return;
            }
        };
        if let Err(e) = self.recorder.record_step(run_id, step, value).await {
            tracing::warn!(run_id, step, error = %e, "Failed to record step artifact");
        }
    }
}
