//! Bottom-up processing: retries, citations, refinement, and snapshots.

use std::sync::Arc;

use deep_research_core::config::ProcessingConfig;
use deep_research_core::mocks::{
    MockLiteratureSearch, PredictorOp, RecordingObserver, ScriptedPredictor,
};
use deep_research_core::{
    Document, GapFiller, NodeStatus, OutputFormat, ResearchGraph, SnapshotObserver, META_PARENT_NODE,
    META_REFINEMENT_ITERATION, SOURCE_SNAPSHOT,
};
use deep_research_engine::{
    Collaborators, DagGenerator, DagProcessor, GenerationBudget, IterativeGenerator,
    QuestionGapFiller, SubtreeGapFiller, ERROR_PREFIX, NO_ANSWER,
};

fn config(max_refinements: usize) -> ProcessingConfig {
    ProcessingConfig {
        max_retriever_calls: 2,
        max_refinements,
        max_gap_depth: 1,
        node_attempts: 2,
        call_timeout_secs: None,
    }
}

/// Root with two leaf children.
fn two_leaf_graph() -> ResearchGraph {
    let mut graph = ResearchGraph::new();
    let root = graph.get_or_create_node("Root question", None, 0).id.clone();
    graph.get_or_create_node("Leaf A", Some(&root), 1);
    graph.get_or_create_node("Leaf B", Some(&root), 1);
    graph
}

fn processor(
    search: Arc<MockLiteratureSearch>,
    predictor: Arc<ScriptedPredictor>,
    max_refinements: usize,
) -> DagProcessor {
    let collab = Collaborators::new(search, predictor);
    let filler: Arc<dyn GapFiller> = Arc::new(QuestionGapFiller::new(collab.clone(), 2));
    DagProcessor::new(collab, config(max_refinements)).with_gap_filler(Some(filler))
}

#[tokio::test]
async fn single_root_is_answered_from_search() {
    let search = Arc::new(MockLiteratureSearch::new().with_writeup("X", "X is well studied."));
    let predictor = Arc::new(ScriptedPredictor::new());
    let mut graph = ResearchGraph::new();
    let root = graph.get_or_create_node("X", None, 0);
    root.expected_output_format = Some(OutputFormat::Boolean);
    let root_id = root.id.clone();

    let processor = processor(search.clone(), predictor, 1).with_budget(5, 0);
    assert_eq!(processor.config().max_refinements, 0);
    let (graph, results) = processor.process(graph, None).await.unwrap();

    let root = graph.get(&root_id).unwrap();
    assert_eq!(root.status, NodeStatus::Complete);
    assert_eq!(results[&root_id], "boolean: X is well studied.");
    assert_eq!(root.report.as_deref(), Some("boolean: X is well studied."));
    assert_eq!(search.requests()[0].max_retriever_calls, 5);
}

#[tokio::test]
async fn leaf_retry_recovers_from_transient_failure() {
    let search = Arc::new(MockLiteratureSearch::new().fail_first("Leaf A", 1));
    let predictor = Arc::new(ScriptedPredictor::new());
    let graph = two_leaf_graph();
    let leaf = graph.find_by_question("Leaf A").unwrap().id.clone();

    let (graph, results) = processor(search.clone(), predictor, 0)
        .process(graph, None)
        .await
        .unwrap();

    assert_eq!(graph.get(&leaf).unwrap().status, NodeStatus::Complete);
    assert_eq!(results[&leaf], "report: Findings about Leaf A.");
    assert_eq!(search.calls_for("Leaf A"), 2);
}

#[tokio::test]
async fn exhausted_leaf_is_failed_but_processing_continues() {
    let search = Arc::new(MockLiteratureSearch::new().fail_first("Leaf B", 5));
    let predictor = Arc::new(ScriptedPredictor::new());
    let graph = two_leaf_graph();
    let leaf = graph.find_by_question("Leaf B").unwrap().id.clone();
    let root = graph.root_id().unwrap().to_string();

    let (graph, results) = processor(search.clone(), predictor.clone(), 0)
        .process(graph, None)
        .await
        .unwrap();

    let failed = graph.get(&leaf).unwrap();
    assert_eq!(failed.status, NodeStatus::Failed);
    assert!(results[&leaf].starts_with(ERROR_PREFIX));
    assert_eq!(search.calls_for("Leaf B"), 2);

    assert_eq!(graph.get(&root).unwrap().status, NodeStatus::Complete);
    let synthesis = &predictor.synthesis_requests()[0];
    assert!(synthesis.child_results.contains(ERROR_PREFIX));
}

#[tokio::test]
async fn formatting_failure_falls_back_to_writeup() {
    let search = Arc::new(MockLiteratureSearch::new().with_writeup("Leaf A", "raw text"));
    let predictor = Arc::new(ScriptedPredictor::new().failing(PredictorOp::FormatLeafAnswer));
    let graph = two_leaf_graph();
    let leaf = graph.find_by_question("Leaf A").unwrap().id.clone();

    let (_, results) = processor(search, predictor, 0)
        .process(graph, None)
        .await
        .unwrap();

    assert_eq!(results[&leaf], "raw text");
}

#[tokio::test]
async fn empty_writeup_records_placeholder() {
    let search = Arc::new(MockLiteratureSearch::new().with_writeup("Leaf A", "   "));
    let predictor = Arc::new(ScriptedPredictor::new().failing(PredictorOp::FormatLeafAnswer));
    let graph = two_leaf_graph();
    let leaf = graph.find_by_question("Leaf A").unwrap().id.clone();

    let (_, results) = processor(search, predictor, 0)
        .process(graph, None)
        .await
        .unwrap();

    assert_eq!(results[&leaf], NO_ANSWER);
}

#[tokio::test]
async fn parent_citations_are_deduplicated_by_url() {
    let shared = Document::new("https://shared.example").with_title("Shared");
    let search = Arc::new(
        MockLiteratureSearch::new()
            .with_documents(
                "Leaf A",
                vec![shared.clone(), Document::new("https://a.example")],
            )
            .with_documents(
                "Leaf B",
                vec![Document::new("https://b.example"), shared.clone()],
            ),
    );
    let predictor = Arc::new(ScriptedPredictor::new());
    let graph = two_leaf_graph();
    let root = graph.root_id().unwrap().to_string();

    let (graph, _) = processor(search, predictor.clone(), 0)
        .process(graph, None)
        .await
        .unwrap();

    let urls: Vec<&str> = graph
        .get(&root)
        .unwrap()
        .cited_documents
        .iter()
        .map(|d| d.url.as_str())
        .collect();
    assert_eq!(urls, vec!["https://shared.example", "https://a.example", "https://b.example"]);
    let citations = &predictor.synthesis_requests()[0].citations;
    assert!(citations.starts_with("[1] Shared - https://shared.example"));
}

#[tokio::test]
async fn one_refinement_merges_one_gap_subtree() {
    let search = Arc::new(MockLiteratureSearch::new());
    let predictor = Arc::new(ScriptedPredictor::new().always_insufficient(&["energy costs"]));
    let graph = two_leaf_graph();
    let root = graph.root_id().unwrap().to_string();

    let (graph, results) = processor(search.clone(), predictor.clone(), 1)
        .process(graph, None)
        .await
        .unwrap();

    assert_eq!(predictor.calls(PredictorOp::GenerateGapQuestions), 1);
    assert_eq!(predictor.calls(PredictorOp::SynthesizeParent), 2);
    assert_eq!(predictor.calls(PredictorOp::ValidateComposition), 1);
    assert_eq!(graph.len(), 4);

    let gap = graph
        .find_by_question("What is known about energy costs?")
        .unwrap();
    assert_eq!(gap.status, NodeStatus::Complete);
    assert!(gap.id.starts_with(&format!("{}_r1", root)));
    assert_eq!(gap.parents, vec![root.clone()]);
    assert_eq!(gap.metadata[META_REFINEMENT_ITERATION], 1);
    assert_eq!(gap.metadata[META_PARENT_NODE], root.as_str());
    assert_eq!(search.calls_for("What is known about energy costs?"), 1);

    let last = predictor.synthesis_requests().pop().unwrap();
    assert!(last.child_results.contains("What is known about energy costs?"));
    assert_eq!(graph.get(&root).unwrap().status, NodeStatus::Complete);
    assert!(results[&root].starts_with("Synthesis for Root question"));
}

#[tokio::test]
async fn refinement_stops_within_budget_for_a_stubborn_validator() {
    let search = Arc::new(MockLiteratureSearch::new());
    let predictor = Arc::new(
        ScriptedPredictor::new()
            .always_insufficient(&["more", "still more"])
            .with_gap_questions(&["Extra angle?"]),
    );
    let graph = two_leaf_graph();

    let (graph, _) = processor(search, predictor.clone(), 3)
        .process(graph, None)
        .await
        .unwrap();

    assert!(predictor.calls(PredictorOp::SynthesizeParent) <= 4);
    // The second gap round repeats the same question and adds nothing new.
    assert_eq!(predictor.calls(PredictorOp::SynthesizeParent), 2);
    assert_eq!(predictor.calls(PredictorOp::GenerateGapQuestions), 2);
    assert_eq!(graph.len(), 4);
}

#[tokio::test]
async fn zero_refinements_never_validates() {
    let predictor = Arc::new(ScriptedPredictor::new().always_insufficient(&["gap"]));
    let (_, _) = processor(Arc::new(MockLiteratureSearch::new()), predictor.clone(), 0)
        .process(two_leaf_graph(), None)
        .await
        .unwrap();

    assert_eq!(predictor.calls(PredictorOp::SynthesizeParent), 1);
    assert_eq!(predictor.calls(PredictorOp::ValidateComposition), 0);
}

#[tokio::test]
async fn synthesis_failure_concatenates_children() {
    let predictor = Arc::new(ScriptedPredictor::new().failing(PredictorOp::SynthesizeParent));
    let graph = two_leaf_graph();
    let root = graph.root_id().unwrap().to_string();

    let (graph, results) = processor(Arc::new(MockLiteratureSearch::new()), predictor, 0)
        .process(graph, None)
        .await
        .unwrap();

    assert_eq!(graph.get(&root).unwrap().status, NodeStatus::Complete);
    assert!(results[&root].starts_with("# Root question\n\nChild 1: Leaf A"));
}

#[tokio::test]
async fn blank_synthesis_records_placeholder() {
    let predictor = Arc::new(ScriptedPredictor::new().with_blank_synthesis());
    let graph = two_leaf_graph();
    let root = graph.root_id().unwrap().to_string();

    let (graph, results) = processor(Arc::new(MockLiteratureSearch::new()), predictor, 0)
        .process(graph, None)
        .await
        .unwrap();

    assert_eq!(graph.get(&root).unwrap().status, NodeStatus::Complete);
    assert_eq!(results[&root], NO_ANSWER);
}

#[tokio::test]
async fn snapshots_trace_every_transition() {
    let predictor = Arc::new(ScriptedPredictor::new().always_insufficient(&["gap"]));
    let observer = RecordingObserver::new();
    let graph = two_leaf_graph();
    let root = graph.root_id().unwrap().to_string();
    let leaf = graph.find_by_question("Leaf A").unwrap().id.clone();

    processor(Arc::new(MockLiteratureSearch::new()), predictor, 1)
        .process(graph, Some(observer.clone() as Arc<dyn SnapshotObserver>))
        .await
        .unwrap();

    assert_eq!(
        observer.status_trail(&leaf),
        vec![NodeStatus::InProgress, NodeStatus::Complete]
    );
    assert_eq!(
        observer.status_trail(&root),
        vec![
            NodeStatus::Pending,
            NodeStatus::InProgress,
            NodeStatus::Refining,
            NodeStatus::InProgress,
            NodeStatus::Complete,
        ]
    );

    let snapshots = observer.snapshots();
    assert!(snapshots.iter().all(|s| s.metadata.source == SOURCE_SNAPSHOT));
    let last = snapshots.last().unwrap();
    assert_eq!(last.metadata.total_nodes, 4);
    assert_eq!(last.metadata.completed, 4);
    assert_eq!(last.metadata.in_progress, 0);
}

#[tokio::test]
async fn observer_errors_do_not_abort_processing() {
    let observer = RecordingObserver::failing();
    let graph = two_leaf_graph();

    let (graph, results) = processor(
        Arc::new(MockLiteratureSearch::new()),
        Arc::new(ScriptedPredictor::new()),
        0,
    )
    .process(graph, Some(observer.clone() as Arc<dyn SnapshotObserver>))
    .await
    .unwrap();

    assert!(observer.count() > 0);
    assert_eq!(results.len(), 3);
    assert_eq!(graph.count_status(NodeStatus::Complete), 3);
}

#[tokio::test]
async fn processed_graph_round_trips() {
    let search = Arc::new(
        MockLiteratureSearch::new()
            .with_documents("Leaf A", vec![Document::new("https://a").with_excerpt("quote")]),
    );
    let predictor = Arc::new(ScriptedPredictor::new().always_insufficient(&["gap"]));

    let (graph, _) = processor(search, predictor, 1)
        .process(two_leaf_graph(), None)
        .await
        .unwrap();

    let restored = ResearchGraph::from_value(graph.to_value().unwrap()).unwrap();
    assert_eq!(restored.root_id(), graph.root_id());
    assert_eq!(restored.len(), graph.len());
    for node in graph.iter() {
        let other = restored.get(&node.id).unwrap();
        assert_eq!(other, node);
    }
    assert_eq!(
        restored.node_ids().collect::<Vec<_>>(),
        graph.node_ids().collect::<Vec<_>>()
    );
}

/// Refinement through generated subtrees, with nesting bounded by `max_gap_depth`.
async fn refine_with_subtrees(
    max_gap_depth: usize,
) -> (ResearchGraph, Arc<ScriptedPredictor>) {
    let predictor = Arc::new(
        ScriptedPredictor::new()
            .always_insufficient(&["gap"])
            .with_decomposition("Root question (focus on: gap)", &["Gap detail"]),
    );
    let collab = Collaborators::new(Arc::new(MockLiteratureSearch::new()), predictor.clone());
    let generator: Arc<dyn DagGenerator> = Arc::new(IterativeGenerator::new(collab.clone()));
    let filler: Arc<dyn GapFiller> =
        Arc::new(SubtreeGapFiller::new(generator, GenerationBudget::new(2, 3, 2)));
    let processor = DagProcessor::new(
        collab,
        ProcessingConfig {
            max_gap_depth,
            ..config(1)
        },
    )
    .with_gap_filler(Some(filler));

    let (graph, _) = processor.process(two_leaf_graph(), None).await.unwrap();
    (graph, predictor)
}

#[tokio::test]
async fn gap_depth_one_refines_only_the_original_parent() {
    let (graph, predictor) = refine_with_subtrees(1).await;

    assert_eq!(graph.len(), 5);
    let gap_root = graph.get("node_1_r1_node_1").unwrap();
    assert_eq!(gap_root.depth, 1);
    assert_eq!(gap_root.children, vec!["node_1_r1_node_2".to_string()]);
    assert_eq!(graph.get("node_1_r1_node_2").unwrap().depth, 2);
    assert!(graph.iter().all(|n| !n.id.contains("_r1_node_1_r1_")));

    assert_eq!(predictor.calls(PredictorOp::SynthesizeParent), 3);
    assert_eq!(predictor.calls(PredictorOp::ValidateComposition), 1);
    assert_eq!(graph.count_status(NodeStatus::Complete), graph.len());
}

#[tokio::test]
async fn gap_depth_two_allows_one_nested_refinement() {
    let (graph, predictor) = refine_with_subtrees(2).await;

    assert_eq!(graph.len(), 6);
    let nested = graph.get("node_1_r1_node_1_r1_node_1").unwrap();
    assert_eq!(nested.depth, 2);
    assert_eq!(nested.parents, vec!["node_1_r1_node_1".to_string()]);
    assert_eq!(nested.metadata[META_PARENT_NODE], "node_1_r1_node_1");
    let nested_merges = graph
        .iter()
        .filter(|n| n.id.contains("_r1_node_1_r1_"))
        .count();
    assert_eq!(nested_merges, 1);

    assert_eq!(predictor.calls(PredictorOp::SynthesizeParent), 4);
    assert_eq!(predictor.calls(PredictorOp::ValidateComposition), 2);
    assert_eq!(graph.count_status(NodeStatus::Complete), graph.len());
}
