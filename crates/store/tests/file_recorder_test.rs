use deep_research_core::{
    config::{OutputConfig, ResearchConfig},
    steps, GraphSnapshot, ResearchGraph, RunConfigRecord, RunRecorder, SOURCE_SNAPSHOT,
};
use deep_research_store::{load_graph_file, recorder_from_config, FileRunRecorder};

fn sample_graph() -> ResearchGraph {
    let mut graph = ResearchGraph::new();
    let root = graph.get_or_create_node("Topic", None, 0).id.clone();
    graph.get_or_create_node("Sub A", Some(&root), 1);
    graph.get_or_create_node("Sub B", Some(&root), 1);
    graph
}

#[tokio::test]
async fn writes_wrapped_step_files() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = FileRunRecorder::new(dir.path());

    let config = RunConfigRecord::new("run-1", "Topic", &ResearchConfig::default());
    recorder.record_config("run-1", &config).await.unwrap();
    recorder
        .record_step("run-1", steps::FINAL_REPORT, serde_json::json!({"report": "# Topic"}))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(recorder.step_path("run-1", steps::FINAL_REPORT)).unwrap();
    let wrapper: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(wrapper["step"], "02_final_report");
    assert!(wrapper["timestamp"].is_string());
    assert_eq!(wrapper["data"]["report"], "# Topic");

    let stored = recorder.read_step("run-1", steps::RUN_CONFIG).await.unwrap().unwrap();
    assert_eq!(stored["topic"], "Topic");
    assert_eq!(stored["max_nodes"], 50);

    assert!(recorder.read_step("run-1", "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn snapshot_file_is_overwritten_and_loadable() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = FileRunRecorder::new(dir.path());
    let mut graph = sample_graph();

    recorder
        .record_snapshot("run", &GraphSnapshot::capture(&graph, SOURCE_SNAPSHOT))
        .await
        .unwrap();
    graph.get_or_create_node("Sub C", Some("node_1"), 1);
    recorder
        .record_snapshot("run", &GraphSnapshot::capture(&graph, SOURCE_SNAPSHOT))
        .await
        .unwrap();

    let path = recorder.step_path("run", steps::PROCESSING_SNAPSHOT);
    let loaded = load_graph_file(&path).await.unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded.root_id(), Some("node_1"));
}

#[tokio::test]
async fn loads_bare_graph_and_rejects_other_json() {
    let dir = tempfile::tempdir().unwrap();
    let bare = dir.path().join("dag.json");
    std::fs::write(&bare, sample_graph().to_value().unwrap().to_string()).unwrap();
    let graph = load_graph_file(&bare).await.unwrap();
    assert_eq!(graph.len(), 3);
    assert!(graph.find_by_question("sub b").is_some());

    let junk = dir.path().join("junk.json");
    std::fs::write(&junk, r#"{"hello": "world"}"#).unwrap();
    assert!(load_graph_file(&junk).await.is_err());
}

#[tokio::test]
async fn config_selects_backend() {
    let dir = tempfile::tempdir().unwrap();
    let output = OutputConfig {
        run_dir: Some(dir.path().to_string_lossy().into_owned()),
    };
    let recorder = recorder_from_config(&output);
    recorder
        .record_step("r", steps::DAG_GENERATION, serde_json::json!({}))
        .await
        .unwrap();
    assert!(dir.path().join("r").join("00_dag_generation.json").exists());

    let memory = recorder_from_config(&OutputConfig::default());
    memory
        .record_step("r", steps::DAG_GENERATION, serde_json::json!({}))
        .await
        .unwrap();
}
