//! Graph-level properties: deduplication, edge consistency, serialization.

use deep_research_core::{
    normalize_question, Document, NodeStatus, OutputFormat, ResearchGraph, META_ANSWER,
};

fn edges_are_consistent(graph: &ResearchGraph) -> bool {
    graph.iter().all(|node| {
        node.children.iter().all(|c| {
            graph
                .node(c)
                .map(|child| child.parents.contains(&node.id))
                .unwrap_or(false)
        }) && node.parents.iter().all(|p| {
            graph
                .node(p)
                .map(|parent| parent.children.contains(&node.id))
                .unwrap_or(false)
        })
    })
}

#[test]
fn equal_normalized_questions_share_one_node() {
    let variants = [
        "What is the GDP of France?",
        "  what is the gdp of france?  ",
        "WHAT IS THE\tGDP OF\nFRANCE?",
    ];
    let mut graph = ResearchGraph::new();
    let root = graph.get_or_create_node("Economy", None, 0).id.clone();

    let first = graph.get_or_create_node(variants[0], Some(&root), 1).id.clone();
    let count = graph.len();
    for q in &variants[1..] {
        assert_eq!(normalize_question(q), normalize_question(variants[0]));
        let id = graph.get_or_create_node(q, Some(&root), 1).id.clone();
        assert_eq!(id, first);
        assert_eq!(graph.len(), count);
    }
    assert_eq!(graph.node(&root).unwrap().children.len(), 1);
    assert!(edges_are_consistent(&graph));
}

#[test]
fn diamond_keeps_first_assigned_depth() {
    let mut graph = ResearchGraph::new();
    let root = graph.get_or_create_node("Root", None, 0).id.clone();
    let a = graph.get_or_create_node("A", Some(&root), 1).id.clone();
    let c = graph.get_or_create_node("C", Some(&a), 2).id.clone();
    // Same question, now directly under root at depth 1.
    let again = graph.get_or_create_node("c", Some(&root), 1).id.clone();

    assert_eq!(again, c);
    let node = graph.node(&c).unwrap();
    assert_eq!(node.depth, 2);
    assert_eq!(node.parents, vec![a, root]);
    assert!(edges_are_consistent(&graph));
}

#[test]
fn set_root_overrides_first_node() {
    let mut graph = ResearchGraph::new();
    graph.get_or_create_node("first", None, 0);
    let second = graph.get_or_create_node("second", None, 0).id.clone();
    assert_eq!(graph.root_id(), Some("node_1"));
    graph.set_root(&second).unwrap();
    assert_eq!(graph.root().unwrap().question, "second");
    assert!(graph.set_root("node_42").is_err());
}

#[test]
fn round_trip_preserves_every_field() {
    let mut graph = ResearchGraph::new();
    let root = graph.get_or_create_node("Is remote work productive?", None, 0).id.clone();
    {
        let node = graph.get_mut(&root).unwrap();
        node.expected_output_format = Some(OutputFormat::Boolean);
        node.composition_instructions = Some("Weigh both studies.".into());
        node.subtasks = vec!["Study one".into(), "Study two".into()];
        node.status = NodeStatus::Complete;
        node.report = Some("Yes.".into());
        node.set_format_details("Yes or no with one sentence.");
        node.set_answer("Yes.");
    }
    for q in ["Study one", "Study two"] {
        let child = graph.get_or_create_node(q, Some(&root), 1);
        child.expected_output_format = Some(OutputFormat::ShortAnswer);
        child.cited_documents = vec![Document::new(format!("https://example.org/{}", q.len()))
            .with_title(q)
            .with_excerpt("excerpt")];
    }

    let restored = ResearchGraph::from_value(graph.to_value().unwrap()).unwrap();

    assert_eq!(restored.root_id(), graph.root_id());
    assert_eq!(restored.len(), graph.len());
    for node in graph.iter() {
        assert_eq!(restored.node(&node.id), Some(node));
    }
    assert_eq!(
        restored.root().unwrap().metadata.get(META_ANSWER),
        Some(&serde_json::json!("Yes."))
    );
    assert!(restored.find_by_question("study TWO").is_some());
}

#[test]
fn legacy_payload_without_normalized_questions_is_indexed() {
    let payload = serde_json::json!({
        "root_id": "node_1",
        "nodes": {
            "node_1": { "id": "node_1", "question": "Root  Q", "children": ["node_2"] },
            "node_2": { "id": "node_2", "question": "Child", "parents": ["node_1"], "depth": 1,
                        "expected_output_format": "list" }
        }
    });
    let mut graph = ResearchGraph::from_value(payload).unwrap();
    assert_eq!(graph.node("node_1").unwrap().normalized_question, "root q");
    assert_eq!(graph.node("node_2").unwrap().format(), OutputFormat::List);
    let reused = graph.get_or_create_node("CHILD", None, 1).id.clone();
    assert_eq!(reused, "node_2");
    assert!(edges_are_consistent(&graph));
}
