//! Bottom-up layering and subtree merging over a [`ResearchGraph`].
//!
//! Layering is Kahn's algorithm run against child edges: a node becomes ready
//! once every one of its children has been placed in an earlier layer.

use std::collections::{HashMap, HashSet};

use deep_research_core::{Error, NodeStatus, ResearchGraph, Result};

/// Layers for the whole graph. Layer 0 holds every leaf.
pub fn topological_layers(graph: &ResearchGraph) -> Result<Vec<Vec<String>>> {
    let all: HashSet<String> = graph.node_ids().map(str::to_string).collect();
    layers_for(graph, &all)
}

/// Layers for a subset of the graph.
///
/// Only children inside `subset` count towards a node's in-degree, so a node
/// whose children are all outside the subset is ready immediately. Within a
/// layer, nodes keep graph creation order.
pub fn layers_for(graph: &ResearchGraph, subset: &HashSet<String>) -> Result<Vec<Vec<String>>> {
    let ordered: Vec<&str> = graph
        .node_ids()
        .filter(|id| subset.contains(*id))
        .collect();
    let position: HashMap<&str, usize> = ordered
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    // child -> parents that list it, restricted to the subset
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for &id in &ordered {
        let node = graph.get(id)?;
        let mut degree = 0;
        for child in &node.children {
            if let Some((&child_id, _)) = position.get_key_value(child.as_str()) {
                degree += 1;
                dependents.entry(child_id).or_default().push(id);
            }
        }
        in_degree.insert(id, degree);
    }

    let mut current: Vec<&str> = ordered
        .iter()
        .copied()
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();
    let mut layers = Vec::new();
    let mut placed = 0;

    while !current.is_empty() {
        placed += current.len();
        let mut next: Vec<&str> = Vec::new();
        for id in &current {
            for &parent in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(&parent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(parent);
                    }
                }
            }
        }
        next.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
        layers.push(current.iter().map(|id| id.to_string()).collect());
        current = next;
    }

    if placed < ordered.len() {
        return Err(Error::CycleDetected {
            remaining: ordered.len() - placed,
        });
    }
    Ok(layers)
}

/// Every node reachable from `id` through child edges, excluding `id`.
pub fn descendants(graph: &ResearchGraph, id: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![id.to_string()];
    while let Some(current) = stack.pop() {
        if let Some(node) = graph.node(&current) {
            for child in &node.children {
                if seen.insert(child.clone()) {
                    stack.push(child.clone());
                }
            }
        }
    }
    seen.remove(id);
    seen
}

/// Result of grafting a subtree into a graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Ids of nodes created in the main graph.
    pub created: Vec<String>,
    /// Existing nodes that now hang below the attach point.
    pub reused: Vec<String>,
    /// Subtree nodes skipped because they repeat the attach point's lineage.
    pub dropped: usize,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.reused.is_empty()
    }
}

/// Graft `subtree` below `attach_point`.
///
/// Subtree ids are remapped to `{salt}_{old_id}`. A subtree question that
/// already has a node in `main` reuses that node instead, unless it is the
/// attach point or one of its ancestors, in which case it is dropped. Subtree
/// nodes left without a subtree parent are attached to `attach_point`. Depths
/// are rebased under the attach point. Edges that would close a cycle are
/// skipped, so the result stays acyclic.
pub fn merge_subtree(
    main: &mut ResearchGraph,
    subtree: &ResearchGraph,
    attach_point: &str,
    salt: &str,
) -> Result<MergeOutcome> {
    let attach_depth = main.get(attach_point)?.depth;
    let blocked = main.lineage_questions(attach_point);
    let base_depth = subtree.iter().map(|n| n.depth).min().unwrap_or(0);

    let mut outcome = MergeOutcome::default();
    let mut mapping: HashMap<&str, String> = HashMap::new();

    for node in subtree.iter() {
        if blocked.contains(&node.normalized_question) {
            tracing::debug!(
                attach_point,
                question = %node.question,
                "Dropping gap question that repeats its own lineage"
            );
            outcome.dropped += 1;
            continue;
        }

        if let Some(existing) = main.find_by_question(&node.question) {
            mapping.insert(node.id.as_str(), existing.id.clone());
            continue;
        }

        let mut new_id = format!("{}_{}", salt, node.id);
        let mut suffix = 2;
        while main.contains(&new_id) {
            new_id = format!("{}_{}_{}", salt, node.id, suffix);
            suffix += 1;
        }

        let mut grafted = node.clone();
        grafted.id = new_id.clone();
        grafted.parents.clear();
        grafted.children.clear();
        grafted.status = NodeStatus::Pending;
        grafted.report = None;
        grafted.clear_answer();
        grafted.depth = attach_depth + 1 + node.depth.saturating_sub(base_depth);
        main.insert_node(grafted)?;

        mapping.insert(node.id.as_str(), new_id.clone());
        outcome.created.push(new_id);
    }

    for node in subtree.iter() {
        let Some(child) = mapping.get(node.id.as_str()) else {
            continue;
        };

        let mapped_parents: Vec<&String> = node
            .parents
            .iter()
            .filter_map(|p| mapping.get(p.as_str()))
            .collect();

        for parent in &mapped_parents {
            link_acyclic(main, parent, child);
        }

        if mapped_parents.is_empty() {
            let already_linked = main
                .node(attach_point)
                .map(|n| n.children.contains(child))
                .unwrap_or(false);
            if !link_acyclic(main, attach_point, child) || already_linked {
                continue;
            }
            let is_new = outcome.created.iter().any(|id| id == child);
            if !is_new && !outcome.reused.contains(child) {
                outcome.reused.push(child.clone());
            }
        }
    }

    Ok(outcome)
}

/// Add `parent -> child` unless it would close a cycle. Returns true when the
/// edge exists afterwards.
fn link_acyclic(graph: &mut ResearchGraph, parent: &str, child: &str) -> bool {
    if parent == child || graph.reaches(child, parent) {
        tracing::debug!(parent, child, "Skipping edge that would create a cycle");
        return false;
    }
    graph.add_edge(parent, child);
    true
}
