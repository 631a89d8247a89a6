//! Arena of research nodes keyed by stable string ids.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::{normalize_question, NodeStatus, ResearchNode};
use crate::{Error, Result};

const ID_PREFIX: &str = "node_";

/// DAG of research nodes for one run.
///
/// At most one node exists per normalized question for the whole lifetime of
/// the graph; [`ResearchGraph::get_or_create_node`] is the mutation path that
/// enforces it. Nodes are never removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "GraphRepr", into = "GraphRepr")]
pub struct ResearchGraph {
    nodes: HashMap<String, ResearchNode>,
    root_id: Option<String>,
    /// Creation order, used for deterministic iteration.
    order: Vec<String>,
    /// normalized question -> node id
    question_index: HashMap<String, String>,
    /// Highest sequence number handed out so far.
    last_seq: usize,
}

/// Wire shape: `{root_id, nodes: {id: node}, order: [id]}`. `order` is
/// optional on input.
#[derive(Serialize, Deserialize)]
struct GraphRepr {
    root_id: Option<String>,
    #[serde(default)]
    nodes: HashMap<String, ResearchNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    order: Vec<String>,
}

impl From<ResearchGraph> for GraphRepr {
    fn from(graph: ResearchGraph) -> Self {
        Self {
            root_id: graph.root_id,
            nodes: graph.nodes,
            order: graph.order,
        }
    }
}

impl From<GraphRepr> for ResearchGraph {
    fn from(repr: GraphRepr) -> Self {
        let mut seen = HashSet::new();
        let mut order: Vec<String> = repr
            .order
            .into_iter()
            .filter(|id| repr.nodes.contains_key(id) && seen.insert(id.clone()))
            .collect();
        let mut rest: Vec<String> = repr
            .nodes
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        rest.sort_by_cached_key(|id| creation_key(id));
        order.extend(rest);

        let mut nodes = repr.nodes;
        let mut question_index = HashMap::new();
        for id in &order {
            if let Some(node) = nodes.get_mut(id) {
                if node.normalized_question.is_empty() {
                    node.normalized_question = normalize_question(&node.question);
                }
                question_index
                    .entry(node.normalized_question.clone())
                    .or_insert_with(|| id.clone());
            }
        }

        let last_seq = order.iter().filter_map(|id| sequence_of(id)).max().unwrap_or(0);

        Self {
            nodes,
            root_id: repr.root_id,
            order,
            question_index,
            last_seq,
        }
    }
}

/// `node_12` -> `Some(12)`; remapped or foreign ids -> `None`.
fn sequence_of(id: &str) -> Option<usize> {
    id.strip_prefix(ID_PREFIX)?.parse().ok()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum IdSegment {
    Number(u64),
    Text(String),
}

/// Plain `node_N` ids first, then remapped ids; digit runs compare
/// numerically, so `node_2_r1_node_1` sorts before `node_10_r1_node_1`.
fn creation_key(id: &str) -> (bool, Vec<IdSegment>) {
    let mut segments = Vec::new();
    let mut rest = id;
    while let Some(first) = rest.chars().next() {
        let digits = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        segments.push(match run.parse::<u64>() {
            Ok(n) if digits => IdSegment::Number(n),
            _ => IdSegment::Text(run.to_string()),
        });
        rest = tail;
    }
    (sequence_of(id).is_none(), segments)
}

impl ResearchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    /// The root node; fails if the graph has none or it points nowhere.
    pub fn root(&self) -> Result<&ResearchNode> {
        let id = self.root_id.as_deref().ok_or(Error::MissingRoot)?;
        self.nodes.get(id).ok_or(Error::MissingRoot)
    }

    /// Override the root. The id must exist.
    pub fn set_root(&mut self, id: &str) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(Error::node_not_found(id));
        }
        self.root_id = Some(id.to_string());
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&ResearchNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut ResearchNode> {
        self.nodes.get_mut(id)
    }

    /// Like [`ResearchGraph::node`] but for ids that must exist.
    pub fn get(&self, id: &str) -> Result<&ResearchNode> {
        self.nodes.get(id).ok_or_else(|| Error::node_not_found(id))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut ResearchNode> {
        self.nodes.get_mut(id).ok_or_else(|| Error::node_not_found(id))
    }

    /// Node ids in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ResearchNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn nodes(&self) -> &HashMap<String, ResearchNode> {
        &self.nodes
    }

    pub fn find_by_question(&self, question: &str) -> Option<&ResearchNode> {
        self.question_index
            .get(&normalize_question(question))
            .and_then(|id| self.nodes.get(id))
    }

    pub fn count_status(&self, status: NodeStatus) -> usize {
        self.nodes.values().filter(|n| n.status == status).count()
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.values().map(|n| n.depth).max().unwrap_or(0)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    fn allocate_id(&mut self) -> String {
        loop {
            self.last_seq += 1;
            let id = format!("{}{}", ID_PREFIX, self.last_seq);
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    /// Return the node for `question`, creating it if no node shares its
    /// normalized form.
    ///
    /// An existing node gains `parent_id` as an additional parent (idempotent)
    /// and keeps its original depth. A new node gets the next sequential id and
    /// becomes the root if the graph has none yet.
    pub fn get_or_create_node(
        &mut self,
        question: &str,
        parent_id: Option<&str>,
        depth: usize,
    ) -> &mut ResearchNode {
        let normalized = normalize_question(question);

        let id = match self.question_index.get(&normalized) {
            Some(existing) => existing.clone(),
            None => {
                let id = self.allocate_id();
                let node = ResearchNode::new(id.clone(), question, depth);
                self.nodes.insert(id.clone(), node);
                self.order.push(id.clone());
                self.question_index.insert(normalized, id.clone());
                if self.root_id.is_none() {
                    self.root_id = Some(id.clone());
                }
                id
            }
        };

        if let Some(parent_id) = parent_id {
            if !self.nodes.contains_key(parent_id) {
                tracing::warn!(parent_id, node_id = %id, "Parent not in graph, node left unlinked");
            } else {
                self.add_edge(parent_id, &id);
            }
        }

        self.nodes
            .entry(id)
            .or_insert_with_key(|id| ResearchNode::new(id.clone(), question, depth))
    }

    /// Bulk-insert a fully formed node (used when merging subtrees).
    ///
    /// Fails if the id is taken or the normalized question already has a node.
    pub fn insert_node(&mut self, mut node: ResearchNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(Error::invalid_graph(format!("duplicate node id {}", node.id)));
        }
        if node.normalized_question.is_empty() {
            node.normalized_question = normalize_question(&node.question);
        }
        if let Some(existing) = self.question_index.get(&node.normalized_question) {
            return Err(Error::invalid_graph(format!(
                "question of {} already owned by {}",
                node.id, existing
            )));
        }
        if let Some(seq) = sequence_of(&node.id) {
            self.last_seq = self.last_seq.max(seq);
        }
        if self.root_id.is_none() {
            self.root_id = Some(node.id.clone());
        }
        self.question_index
            .insert(node.normalized_question.clone(), node.id.clone());
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Link two existing nodes. Self-loops and unknown ids are no-ops.
    /// Returns true if either side of the link was added.
    pub fn add_edge(&mut self, parent_id: &str, child_id: &str) -> bool {
        if parent_id == child_id
            || !self.nodes.contains_key(parent_id)
            || !self.nodes.contains_key(child_id)
        {
            return false;
        }

        let mut changed = false;
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            if !parent.children.iter().any(|c| c == child_id) {
                parent.children.push(child_id.to_string());
                changed = true;
            }
        }
        if let Some(child) = self.nodes.get_mut(child_id) {
            if !child.parents.iter().any(|p| p == parent_id) {
                child.parents.push(parent_id.to_string());
                changed = true;
            }
        }
        changed
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// All nodes reachable upward from `id` through parent edges (excluding `id`).
    pub fn ancestors(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(current) {
                for parent in &node.parents {
                    if seen.insert(parent.clone()) {
                        queue.push_back(parent);
                    }
                }
            }
        }
        seen.remove(id);
        seen
    }

    /// Whether `descendant` can be reached from `ancestor` through child edges.
    pub fn reaches(&self, ancestor: &str, descendant: &str) -> bool {
        if ancestor == descendant {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![ancestor];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                for child in &node.children {
                    if child == descendant {
                        return true;
                    }
                    if seen.insert(child.as_str()) {
                        stack.push(child);
                    }
                }
            }
        }
        false
    }

    /// Normalized questions of `id` and every ancestor.
    pub fn lineage_questions(&self, id: &str) -> HashSet<String> {
        let mut questions: HashSet<String> = self
            .ancestors(id)
            .iter()
            .filter_map(|a| self.nodes.get(a))
            .map(|n| n.normalized_question.clone())
            .collect();
        if let Some(node) = self.nodes.get(id) {
            questions.insert(node.normalized_question.clone());
        }
        questions
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize to the `{root_id, nodes}` JSON shape.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a graph (including its question index) from [`ResearchGraph::to_value`] output.
    pub fn from_value(value: Value) -> Result<Self> {
        let graph: ResearchGraph = serde_json::from_value(value)?;
        if let Some(root) = graph.root_id.as_deref() {
            if !graph.nodes.contains_key(root) {
                return Err(Error::invalid_graph(format!("root {} is not a node", root)));
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_order_survives_round_trip() {
        let mut graph = ResearchGraph::new();
        let root = graph.get_or_create_node("Root", None, 0).id.clone();
        for i in 0..10 {
            graph.get_or_create_node(&format!("Q{}", i), Some(&root), 1);
        }
        for parent in ["node_10", "node_2"] {
            let mut node = ResearchNode::new(format!("{}_r1_node_1", parent), format!("Gap {}", parent), 2);
            node.normalized_question = normalize_question(&node.question);
            graph.insert_node(node).unwrap();
        }
        let before: Vec<String> = graph.node_ids().map(str::to_string).collect();

        let restored = ResearchGraph::from_value(graph.to_value().unwrap()).unwrap();
        let after: Vec<String> = restored.node_ids().map(str::to_string).collect();
        assert_eq!(after, before);
        assert_eq!(after[11], "node_10_r1_node_1");
    }

    #[test]
    fn payload_without_order_sorts_ids_naturally() {
        let mut nodes = serde_json::Map::new();
        for id in ["node_10_r1_node_1", "node_2_r1_node_1", "node_10", "node_2", "node_1"] {
            nodes.insert(id.to_string(), serde_json::json!({"id": id, "question": id}));
        }
        let graph = ResearchGraph::from_value(serde_json::json!({
            "root_id": "node_1",
            "nodes": nodes,
        }))
        .unwrap();
        let ids: Vec<&str> = graph.node_ids().collect();
        assert_eq!(
            ids,
            vec!["node_1", "node_2", "node_10", "node_2_r1_node_1", "node_10_r1_node_1"]
        );
    }

    #[test]
    fn first_node_becomes_root() {
        let mut graph = ResearchGraph::new();
        let root = graph.get_or_create_node("Topic", None, 0).id.clone();
        let child = graph.get_or_create_node("Child", Some(&root), 1).id.clone();
        assert_eq!(root, "node_1");
        assert_eq!(child, "node_2");
        assert_eq!(graph.root_id(), Some("node_1"));
    }

    #[test]
    fn duplicate_question_reuses_node_and_adds_parent_once() {
        let mut graph = ResearchGraph::new();
        let root = graph.get_or_create_node("Root", None, 0).id.clone();
        let a = graph.get_or_create_node("A", Some(&root), 1).id.clone();
        let b = graph.get_or_create_node("B", Some(&root), 1).id.clone();

        let c1 = graph.get_or_create_node("Shared  question", Some(&a), 2).id.clone();
        let c2 = graph.get_or_create_node("shared QUESTION", Some(&b), 2).id.clone();
        let c3 = graph.get_or_create_node("shared question", Some(&b), 5).id.clone();

        assert_eq!(c1, c2);
        assert_eq!(c2, c3);
        assert_eq!(graph.len(), 4);
        let shared = graph.node(&c1).unwrap();
        assert_eq!(shared.parents, vec![a.clone(), b.clone()]);
        assert_eq!(shared.depth, 2);
        assert_eq!(graph.node(&b).unwrap().children, vec![c1.clone()]);
    }

    #[test]
    fn question_equal_to_parent_does_not_self_link() {
        let mut graph = ResearchGraph::new();
        let root = graph.get_or_create_node("Root", None, 0).id.clone();
        let same = graph.get_or_create_node("root", Some(&root), 1).id.clone();
        assert_eq!(same, root);
        assert!(graph.node(&root).unwrap().children.is_empty());
        assert!(graph.node(&root).unwrap().parents.is_empty());
    }

    #[test]
    fn add_edge_ignores_self_loops_and_unknown_ids() {
        let mut graph = ResearchGraph::new();
        let a = graph.get_or_create_node("A", None, 0).id.clone();
        let b = graph.get_or_create_node("B", None, 0).id.clone();
        assert!(!graph.add_edge(&a, &a));
        assert!(!graph.add_edge(&a, "node_99"));
        assert!(graph.add_edge(&a, &b));
        assert!(!graph.add_edge(&a, &b));
        assert_eq!(graph.node(&b).unwrap().parents, vec![a.clone()]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let graph = ResearchGraph::new();
        assert!(matches!(graph.root(), Err(Error::MissingRoot)));
    }

    #[test]
    fn ancestry_queries() {
        let mut graph = ResearchGraph::new();
        let r = graph.get_or_create_node("R", None, 0).id.clone();
        let a = graph.get_or_create_node("A", Some(&r), 1).id.clone();
        let c = graph.get_or_create_node("C", Some(&a), 2).id.clone();
        assert_eq!(graph.ancestors(&c).len(), 2);
        assert!(graph.reaches(&r, &c));
        assert!(!graph.reaches(&c, &r));
        let lineage = graph.lineage_questions(&a);
        assert!(lineage.contains("r") && lineage.contains("a"));
        assert!(!lineage.contains("c"));
    }

    #[test]
    fn round_trip_rebuilds_index_and_sequence() {
        let mut graph = ResearchGraph::new();
        let r = graph.get_or_create_node("Root", None, 0).id.clone();
        graph.get_or_create_node("Child", Some(&r), 1);

        let value = graph.to_value().unwrap();
        assert_eq!(value["root_id"], "node_1");
        let mut restored = ResearchGraph::from_value(value).unwrap();

        assert_eq!(restored.len(), 2);
        let again = restored.get_or_create_node("  child ", None, 1).id.clone();
        assert_eq!(again, "node_2");
        let fresh = restored.get_or_create_node("Other", None, 1).id.clone();
        assert_eq!(fresh, "node_3");
        assert_eq!(restored.node_ids().collect::<Vec<_>>(), vec!["node_1", "node_2", "node_3"]);
    }

    #[test]
    fn from_value_rejects_dangling_root() {
        let value = serde_json::json!({ "root_id": "node_7", "nodes": {} });
        assert!(ResearchGraph::from_value(value).is_err());
    }
}
