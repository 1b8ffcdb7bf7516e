//! StoryEngine: the in-memory story graph and its CRUD operations

use super::edge::{Edge, EdgeId, RelationType};
use super::node::{Node, NodeId, NodeType, Properties, PropertyValue, STORY_ID_PROPERTY};
use crate::compat::check_compatibility;
use crate::query::QueryError;
use crate::storage::{GraphStore, StorageError};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by story operations
#[derive(Debug, Error)]
pub enum StoryError {
    /// Malformed payload or rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// The compatibility gate rejected a relationship
    #[error("Incompatible relationship {from} -[{relation}]-> {to}: {reason}")]
    IncompatibleEdge {
        from: NodeType,
        relation: RelationType,
        to: NodeType,
        reason: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The graph store, query engine or cache failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl StoryError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoryError::Validation(_) => "VALIDATION_ERROR",
            StoryError::IncompatibleEdge { .. } => "INCOMPATIBLE_RELATIONSHIP",
            StoryError::NotFound(_) => "NOT_FOUND",
            StoryError::Collaborator(_) => "COLLABORATOR_ERROR",
        }
    }

    /// HTTP-equivalent status
    pub fn status(&self) -> u16 {
        match self {
            StoryError::Validation(_) | StoryError::IncompatibleEdge { .. } => 400,
            StoryError::NotFound(_) => 404,
            StoryError::Collaborator(_) => 500,
        }
    }
}

impl From<StorageError> for StoryError {
    fn from(e: StorageError) -> Self {
        StoryError::Collaborator(e.to_string())
    }
}

impl From<QueryError> for StoryError {
    fn from(e: QueryError) -> Self {
        StoryError::Collaborator(e.to_string())
    }
}

/// Result type for story operations
pub type StoryResult<T> = Result<T, StoryError>;

/// Direction for edge lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges leaving the node
    #[default]
    Outgoing,
    /// Edges arriving at the node
    Incoming,
    Both,
}

/// Filter criteria for listing nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn in_story(mut self, story_id: NodeId) -> Self {
        self.story_id = Some(story_id);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    fn matches(&self, node: &Node) -> bool {
        if let Some(expected) = self.node_type {
            if node.node_type != expected {
                return false;
            }
        }
        if let Some(ref story) = self.story_id {
            if node.story_id().as_ref() != Some(story) {
                return false;
            }
        }
        true
    }
}

/// Aggregate counts over the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_type: BTreeMap<NodeType, usize>,
    pub edges_by_relation: BTreeMap<RelationType, usize>,
}

/// The story graph
///
/// Holds nodes and edges in concurrent maps. Every edge write passes the
/// compatibility gate. With a store attached, writes go to the store first
/// so a storage failure leaves memory untouched.
#[derive(Default)]
pub struct StoryEngine {
    nodes: DashMap<NodeId, Node>,
    edges: DashMap<EdgeId, Edge>,
    store: Option<Arc<dyn GraphStore>>,
}

impl std::fmt::Debug for StoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryEngine")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl StoryEngine {
    /// Create an engine without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine that writes through to `store`
    pub fn with_store(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    /// Hydrate from the attached store. Returns the number of nodes loaded.
    pub fn load_all(&self) -> StoryResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let nodes = store.load_nodes()?;
        let edges = store.load_edges()?;
        let count = nodes.len();
        for node in nodes {
            self.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            self.edges.insert(edge.id.clone(), edge);
        }
        tracing::debug!(nodes = count, edges = self.edges.len(), "loaded story graph");
        Ok(count)
    }

    // === Nodes ===

    /// Insert a new node. Ids must be unique.
    pub fn create_node(&self, node: Node) -> StoryResult<Node> {
        check_story_id(&node)?;
        match self.nodes.entry(node.id.clone()) {
            Entry::Occupied(_) => Err(StoryError::Validation(format!("node {} already exists", node.id))),
            Entry::Vacant(slot) => {
                if let Some(store) = &self.store {
                    store.save_node(&node)?;
                }
                tracing::debug!(node_id = %node.id, node_type = %node.node_type, "created node");
                slot.insert(node.clone());
                Ok(node)
            }
        }
    }

    pub fn get_node(&self, id: &NodeId) -> Option<Node> {
        self.nodes.get(id).map(|r| r.clone())
    }

    pub fn require_node(&self, id: &NodeId) -> StoryResult<Node> {
        self.get_node(id)
            .ok_or_else(|| StoryError::NotFound(format!("node {}", id)))
    }

    /// Merge `patch` into a node's properties.
    ///
    /// A `null` value removes the property. The node type cannot change.
    pub fn update_node(&self, id: &NodeId, patch: Properties) -> StoryResult<Node> {
        // The entry stays locked until the merged node is written back
        let mut slot = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoryError::NotFound(format!("node {}", id)))?;
        let mut updated = slot.value().clone();
        for (key, value) in patch {
            if value == PropertyValue::Null {
                updated.properties.remove(&key);
            } else {
                updated.properties.insert(key, value);
            }
        }
        check_story_id(&updated)?;
        updated.updated_at = Utc::now();

        if let Some(store) = &self.store {
            store.save_node(&updated)?;
        }
        *slot = updated.clone();
        Ok(updated)
    }

    /// Remove a node and every edge touching it. Returns the removed edges.
    pub fn delete_node(&self, id: &NodeId) -> StoryResult<Vec<Edge>> {
        if !self.nodes.contains_key(id) {
            return Err(StoryError::NotFound(format!("node {}", id)));
        }
        if let Some(store) = &self.store {
            store.delete_node(id)?;
        }

        let incident: Vec<EdgeId> = self
            .edges
            .iter()
            .filter(|e| e.touches(id))
            .map(|e| e.id.clone())
            .collect();
        let removed: Vec<Edge> = incident
            .iter()
            .filter_map(|eid| self.edges.remove(eid).map(|(_, e)| e))
            .collect();
        self.nodes.remove(id);
        tracing::debug!(node_id = %id, cascaded = removed.len(), "deleted node");
        Ok(removed)
    }

    /// Nodes matching `filter`, ordered by creation time then id
    pub fn list_nodes(&self, filter: &NodeFilter) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| filter.matches(n.value()))
            .map(|n| n.clone())
            .collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        nodes.into_iter().skip(offset).take(limit).collect()
    }

    // === Edges ===

    /// Create an edge after checking both endpoints exist and the
    /// compatibility gate accepts the type triple.
    pub fn create_edge(
        &self,
        from: &NodeId,
        to: &NodeId,
        relation: RelationType,
        properties: Properties,
    ) -> StoryResult<Edge> {
        let source = self.require_node(from)?;
        let target = self.require_node(to)?;

        let verdict = check_compatibility(source.node_type, target.node_type, relation);
        if !verdict.valid {
            tracing::debug!(
                from = %source.node_type,
                relation = %relation,
                to = %target.node_type,
                "compatibility gate rejected edge"
            );
            return Err(StoryError::IncompatibleEdge {
                from: source.node_type,
                relation,
                to: target.node_type,
                reason: verdict.reason.unwrap_or_default(),
            });
        }

        let mut edge = Edge::new(from.clone(), to.clone(), relation);
        edge.properties = properties;
        if let Some(store) = &self.store {
            store.save_edge(&edge)?;
        }
        self.edges.insert(edge.id.clone(), edge.clone());
        Ok(edge)
    }

    pub fn get_edge(&self, id: &EdgeId) -> Option<Edge> {
        self.edges.get(id).map(|r| r.clone())
    }

    pub fn delete_edge(&self, id: &EdgeId) -> StoryResult<Edge> {
        if !self.edges.contains_key(id) {
            return Err(StoryError::NotFound(format!("relationship {}", id)));
        }
        if let Some(store) = &self.store {
            store.delete_edge(id)?;
        }
        self.edges
            .remove(id)
            .map(|(_, e)| e)
            .ok_or_else(|| StoryError::NotFound(format!("relationship {}", id)))
    }

    /// Edges at a node, ordered by creation time then id
    pub fn edges_of(&self, node: &NodeId, direction: Direction) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| match direction {
                Direction::Outgoing => &e.from == node,
                Direction::Incoming => &e.to == node,
                Direction::Both => e.touches(node),
            })
            .map(|e| e.clone())
            .collect();
        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        edges
    }

    /// Distinct nodes one hop away in either direction
    pub fn neighbors(&self, node: &NodeId) -> StoryResult<Vec<Node>> {
        self.require_node(node)?;
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .edges_of(node, Direction::Both)
            .into_iter()
            .map(|e| if &e.from == node { e.to } else { e.from })
            .filter(|id| seen.insert(id.clone()))
            .filter_map(|id| self.get_node(&id))
            .collect())
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            ..Default::default()
        };
        for node in self.nodes.iter() {
            *stats.nodes_by_type.entry(node.node_type).or_default() += 1;
        }
        for edge in self.edges.iter() {
            *stats.edges_by_relation.entry(edge.relation).or_default() += 1;
        }
        stats
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Non-story nodes name their story by id, so the property must be a string
fn check_story_id(node: &Node) -> StoryResult<()> {
    if node.node_type == NodeType::Story {
        return Ok(());
    }
    match node.property(STORY_ID_PROPERTY) {
        Some(value) if value.as_str().is_none() => Err(StoryError::Validation(format!(
            "{} must be a string",
            STORY_ID_PROPERTY
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn engine_with_scene_pair() -> (StoryEngine, NodeId, NodeId) {
        let engine = StoryEngine::new();
        let a = engine.create_node(Node::new(NodeType::Scene)).unwrap().id;
        let b = engine.create_node(Node::new(NodeType::Scene)).unwrap().id;
        (engine, a, b)
    }

    #[test]
    fn test_create_engine() {
        let engine = StoryEngine::new();
        assert_eq!(engine.node_count(), 0);
        assert_eq!(engine.edge_count(), 0);
    }

    #[test]
    fn duplicate_node_id_rejected() {
        let engine = StoryEngine::new();
        engine
            .create_node(Node::with_id(NodeId::from("x"), NodeType::Item))
            .unwrap();
        let err = engine
            .create_node(Node::with_id(NodeId::from("x"), NodeType::Item))
            .unwrap_err();
        assert!(matches!(err, StoryError::Validation(_)));
    }

    #[test]
    fn update_merges_and_removes_properties() {
        let engine = StoryEngine::new();
        let node = engine
            .create_node(Node::new(NodeType::Character).with_property("name", "Ada").with_property("mood", "calm"))
            .unwrap();

        let mut patch = HashMap::new();
        patch.insert("mood".to_string(), PropertyValue::Null);
        patch.insert("age".to_string(), PropertyValue::Int(31));
        let updated = engine.update_node(&node.id, patch).unwrap();

        assert_eq!(updated.node_type, NodeType::Character);
        assert_eq!(updated.property("name"), Some(&PropertyValue::from("Ada")));
        assert_eq!(updated.property("age"), Some(&PropertyValue::Int(31)));
        assert!(updated.property("mood").is_none());
        assert!(updated.updated_at >= node.updated_at);
    }

    #[test]
    fn gate_blocks_incompatible_edge() {
        let engine = StoryEngine::new();
        let place = engine.create_node(Node::new(NodeType::Location)).unwrap().id;
        let scene = engine.create_node(Node::new(NodeType::Scene)).unwrap().id;

        let err = engine
            .create_edge(&place, &scene, RelationType::AppearsIn, HashMap::new())
            .unwrap_err();
        match err {
            StoryError::IncompatibleEdge { from, relation, to, .. } => {
                assert_eq!(from, NodeType::Location);
                assert_eq!(relation, RelationType::AppearsIn);
                assert_eq!(to, NodeType::Scene);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.edge_count(), 0);

        engine
            .create_edge(&scene, &place, RelationType::LocatedAt, HashMap::new())
            .unwrap();
        assert_eq!(engine.edge_count(), 1);
    }

    #[test]
    fn edge_to_missing_node_is_not_found() {
        let (engine, a, _) = engine_with_scene_pair();
        let err = engine
            .create_edge(&a, &NodeId::from("ghost"), RelationType::LeadsTo, HashMap::new())
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn delete_node_cascades() {
        let (engine, a, b) = engine_with_scene_pair();
        engine.create_edge(&a, &b, RelationType::LeadsTo, HashMap::new()).unwrap();
        let removed = engine.delete_node(&a).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(engine.edge_count(), 0);
        assert!(engine.get_node(&a).is_none());
        assert!(engine.neighbors(&b).unwrap().is_empty());
    }

    #[test]
    fn neighbors_are_distinct() {
        let (engine, a, b) = engine_with_scene_pair();
        engine.create_edge(&a, &b, RelationType::LeadsTo, HashMap::new()).unwrap();
        engine.create_edge(&b, &a, RelationType::LeadsTo, HashMap::new()).unwrap();
        let around_a = engine.neighbors(&a).unwrap();
        assert_eq!(around_a.len(), 1);
        assert_eq!(around_a[0].id, b);
    }

    #[test]
    fn list_filters_by_story_and_type() {
        let engine = StoryEngine::new();
        let story = engine
            .create_node(Node::with_id(NodeId::from("story"), NodeType::Story))
            .unwrap()
            .id;
        engine.create_node(Node::new(NodeType::Scene).in_story(&story)).unwrap();
        engine.create_node(Node::new(NodeType::Scene)).unwrap();
        engine.create_node(Node::new(NodeType::Character).in_story(&story)).unwrap();

        assert_eq!(engine.list_nodes(&NodeFilter::new().in_story(story.clone())).len(), 3);
        let scenes = engine.list_nodes(&NodeFilter::new().in_story(story).with_type(NodeType::Scene));
        assert_eq!(scenes.len(), 1);
        assert_eq!(engine.list_nodes(&NodeFilter::new().with_limit(2)).len(), 2);
        assert_eq!(engine.list_nodes(&NodeFilter::new().with_offset(3)).len(), 1);
    }

    #[test]
    fn non_string_story_id_rejected() {
        let engine = StoryEngine::new();
        let err = engine
            .create_node(Node::new(NodeType::Scene).with_property(STORY_ID_PROPERTY, 7i64))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn update_rejects_non_string_story_id() {
        let engine = StoryEngine::new();
        let story = NodeId::from("story");
        let scene = engine.create_node(Node::new(NodeType::Scene).in_story(&story)).unwrap();

        let mut patch = HashMap::new();
        patch.insert(STORY_ID_PROPERTY.to_string(), PropertyValue::Int(5));
        let err = engine.update_node(&scene.id, patch).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(engine.get_node(&scene.id).unwrap().story_id(), Some(story));
    }

    #[test]
    fn concurrent_patches_keep_every_key() {
        let engine = StoryEngine::new();
        let id = engine.create_node(Node::new(NodeType::Scene)).unwrap().id;
        for round in 0..100 {
            let barrier = Barrier::new(2);
            std::thread::scope(|s| {
                for side in ["a", "b"] {
                    let (engine, id, barrier) = (&engine, &id, &barrier);
                    s.spawn(move || {
                        let mut patch = HashMap::new();
                        patch.insert(format!("{side}{round}"), PropertyValue::Int(1));
                        barrier.wait();
                        engine.update_node(id, patch).unwrap();
                    });
                }
            });
        }
        let node = engine.get_node(&id).unwrap();
        for round in 0..100 {
            assert!(node.property(&format!("a{round}")).is_some(), "lost a{round}");
            assert!(node.property(&format!("b{round}")).is_some(), "lost b{round}");
        }
    }

    #[test]
    fn concurrent_creates_with_one_id_admit_one() {
        let engine = StoryEngine::new();
        for round in 0..50 {
            let id = NodeId::from(format!("n{round}").as_str());
            let barrier = Barrier::new(4);
            let created = AtomicUsize::new(0);
            std::thread::scope(|s| {
                for _ in 0..4 {
                    let (engine, id, barrier, created) = (&engine, &id, &barrier, &created);
                    s.spawn(move || {
                        barrier.wait();
                        if engine.create_node(Node::with_id(id.clone(), NodeType::Item)).is_ok() {
                            created.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                }
            });
            assert_eq!(created.load(Ordering::SeqCst), 1);
        }
        assert_eq!(engine.node_count(), 50);
    }

    #[test]
    fn stats_count_by_type() {
        let (engine, a, b) = engine_with_scene_pair();
        engine.create_edge(&a, &b, RelationType::LeadsTo, HashMap::new()).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.nodes_by_type.get(&NodeType::Scene), Some(&2));
        assert_eq!(stats.edges_by_relation.get(&RelationType::LeadsTo), Some(&1));
    }

    #[test]
    fn write_through_and_reload() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = StoryEngine::with_store(store.clone());
        let a = engine.create_node(Node::new(NodeType::Scene)).unwrap().id;
        let b = engine.create_node(Node::new(NodeType::Scene)).unwrap().id;
        engine.create_edge(&a, &b, RelationType::LeadsTo, HashMap::new()).unwrap();

        let reloaded = StoryEngine::with_store(store);
        assert_eq!(reloaded.load_all().unwrap(), 2);
        assert_eq!(reloaded.edge_count(), 1);
        assert_eq!(reloaded.get_node(&a).unwrap().node_type, NodeType::Scene);
    }
}
