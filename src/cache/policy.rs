//! TTL policy and invalidation scopes

use super::key::{glob_escape, KEY_PREFIX};
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read paths; keys are derived from these
pub mod paths {
    use crate::graph::NodeId;

    pub const NODES: &str = "/nodes";
    pub const RELATIONSHIPS: &str = "/relationships";
    pub const STATS: &str = "/stats";
    pub const GRAPH: &str = "/graph";

    pub fn node(id: &NodeId) -> String {
        format!("{}/{}", NODES, id)
    }

    pub fn node_relationships(id: &NodeId) -> String {
        format!("{}/{}/relationships", NODES, id)
    }

    /// One-hop neighborhood, a graph traversal read
    pub fn neighbors(id: &NodeId) -> String {
        format!("{}/neighbors/{}", GRAPH, id)
    }
}

/// Kinds of cached read, each with its own lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    NodeList,
    Node,
    Relationships,
    GraphTraversal,
    Stats,
}

/// Cache lifetimes in seconds per resource class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    pub node_list: u64,
    pub node: u64,
    pub relationships: u64,
    pub graph_traversal: u64,
    pub stats: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            node_list: 300,
            node: 600,
            relationships: 300,
            graph_traversal: 120,
            stats: 60,
        }
    }
}

impl TtlPolicy {
    /// Longest TTL any resource class may be given
    pub const MAX_SECS: u64 = 7 * 24 * 60 * 60;

    /// The first class whose TTL exceeds `MAX_SECS`, with its value
    pub fn first_excessive(&self) -> Option<(&'static str, u64)> {
        [
            ("node_list", self.node_list),
            ("node", self.node),
            ("relationships", self.relationships),
            ("graph_traversal", self.graph_traversal),
            ("stats", self.stats),
        ]
        .into_iter()
        .find(|(_, secs)| *secs > Self::MAX_SECS)
    }

    pub fn ttl(&self, class: ResourceClass) -> Duration {
        let secs = match class {
            ResourceClass::NodeList => self.node_list,
            ResourceClass::Node => self.node,
            ResourceClass::Relationships => self.relationships,
            ResourceClass::GraphTraversal => self.graph_traversal,
            ResourceClass::Stats => self.stats,
        };
        Duration::from_secs(secs)
    }
}

/// A committed write, described by what it touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Node created or updated
    Node(NodeId),
    /// Node deleted along with its incident edges
    NodeDeleted { id: NodeId, neighbors: Vec<NodeId> },
    /// Relationship created or deleted
    Relationship { from: NodeId, to: NodeId },
}

impl Mutation {
    /// Key patterns this mutation makes stale
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        match self {
            Mutation::Node(id) => {
                push_list(&mut patterns, paths::NODES);
                push_node(&mut patterns, id);
            }
            Mutation::NodeDeleted { id, neighbors } => {
                push_list(&mut patterns, paths::NODES);
                push_node(&mut patterns, id);
                push_prefix(&mut patterns, paths::RELATIONSHIPS);
                for n in neighbors {
                    push_sub_resources(&mut patterns, n);
                }
            }
            Mutation::Relationship { from, to } => {
                push_prefix(&mut patterns, paths::RELATIONSHIPS);
                push_sub_resources(&mut patterns, from);
                if to != from {
                    push_sub_resources(&mut patterns, to);
                }
            }
        }
        push_prefix(&mut patterns, paths::STATS);
        push_prefix(&mut patterns, paths::GRAPH);
        patterns
    }
}

fn base(path: &str) -> String {
    format!("{}{}", KEY_PREFIX, glob_escape(path))
}

/// The bare path and any parameterized variant of it
fn push_list(patterns: &mut Vec<String>, path: &str) {
    let b = base(path);
    patterns.push(b.clone());
    patterns.push(format!("{}\\?*", b));
}

fn push_prefix(patterns: &mut Vec<String>, path: &str) {
    patterns.push(format!("{}*", base(path)));
}

fn push_node(patterns: &mut Vec<String>, id: &NodeId) {
    push_list(patterns, &paths::node(id));
    push_sub_resources(patterns, id);
}

fn push_sub_resources(patterns: &mut Vec<String>, id: &NodeId) {
    patterns.push(format!("{}/*", base(&paths::node(id))));
}
