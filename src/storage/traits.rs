//! Storage trait definitions

use crate::consistency::{ConsistencyRule, RuleId};
use crate::graph::{Edge, EdgeId, Node, NodeId};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for story nodes and edges
///
/// The in-memory `StoryEngine` writes through to a `GraphStore` and hydrates
/// from it on startup. Implementations must be thread-safe.
pub trait GraphStore: Send + Sync {
    /// Save a node (insert or update)
    fn save_node(&self, node: &Node) -> StorageResult<()>;

    /// Delete a node and every edge touching it
    fn delete_node(&self, node_id: &NodeId) -> StorageResult<bool>;

    /// Save an edge (insert or update)
    fn save_edge(&self, edge: &Edge) -> StorageResult<()>;

    fn delete_edge(&self, edge_id: &EdgeId) -> StorageResult<bool>;

    /// Load every stored node
    fn load_nodes(&self) -> StorageResult<Vec<Node>>;

    /// Load every stored edge
    fn load_edges(&self) -> StorageResult<Vec<Edge>>;
}

/// Persistence for user-authored consistency rules
pub trait RuleStore: Send + Sync {
    /// Save a rule (insert or update)
    fn save_rule(&self, rule: &ConsistencyRule) -> StorageResult<()>;

    fn load_rule(&self, id: &RuleId) -> StorageResult<Option<ConsistencyRule>>;

    /// All rules, newest first
    fn list_rules(&self) -> StorageResult<Vec<ConsistencyRule>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
