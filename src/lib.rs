//! storygraph: narrative consistency validation for typed story graphs
//!
//! A story is a property graph of scenes, characters, choices, events,
//! locations and items joined by typed relationships. The graph schema
//! alone cannot see narrative contradictions; this crate adds:
//!
//! - **Compatibility gate**: rejects structurally invalid relationships
//!   before they are written
//! - **Consistency validator**: finds role conflicts, timeline disorder,
//!   impossible state changes and trait-defying choices, and scores them
//! - **Cache coordination**: keeps cached reads coherent with mutations
//!
//! # Example
//!
//! ```
//! use storygraph::{Node, NodeId, NodeType, StoryEngine};
//!
//! let engine = StoryEngine::new();
//! let story = engine
//!     .create_node(Node::with_id(NodeId::from("tides"), NodeType::Story))
//!     .unwrap();
//! assert_eq!(story.id.as_str(), "tides");
//! ```

pub mod api;
pub mod cache;
pub mod compat;
pub mod config;
pub mod consistency;
mod graph;
pub mod query;
pub mod storage;

pub use api::{ApiError, CreateNodeRequest, CreateRelationshipRequest, DeletedNode, Envelope, StoryApi};
pub use compat::{check_compatibility, Compatibility};
pub use config::{ConfigError, StoryConfig};
pub use consistency::{
    ConsistencyReport, ConsistencyRule, ConsistencyValidator, ConsistencyViolation, NewRule, RuleId, RuleRegistry,
    Severity, ValidationResult, ValidatorConfig, ViolationCategory,
};
pub use graph::{
    Direction, Edge, EdgeId, GraphStats, Node, NodeFilter, NodeId, NodeType, Properties, PropertyValue,
    RelationType, StoryEngine, StoryError, StoryResult, STORY_ID_PROPERTY,
};
pub use query::{EngineQuery, GraphQuery};
pub use storage::{GraphStore, OpenStore, RuleStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
