//! Core story graph data structures

mod edge;
mod engine;
mod node;


pub use edge::{Edge, EdgeId, RelationType};
pub use engine::{Direction, GraphStats, NodeFilter, StoryEngine, StoryError, StoryResult};
pub use node::{Node, NodeId, NodeType, Properties, PropertyValue, STORY_ID_PROPERTY};
