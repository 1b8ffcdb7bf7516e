//! Graph-query collaborator
//!
//! The validator reads the story graph only through parameterized queries.
//! `EngineQuery` answers them from the in-process `StoryEngine`; a networked
//! graph database would implement the same traits.

mod memory;
mod types;

pub use memory::EngineQuery;
pub use types::{GraphQuery, Query, QueryError, QueryPattern, QuerySession, Record};
