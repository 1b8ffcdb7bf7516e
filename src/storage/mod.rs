//! Storage backends for storygraph
//!
//! The story graph and the rule registry persist through the `GraphStore`
//! and `RuleStore` traits. The shipped implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{GraphStore, OpenStore, RuleStore, StorageError, StorageResult};
