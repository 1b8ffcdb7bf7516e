//! Read-result caching kept coherent with graph mutations

mod coordinator;
mod key;
mod metrics;
mod policy;
mod stages;
mod store;

pub use coordinator::{CacheConfig, CacheCoordinator};
pub use key::{derive_key, glob_escape, KEY_PREFIX};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use policy::{paths, Mutation, ResourceClass, TtlPolicy};
pub use stages::{Cached, CachedRead, Invalidation};
pub use store::{compile_glob, CacheError, CacheStore, MemoryCacheStore};
