//! Cache stages composed around API handlers
//!
//! `CachedRead` answers from the cache or runs the handler and stores its
//! successful result. `Invalidation` runs a mutation handler and, only if
//! it commits, schedules invalidation of what it touched.

use super::coordinator::CacheCoordinator;
use super::policy::{Mutation, ResourceClass};
use crate::graph::StoryResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

/// A handler's value and whether it came from the cache
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub from_cache: bool,
}

pub struct CachedRead<'a> {
    cache: &'a CacheCoordinator,
    key: String,
    class: ResourceClass,
}

impl<'a> CachedRead<'a> {
    pub fn new(cache: &'a CacheCoordinator, key: String, class: ResourceClass) -> Self {
        Self { cache, key, class }
    }

    pub async fn run<T, F, Fut>(self, handler: F) -> StoryResult<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoryResult<T>>,
    {
        if let Some(value) = self.cache.lookup(&self.key).await {
            return Ok(Cached {
                value,
                from_cache: true,
            });
        }
        let value = handler().await?;
        self.cache.store(self.key, &value, self.class);
        Ok(Cached {
            value,
            from_cache: false,
        })
    }
}

pub struct Invalidation<'a> {
    cache: &'a CacheCoordinator,
}

impl<'a> Invalidation<'a> {
    pub fn new(cache: &'a CacheCoordinator) -> Self {
        Self { cache }
    }

    /// Run `handler`; on success invalidate the scope `touched` derives
    /// from its output
    pub async fn run<T, F, Fut, S>(self, handler: F, touched: S) -> StoryResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoryResult<T>>,
        S: FnOnce(&T) -> Mutation,
    {
        let out = handler().await?;
        self.cache.invalidate(&touched(&out));
        Ok(out)
    }
}
