//! Cache coordinator: lookups, background stores and invalidation
//!
//! Stores and invalidations run as spawned tasks off the response path.
//! Their failures are logged and counted, never returned to callers.

use super::metrics::CacheMetrics;
use super::policy::{Mutation, ResourceClass, TtlPolicy};
use super::store::CacheStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every lookup misses and nothing is written
    pub enabled: bool,
    pub ttl: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: TtlPolicy::default(),
        }
    }
}

/// Background cache tasks still running
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    metrics: Arc<CacheMetrics>,
    in_flight: Arc<InFlight>,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            store,
            config,
            metrics,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Read a cached value. Store errors and undecodable payloads are misses.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.metrics.record_miss();
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                self.metrics.record_miss();
                warn!(key, error = %e, "cache lookup failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.metrics.record_hit();
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                self.metrics.record_miss();
                warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Write a successful read back in the background
    pub fn store<T: Serialize>(&self, key: String, value: &T, class: ResourceClass) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.record_store_failure();
                warn!(key = %key, error = %e, "cache payload not serializable");
                return None;
            }
        };
        let ttl = self.config.ttl.ttl(class);
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        Some(self.spawn(async move {
            match store.set(&key, bytes, ttl).await {
                Ok(()) => metrics.record_store(),
                Err(e) => {
                    metrics.record_store_failure();
                    warn!(key = %key, error = %e, "cache store failed");
                }
            }
        }))
    }

    /// Drop every entry a committed mutation made stale, in the background.
    /// The task yields the number of keys removed.
    pub fn invalidate(&self, mutation: &Mutation) -> Option<JoinHandle<usize>> {
        if !self.config.enabled {
            return None;
        }
        let patterns = mutation.patterns();
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        Some(self.spawn(async move {
            let mut removed = 0;
            for pattern in patterns {
                match store.delete_matching(&pattern).await {
                    Ok(n) => removed += n,
                    Err(e) => {
                        metrics.record_invalidation_failure();
                        warn!(pattern = %pattern, error = %e, "cache invalidation failed");
                    }
                }
            }
            metrics.record_invalidated(removed);
            debug!(removed, "cache invalidated");
            removed
        }))
    }

    /// Wait until every background cache task has finished
    pub async fn flush(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            if self.in_flight.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    fn spawn<F>(&self, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(self.in_flight.clone());
        tokio::spawn(async move {
            let _guard = guard;
            work.await
        })
    }
}
