use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use crate::kernel::error::Result;

/// Core lifecycle trait implemented by every manager-like component.
///
/// `initialize` must be idempotent: a second call on an already-initialized
/// component is a no-op success. `start` implies `initialize` if it has not
/// run yet; `stop` releases runtime resources (worker tasks, subscriptions)
/// and leaves the component re-startable.
#[async_trait]
pub trait ManagerComponent: Send + Sync + Debug {
    fn name(&self) -> &'static str;
    async fn initialize(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Counters every component exposes through its stats accessor.
///
/// Backed by atomics so readers never contend with the component's own lock.
#[derive(Debug, Default)]
pub struct ComponentStats {
    operations: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl ComponentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            operations: self.operations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a component's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub operations: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl StatsSnapshot {
    /// Cache hit rate in `[0.0, 1.0]`; zero lookups yields 0.0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
