//! Configuration types for the coordination layer.

use std::time::Duration;

/// Configuration for the cache client.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for empty markers written after a loader miss.
    ///
    /// Kept well below the real-value TTLs callers pass on each query, so a
    /// record created shortly after a cached miss becomes visible quickly.
    pub null_ttl: Duration,

    /// TTL of the per-key rebuild/mutex lock. A safety net against a crashed
    /// rebuilder; normal rebuilds release it explicitly.
    pub rebuild_lock_ttl: Duration,

    /// Number of background rebuild workers.
    pub rebuild_workers: usize,

    /// Capacity of the rebuild task queue. Submissions beyond this are
    /// dropped (and retried by the next stale read) rather than blocking
    /// request threads.
    pub rebuild_queue_depth: usize,

    /// Maximum lock-acquisition attempts for the mutex query strategy.
    pub mutex_max_attempts: u32,

    /// Base backoff between mutex attempts; actual sleeps are jittered.
    pub mutex_backoff: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            null_ttl: Duration::from_secs(120),       // 2 minutes
            rebuild_lock_ttl: Duration::from_secs(10),
            rebuild_workers: 10,
            rebuild_queue_depth: 64,
            mutex_max_attempts: 20,
            mutex_backoff: Duration::from_millis(50),
        }
    }
}

impl CacheConfig {
    /// Set the empty-marker TTL.
    pub fn with_null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl = ttl;
        self
    }

    /// Set the rebuild/mutex lock TTL.
    pub fn with_rebuild_lock_ttl(mut self, ttl: Duration) -> Self {
        self.rebuild_lock_ttl = ttl;
        self
    }

    /// Set the number of rebuild workers.
    pub fn with_rebuild_workers(mut self, workers: usize) -> Self {
        self.rebuild_workers = workers;
        self
    }

    /// Set the rebuild queue capacity.
    pub fn with_rebuild_queue_depth(mut self, depth: usize) -> Self {
        self.rebuild_queue_depth = depth;
        self
    }

    /// Set the mutex-strategy retry budget.
    pub fn with_mutex_max_attempts(mut self, attempts: u32) -> Self {
        self.mutex_max_attempts = attempts;
        self
    }

    /// Set the mutex-strategy base backoff.
    pub fn with_mutex_backoff(mut self, backoff: Duration) -> Self {
        self.mutex_backoff = backoff;
        self
    }
}

/// Configuration for the seckill order coordinator.
#[derive(Debug, Clone)]
pub struct SeckillConfig {
    /// TTL of the per-user order lock.
    pub lock_ttl: Duration,

    /// Retry attempts when the per-user lock is contended. Zero means a
    /// single non-blocking try: a concurrent request from the same user is
    /// rejected immediately as an in-flight duplicate.
    pub lock_attempts: u32,

    /// Base backoff between lock attempts; actual sleeps are jittered.
    pub lock_backoff: Duration,
}

impl Default for SeckillConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(10),
            lock_attempts: 0,
            lock_backoff: Duration::from_millis(50),
        }
    }
}

impl SeckillConfig {
    /// Set the per-user lock TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the lock retry budget.
    pub fn with_lock_attempts(mut self, attempts: u32) -> Self {
        self.lock_attempts = attempts;
        self
    }

    /// Set the lock retry base backoff.
    pub fn with_lock_backoff(mut self, backoff: Duration) -> Self {
        self.lock_backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.null_ttl, Duration::from_secs(120));
        assert_eq!(config.rebuild_workers, 10);
        assert!(config.null_ttl < Duration::from_secs(1800));
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::default()
            .with_null_ttl(Duration::from_secs(30))
            .with_rebuild_workers(2)
            .with_mutex_max_attempts(5);

        assert_eq!(config.null_ttl, Duration::from_secs(30));
        assert_eq!(config.rebuild_workers, 2);
        assert_eq!(config.mutex_max_attempts, 5);
    }

    #[test]
    fn test_seckill_defaults_fail_fast() {
        let config = SeckillConfig::default();
        assert_eq!(config.lock_attempts, 0);
    }
}
