//! Service Configuration
//!
//! One config struct per subsystem, each with production defaults and
//! environment-variable overrides. The environment surface:
//!
//! | Variable | Default | Controls |
//! |----------|---------|----------|
//! | `FANLINE_CACHE_TTL_SECS` | 600 | follower index + snapshot TTL |
//! | `FANLINE_REPLICATOR_QUEUE_SIZE` | 10000 | replicator queue capacity |
//! | `FANLINE_REPLICATOR_WORKERS` | 4 | replicator worker count |
//! | `FANLINE_REPLICATOR_DRAIN_MS` | 2000 | shutdown drain window |
//! | `FANLINE_FANOUT_WORKERS` | 4 | fan-out worker count |
//! | `FANLINE_FANOUT_CLAIM_LIMIT` | 128 | outbox rows claimed per tick |
//! | `FANLINE_FANOUT_BATCH_SIZE` | 500 | fan page size per inbox write |
//! | `FANLINE_FANOUT_POLL_MS` | 20 | worker tick interval |
//! | `FANLINE_FANOUT_STALE_MS` | 30000 | processing-row staleness bound |

use std::time::Duration;

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Tuning for the follower-list cache.
#[derive(Debug, Clone)]
pub struct FollowerCacheConfig {
    /// TTL applied to both the per-owner index and per-user snapshots.
    pub ttl: Duration,
    /// Page size substituted when a caller passes `size <= 0`.
    pub default_page_size: u32,
}

impl Default for FollowerCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            default_page_size: 20,
        }
    }
}

impl FollowerCacheConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_u64("FANLINE_CACHE_TTL_SECS") {
            config.ttl = Duration::from_secs(secs);
        }
        config
    }
}

/// Tuning for the fan replicator.
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Queue capacity. Enqueues beyond this are dropped, not blocked.
    pub queue_size: usize,
    /// Worker task count.
    pub workers: usize,
    /// Deadline applied to each store apply.
    pub job_timeout: Duration,
    /// How long shutdown waits for the queue to drain.
    pub drain_timeout: Duration,
    /// Drain poll interval during shutdown.
    pub drain_poll: Duration,
    /// Capacity of the lossy landing-latency channel.
    pub metrics_capacity: usize,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            queue_size: 10_000,
            workers: 4,
            job_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
            drain_poll: Duration::from_millis(50),
            metrics_capacity: 65_536,
        }
    }
}

impl ReplicatorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_u64("FANLINE_REPLICATOR_QUEUE_SIZE") {
            config.queue_size = (v as usize).max(1);
        }
        if let Some(v) = env_u64("FANLINE_REPLICATOR_WORKERS") {
            config.workers = (v as usize).max(1);
        }
        if let Some(v) = env_u64("FANLINE_REPLICATOR_DRAIN_MS") {
            config.drain_timeout = Duration::from_millis(v);
        }
        config
    }
}

/// Tuning for the fan-out worker pool and its sweeper.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Worker task count.
    pub workers: usize,
    /// Outbox rows claimed per worker tick.
    pub claim_limit: u32,
    /// Fans fetched (and inbox rows written) per page.
    pub batch_size: u32,
    /// Worker tick interval.
    pub poll_interval: Duration,
    /// `processing` rows claimed longer ago than this are swept back to
    /// `pending`.
    pub stale_after: Duration,
    /// Sweeper tick interval.
    pub sweep_interval: Duration,
    /// Capacity of the lossy landing-latency channel.
    pub metrics_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            claim_limit: 128,
            batch_size: 500,
            poll_interval: Duration::from_millis(20),
            stale_after: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            metrics_capacity: 65_536,
        }
    }
}

impl FanoutConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_u64("FANLINE_FANOUT_WORKERS") {
            config.workers = (v as usize).max(1);
        }
        if let Some(v) = env_u64("FANLINE_FANOUT_CLAIM_LIMIT") {
            config.claim_limit = (v as u32).max(1);
        }
        if let Some(v) = env_u64("FANLINE_FANOUT_BATCH_SIZE") {
            config.batch_size = (v as u32).max(1);
        }
        if let Some(v) = env_u64("FANLINE_FANOUT_POLL_MS") {
            config.poll_interval = Duration::from_millis(v.max(1));
        }
        if let Some(v) = env_u64("FANLINE_FANOUT_STALE_MS") {
            config.stale_after = Duration::from_millis(v);
        }
        config
    }
}
