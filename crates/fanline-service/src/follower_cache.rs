//! Follower-List Cache
//!
//! Serves paginated follower lists through a two-tier cache: one ordered
//! ID index per owner plus one small snapshot per user.
//!
//! ## Why Two Tiers?
//!
//! The obvious cache key is `(owner, page, size)`, and [`FollowerListCache::fetch_naive`]
//! keeps that variant alive for comparison. It has two structural
//! problems:
//!
//! | | per-(owner,page,size) pages | owner index + user snapshots |
//! |---|---|---|
//! | storage | one entry per page/size combination | one index + one snapshot per user |
//! | invalidation units per owner | O(pages x sizes) | 1 |
//! | reuse across owners | none | snapshots shared by every list a user appears in |
//!
//! An average user appears in many followers' lists, so keying snapshots
//! by user means the second owner's page is mostly served from entries
//! the first owner's page already loaded.
//!
//! ## Read path
//!
//! 1. Range-read the index `followers:index:{owner}` for the requested
//!    page. On index miss, load the complete fan ID list from the store,
//!    publish it as `DEL + RPUSH + EXPIRE` in one atomic pipeline (no
//!    reader ever sees a partial prefix), and slice in memory.
//! 2. Multi-get `user:{id}` snapshots for the page's IDs.
//! 3. Bulk-load the misses from the user store with a single
//!    `WHERE id IN (...)` query and write their snapshots back.
//! 4. Emit results in index order, dropping IDs found in neither cache
//!    nor store.
//!
//! Writers do not invalidate; the shared TTL is the staleness bound.
//! Cache failures downgrade to a store read and are never surfaced.

use crate::config::FollowerCacheConfig;
use crate::error::Result;
use bytes::Bytes;
use fanline_cache::{CacheOp, KvCache};
use fanline_core::FollowerSnapshot;
use fanline_store::{FanStore, UserStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Snapshot of the store-hit counters, taken between scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FollowerCounters {
    /// Joined page queries issued by the naive/uncached paths.
    pub page_queries: u64,
    /// Full index loads (one per index cache miss).
    pub index_loads: u64,
    /// Bulk snapshot loads (one per page with at least one snapshot miss).
    pub user_bulk_loads: u64,
}

/// Two-tier follower-list cache over a fan store and a user store.
pub struct FollowerListCache {
    fans: Arc<dyn FanStore>,
    users: Arc<dyn UserStore>,
    cache: Arc<dyn KvCache>,
    config: FollowerCacheConfig,

    page_queries: AtomicU64,
    index_loads: AtomicU64,
    user_bulk_loads: AtomicU64,
}

fn index_key(owner_id: &str) -> String {
    format!("followers:index:{}", owner_id)
}

fn snapshot_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

fn page_key(owner_id: &str, page: u32, size: u32) -> String {
    format!("followers:{}:{}:{}", owner_id, page, size)
}

impl FollowerListCache {
    pub fn new(
        fans: Arc<dyn FanStore>,
        users: Arc<dyn UserStore>,
        cache: Arc<dyn KvCache>,
        config: FollowerCacheConfig,
    ) -> Self {
        Self {
            fans,
            users,
            cache,
            config,
            page_queries: AtomicU64::new(0),
            index_loads: AtomicU64::new(0),
            user_bulk_loads: AtomicU64::new(0),
        }
    }

    /// Coerce pagination to sane values: pages are 1-indexed, sizes
    /// default rather than error.
    fn clamp(&self, page: u32, size: u32) -> (u32, u32) {
        let page = page.max(1);
        let size = if size == 0 {
            self.config.default_page_size
        } else {
            size
        };
        (page, size)
    }

    /// Optimized read path: index range + snapshot multi-get.
    pub async fn fetch(
        &self,
        owner_id: &str,
        page: u32,
        size: u32,
    ) -> Result<Vec<FollowerSnapshot>> {
        let (page, size) = self.clamp(page, size);
        let start = ((page - 1) * size) as usize;

        let key = index_key(owner_id);
        let index_live = match self.cache.exists(&key).await {
            Ok(live) => live,
            Err(e) => {
                warn!(owner = owner_id, error = %e, "index existence check failed, treating as miss");
                false
            }
        };

        let ids = if index_live {
            match self
                .cache
                .lrange(&key, start as i64, (start + size as usize - 1) as i64)
                .await
            {
                // A live index with an empty range means the page is past
                // the end; the store holds nothing more.
                Ok(ids) => ids,
                Err(e) => {
                    warn!(owner = owner_id, error = %e, "index range read failed, refilling");
                    self.refill_index(owner_id, start, size).await?
                }
            }
        } else {
            self.refill_index(owner_id, start, size).await?
        };

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.load_snapshots(&ids).await
    }

    /// Load the full fan ID list from the store, publish it to the cache
    /// atomically, and slice out the requested page.
    async fn refill_index(&self, owner_id: &str, start: usize, size: u32) -> Result<Vec<String>> {
        self.index_loads.fetch_add(1, Ordering::Relaxed);
        let all_ids = self.fans.list_fan_ids(owner_id).await?;

        if !all_ids.is_empty() {
            let result = self
                .cache
                .pipeline(vec![
                    CacheOp::Del {
                        key: index_key(owner_id),
                    },
                    CacheOp::RPush {
                        key: index_key(owner_id),
                        values: all_ids.clone(),
                    },
                    CacheOp::Expire {
                        key: index_key(owner_id),
                        ttl: self.config.ttl,
                    },
                ])
                .await;
            if let Err(e) = result {
                warn!(owner = owner_id, error = %e, "index publish failed");
            }
        }

        if start >= all_ids.len() {
            return Ok(Vec::new());
        }
        let end = (start + size as usize).min(all_ids.len());
        Ok(all_ids[start..end].to_vec())
    }

    /// Resolve IDs to snapshots: multi-get, bulk-load the misses, merge.
    async fn load_snapshots(&self, ids: &[String]) -> Result<Vec<FollowerSnapshot>> {
        let keys: Vec<String> = ids.iter().map(|id| snapshot_key(id)).collect();
        let cached = match self.cache.mget(&keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "snapshot multi-get failed, treating all as misses");
                vec![None; ids.len()]
            }
        };

        let mut found: HashMap<String, FollowerSnapshot> = HashMap::with_capacity(ids.len());
        for (id, value) in ids.iter().zip(cached) {
            if let Some(bytes) = value {
                match serde_json::from_slice::<FollowerSnapshot>(&bytes) {
                    Ok(snap) => {
                        found.insert(id.clone(), snap);
                    }
                    Err(e) => {
                        warn!(user = %id, error = %e, "corrupt snapshot entry, reloading");
                    }
                }
            }
        }

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains_key(*id))
            .cloned()
            .collect();

        if !missing.is_empty() {
            self.user_bulk_loads.fetch_add(1, Ordering::Relaxed);
            let loaded = self.users.find_many(&missing).await?;
            for user in &loaded {
                let snap = FollowerSnapshot::from(user);
                match serde_json::to_vec(&snap) {
                    Ok(payload) => {
                        if let Err(e) = self
                            .cache
                            .set(&snapshot_key(&user.id), Bytes::from(payload), self.config.ttl)
                            .await
                        {
                            warn!(user = %user.id, error = %e, "snapshot write failed");
                        }
                    }
                    Err(e) => warn!(user = %user.id, error = %e, "snapshot encode failed"),
                }
                found.insert(user.id.clone(), snap);
            }
        }

        // Index order wins; IDs absent from both cache and store were
        // unfollowed or deleted mid-read and are silently dropped.
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// Naive comparator: one cache entry per `(owner, page, size)`.
    pub async fn fetch_naive(
        &self,
        owner_id: &str,
        page: u32,
        size: u32,
    ) -> Result<Vec<FollowerSnapshot>> {
        let (page, size) = self.clamp(page, size);
        let key = page_key(owner_id, page, size);

        match self.cache.get(&key).await {
            Ok(Some(bytes)) => {
                if let Ok(rows) = serde_json::from_slice::<Vec<FollowerSnapshot>>(&bytes) {
                    return Ok(rows);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(owner = owner_id, error = %e, "page cache read failed"),
        }

        let rows = self.query_follower_page(owner_id, page, size).await?;
        match serde_json::to_vec(&rows) {
            Ok(payload) => {
                if let Err(e) = self
                    .cache
                    .set(&key, Bytes::from(payload), self.config.ttl)
                    .await
                {
                    warn!(owner = owner_id, error = %e, "page cache write failed");
                }
            }
            Err(e) => warn!(owner = owner_id, error = %e, "page encode failed"),
        }
        Ok(rows)
    }

    /// Uncached baseline: straight to the joined store query.
    pub async fn fetch_uncached(
        &self,
        owner_id: &str,
        page: u32,
        size: u32,
    ) -> Result<Vec<FollowerSnapshot>> {
        let (page, size) = self.clamp(page, size);
        self.query_follower_page(owner_id, page, size).await
    }

    async fn query_follower_page(
        &self,
        owner_id: &str,
        page: u32,
        size: u32,
    ) -> Result<Vec<FollowerSnapshot>> {
        self.page_queries.fetch_add(1, Ordering::Relaxed);
        let users = self
            .fans
            .list_fan_profiles(owner_id, (page - 1) * size, size)
            .await?;
        Ok(users.iter().map(FollowerSnapshot::from).collect())
    }

    /// Current counter values.
    pub fn counters(&self) -> FollowerCounters {
        FollowerCounters {
            page_queries: self.page_queries.load(Ordering::Relaxed),
            index_loads: self.index_loads.load(Ordering::Relaxed),
            user_bulk_loads: self.user_bulk_loads.load(Ordering::Relaxed),
        }
    }

    /// Zero the counters. Only meaningful between scenarios with no
    /// fetch in flight.
    pub fn reset_counters(&self) {
        self.page_queries.store(0, Ordering::Relaxed);
        self.index_loads.store(0, Ordering::Relaxed);
        self.user_bulk_loads.store(0, Ordering::Relaxed);
    }
}
