//! Runtime Wiring
//!
//! Assembles the stores, cache, and services into one unit with a
//! start/stop lifecycle. Shutdown order matters: the replicator intake
//! closes first and drains, then the fan-out workers stop at their next
//! tick boundary.

use crate::config::{FanoutConfig, FollowerCacheConfig, ReplicatorConfig};
use crate::fanout::{FanoutHandle, FanoutWorkerPool};
use crate::follower_cache::FollowerListCache;
use crate::publisher::Publisher;
use crate::relationship::RelationshipService;
use crate::replicator::{FanReplicator, ReplicatorHandle};
use fanline_cache::KvCache;
use fanline_store::{FanStore, FollowStore, InboxStore, OutboxStore, PostStore, UserStore};
use std::sync::Arc;
use tracing::info;

/// Per-subsystem configuration bundle.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub follower_cache: FollowerCacheConfig,
    pub replicator: ReplicatorConfig,
    pub fanout: FanoutConfig,
}

impl RuntimeConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self {
            follower_cache: FollowerCacheConfig::from_env(),
            replicator: ReplicatorConfig::from_env(),
            fanout: FanoutConfig::from_env(),
        }
    }
}

/// The assembled backend: services plus background worker lifecycles.
pub struct Runtime {
    pub relationships: RelationshipService,
    pub publisher: Publisher,
    pub follower_lists: Arc<FollowerListCache>,
    pub replicator: Arc<FanReplicator>,
    pub fanout: Arc<FanoutWorkerPool>,

    replicator_handle: Option<ReplicatorHandle>,
    fanout_handle: Option<FanoutHandle>,
}

impl Runtime {
    /// Wire every service against one store and one cache.
    pub fn new<S>(store: Arc<S>, cache: Arc<dyn KvCache>, config: RuntimeConfig) -> Self
    where
        S: FollowStore + FanStore + PostStore + OutboxStore + InboxStore + UserStore + 'static,
    {
        let replicator = Arc::new(FanReplicator::new(
            Arc::clone(&store) as Arc<dyn FanStore>,
            config.replicator,
        ));
        let relationships = RelationshipService::new(
            Arc::clone(&store) as Arc<dyn FollowStore>,
            Arc::clone(&store) as Arc<dyn FanStore>,
            Arc::clone(&replicator),
        );
        let publisher = Publisher::new(Arc::clone(&store) as Arc<dyn PostStore>);
        let follower_lists = Arc::new(FollowerListCache::new(
            Arc::clone(&store) as Arc<dyn FanStore>,
            Arc::clone(&store) as Arc<dyn UserStore>,
            cache,
            config.follower_cache,
        ));
        let fanout = Arc::new(FanoutWorkerPool::new(
            Arc::clone(&store) as Arc<dyn OutboxStore>,
            Arc::clone(&store) as Arc<dyn FanStore>,
            Arc::clone(&store) as Arc<dyn InboxStore>,
            config.fanout,
        ));

        Self {
            relationships,
            publisher,
            follower_lists,
            replicator,
            fanout,
            replicator_handle: None,
            fanout_handle: None,
        }
    }

    /// Launch the background workers. Idempotent: calling twice leaves
    /// the original workers running.
    pub fn start(&mut self) {
        if self.replicator_handle.is_none() {
            self.replicator_handle = Some(Arc::clone(&self.replicator).start());
        }
        if self.fanout_handle.is_none() {
            self.fanout_handle = Some(Arc::clone(&self.fanout).start());
        }
        info!("runtime started");
    }

    /// Graceful stop: drain the replicator, then halt fan-out at the
    /// next tick boundary.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.replicator_handle.take() {
            self.replicator.shutdown(handle).await;
        }
        if let Some(handle) = self.fanout_handle.take() {
            self.fanout.shutdown(handle).await;
        }
        info!("runtime stopped");
    }
}
