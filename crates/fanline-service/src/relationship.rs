//! Relationship Service
//!
//! Owns the follow/unfollow write path: the authoritative follow edge is
//! written synchronously, the denormalised fan edge is enqueued with the
//! replicator. The follow is acknowledged even if the enqueue is dropped;
//! the fan table is eventually consistent by contract.

use crate::error::{Result, ServiceError};
use crate::replicator::FanReplicator;
use fanline_store::{FanStore, FollowStore};
use std::sync::Arc;

pub struct RelationshipService {
    follows: Arc<dyn FollowStore>,
    fans: Arc<dyn FanStore>,
    replicator: Arc<FanReplicator>,
}

impl RelationshipService {
    pub fn new(
        follows: Arc<dyn FollowStore>,
        fans: Arc<dyn FanStore>,
        replicator: Arc<FanReplicator>,
    ) -> Self {
        Self {
            follows,
            fans,
            replicator,
        }
    }

    /// `from` starts following `to`. Idempotent; self-follows are
    /// rejected.
    pub async fn follow(&self, from_user: &str, to_user: &str) -> Result<()> {
        if from_user == to_user {
            return Err(ServiceError::SelfFollow);
        }
        self.follows.create_idempotent(from_user, to_user).await?;
        self.replicator.enqueue_add(to_user, from_user);
        Ok(())
    }

    /// `from` stops following `to`. Missing edges are not errors.
    pub async fn unfollow(&self, from_user: &str, to_user: &str) -> Result<()> {
        self.follows.delete(from_user, to_user).await?;
        self.replicator.enqueue_remove(to_user, from_user);
        Ok(())
    }

    /// IDs the user follows, newest first. 1-indexed pages.
    pub async fn list_following(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<String>> {
        let (page, page_size) = clamp(page, page_size);
        let edges = self
            .follows
            .list_followings(user_id, (page - 1) * page_size, page_size)
            .await?;
        Ok(edges.into_iter().map(|e| e.followee_id).collect())
    }

    /// IDs following the user, newest first, read from the fan table.
    pub async fn list_fans(&self, user_id: &str, page: u32, page_size: u32) -> Result<Vec<String>> {
        let (page, page_size) = clamp(page, page_size);
        let edges = self
            .fans
            .list_fans(user_id, (page - 1) * page_size, page_size)
            .await?;
        Ok(edges.into_iter().map(|e| e.fan_id).collect())
    }
}

fn clamp(page: u32, page_size: u32) -> (u32, u32) {
    (page.max(1), page_size.max(1).min(1000))
}
