//! Domain Type Definitions
//!
//! ## Types Overview
//!
//! ### User
//! A registered account. Read-mostly; created once, looked up in bulk when
//! rendering follower lists.
//!
//! ### FollowEdge
//! The authoritative directed edge "follower follows followee". The pair
//! `(follower_id, followee_id)` is unique and a user can never follow
//! themselves.
//!
//! ### FanEdge
//! The denormalised inverse edge, keyed by the followed user (`owner_id`)
//! with `fan_id` pointing back at the follower. Unique on
//! `(owner_id, fan_id)`; eventually consistent with the follow table.
//!
//! ### Post / OutboxEvent
//! A post is created atomically with exactly one outbox event. The outbox
//! event is the unit of fan-out work and moves `pending` -> `processing`
//! -> `done`.
//!
//! ### InboxRow
//! One materialised timeline entry per `(user_id, post_id)`. Canonical
//! read order is `(score DESC, id DESC)`.
//!
//! ### FollowerSnapshot
//! The small per-user record cached for list rendering. Its JSON layout is
//! the cache wire format for `user:{id}` keys, so the field names are part
//! of the persisted contract.

use serde::{Deserialize, Serialize};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub age: i64,
    pub created_at: i64,
}

/// Minimal user info required by timeline/follower pages.
///
/// Serialised as `{"id","username","email","age"}` under `user:{id}` cache
/// keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerSnapshot {
    pub id: String,
    pub username: String,
    pub email: String,
    pub age: i64,
}

impl From<&User> for FollowerSnapshot {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            username: u.username.clone(),
            email: u.email.clone(),
            age: u.age,
        }
    }
}

/// Authoritative directed follow relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub id: String,
    pub follower_id: String,
    pub followee_id: String,
    pub created_at: i64,
}

/// Denormalised inverse of a [`FollowEdge`], keyed by the followed user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanEdge {
    pub id: String,
    pub owner_id: String,
    pub fan_id: String,
    pub created_at: i64,
}

/// Content record. Created atomically with its outbox event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub payload: String,
    pub created_at: i64,
}

/// Lifecycle state of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Done,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "processing" => Some(OutboxStatus::Processing),
            "done" => Some(OutboxStatus::Done),
            _ => None,
        }
    }
}

/// Transactional outbox row driving fan-out.
///
/// Exactly one exists per post. `claimed_at` is stamped when a worker
/// claims the row; the sweeper uses it to detect rows stranded in
/// `processing` by a crashed worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub created_at: i64,
    pub status: OutboxStatus,
    pub claimed_at: Option<i64>,
    pub processed_at: Option<i64>,
    pub fanout_count: i64,
}

impl OutboxEvent {
    /// Build a fresh `pending` event for a post.
    pub fn pending(post_id: &str, author_id: &str, created_at: i64) -> Self {
        Self {
            id: crate::new_id(),
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            created_at,
            status: OutboxStatus::Pending,
            claimed_at: None,
            processed_at: None,
            fanout_count: 0,
        }
    }
}

/// One materialised timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxRow {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub score: i64,
    pub created_at: i64,
}
