//! Fanline Persistence Layer
//!
//! This crate defines the store contracts the services are written
//! against, plus two sqlx backends that implement all of them over a
//! single relational schema:
//!
//! - [`SqliteGraphStore`]: embedded, zero-config, used by tests and
//!   single-node deployments.
//! - `PostgresGraphStore` (behind the `postgres` feature): the production
//!   backend, where outbox claims use native `FOR UPDATE SKIP LOCKED`.
//!
//! ## Contracts
//!
//! | Trait | Backing table | Hot operations |
//! |-------|---------------|----------------|
//! | [`FollowStore`] | `follows` | idempotent create, delete, paged listing |
//! | [`FanStore`] | `fans` | idempotent create, paged listing, full ID index load |
//! | [`PostStore`] | `posts` (+ `outbox`) | atomic post + outbox insert |
//! | [`OutboxStore`] | `outbox` | claim-with-skip-locked, done/stale transitions |
//! | [`InboxStore`] | `inbox` | conflict-ignoring bulk upsert, timeline reads |
//! | [`UserStore`] | `users` | bulk `WHERE id IN` loads |
//!
//! ## Claim semantics
//!
//! [`OutboxStore::claim_pending`] is the subscription mechanism of the
//! fan-out pipeline: the outbox table is the queue and row-level locks
//! that skip locked rows are what let W workers drain it concurrently
//! without a coordinator. Both backends perform the claim and the
//! transition to `processing` in one atomic statement, so no row is ever
//! claimed twice concurrently.
//!
//! ## Runtime Queries
//!
//! Both backends use runtime-checked queries (`sqlx::query`) rather than
//! the compile-time macros, so the workspace builds without a
//! `DATABASE_URL` and both backends can be compiled together.

pub mod error;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::{Result, StoreError};
pub use sqlite::SqliteGraphStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresGraphStore;

use async_trait::async_trait;
use fanline_core::{FanEdge, FollowEdge, InboxRow, OutboxEvent, OutboxStatus, Post, User};

/// Authoritative follow edges.
#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Insert the edge `(follower -> followee)`. Re-following is a no-op,
    /// never an error.
    async fn create_idempotent(&self, follower_id: &str, followee_id: &str) -> Result<()>;

    /// Delete the edge. Deleting a missing edge is a no-op.
    async fn delete(&self, follower_id: &str, followee_id: &str) -> Result<()>;

    /// Page through who `follower_id` follows, newest first.
    async fn list_followings(
        &self,
        follower_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<FollowEdge>>;

    async fn exists(&self, follower_id: &str, followee_id: &str) -> Result<bool>;
}

/// Denormalised fan edges, keyed by the followed user.
#[async_trait]
pub trait FanStore: Send + Sync {
    /// Insert `(owner, fan)`. Duplicate pairs are ignored, which is what
    /// makes replicator retries and out-of-order applies safe.
    async fn create_idempotent(&self, owner_id: &str, fan_id: &str) -> Result<()>;

    async fn delete(&self, owner_id: &str, fan_id: &str) -> Result<()>;

    /// Page through the fans of `owner_id`, ordered `created_at DESC, id`
    /// so pagination is stable across pages.
    async fn list_fans(&self, owner_id: &str, offset: u32, limit: u32) -> Result<Vec<FanEdge>>;

    /// Load the complete ordered fan ID list for `owner_id`. This is the
    /// index-refill query of the follower-list cache: one full load per
    /// cache miss, every page after that served from the cached index.
    async fn list_fan_ids(&self, owner_id: &str) -> Result<Vec<String>>;

    /// Joined page of fan user records, same order as [`Self::list_fans`].
    /// Used by the naive and uncached read paths.
    async fn list_fan_profiles(&self, owner_id: &str, offset: u32, limit: u32)
        -> Result<Vec<User>>;

    async fn count_fans(&self, owner_id: &str) -> Result<u64>;
}

/// Post storage, including the publish transaction.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, post: &Post) -> Result<()>;

    /// Insert the post and its outbox event in one transaction: either
    /// both rows commit or neither does, so a post can never exist
    /// without its pending outbox row.
    async fn insert_with_event(&self, post: &Post, event: &OutboxEvent) -> Result<()>;
}

/// The transactional outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn insert(&self, event: &OutboxEvent) -> Result<()>;

    /// Claim up to `limit` `pending` rows in `created_at` order and
    /// transition them to `processing`, stamping `claimed_at`.
    ///
    /// The claim is atomic: concurrently claiming workers receive
    /// disjoint batches. On PostgreSQL the select uses
    /// `FOR UPDATE SKIP LOCKED` so workers never block each other; rows
    /// locked by another worker are simply invisible until a later tick.
    async fn claim_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>>;

    /// Mark a claimed row `done` with its processing timestamp and the
    /// number of inbox rows produced.
    async fn mark_done(&self, id: &str, processed_at: i64, fanout_count: i64) -> Result<()>;

    /// Revert `processing` rows claimed before `claimed_before` (ms
    /// epoch) back to `pending`. Returns how many rows were released.
    /// This is the crash-recovery path: a worker that died mid-event
    /// leaves its rows in `processing`, and re-running fan-out is safe
    /// because inbox writes are idempotent.
    async fn release_stale(&self, claimed_before: i64) -> Result<u64>;

    async fn get(&self, id: &str) -> Result<Option<OutboxEvent>>;

    async fn count_with_status(&self, status: OutboxStatus) -> Result<u64>;
}

/// Materialised per-user timelines.
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Bulk insert, ignoring rows whose `(user_id, post_id)` already
    /// exists. Returns the number of rows actually inserted.
    async fn upsert_many(&self, rows: &[InboxRow]) -> Result<u64>;

    /// Page through a user's timeline in canonical order
    /// `(score DESC, id DESC)`.
    async fn list_timeline(&self, user_id: &str, offset: u32, limit: u32)
        -> Result<Vec<InboxRow>>;

    async fn count_for_post(&self, post_id: &str) -> Result<u64>;
}

/// User records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> Result<()>;

    async fn insert_many(&self, users: &[User]) -> Result<()>;

    /// Bulk load by ID with a single `WHERE id IN (...)` query. Order of
    /// the result is unspecified; callers re-order as needed.
    async fn find_many(&self, ids: &[String]) -> Result<Vec<User>>;
}
