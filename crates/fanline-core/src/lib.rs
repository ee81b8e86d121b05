//! Fanline Core Types
//!
//! This crate defines the domain model shared by every other Fanline crate:
//! the social-graph entities (users, follow edges, fan edges), the publish
//! pipeline records (posts, outbox events, inbox rows), and the monotone
//! clock that assigns inbox scores.
//!
//! ## The two edge tables
//!
//! The graph is stored twice, on purpose:
//!
//! - **FollowEdge** is the authoritative record, written synchronously on
//!   every follow. It answers "who does A follow?".
//! - **FanEdge** is the denormalised inverse, keyed by the followed user.
//!   It answers "who follows B?" without scanning the follow table, which
//!   is what the follower-list cache and the fan-out worker page through.
//!
//! FanEdge rows are maintained asynchronously by the replicator and are
//! only eventually consistent with the follow table.
//!
//! ## Design decisions
//!
//! - All persisted types are Serialize/Deserialize
//! - Timestamps are i64 (milliseconds since epoch) for simplicity
//! - Identities are opaque strings (UUID v4 in practice)
//! - Inbox scores are i64 nanoseconds from [`ScoreClock`], not the post's
//!   publish time, so a timeline can be rescored without schema changes

pub mod clock;
pub mod types;

pub use clock::ScoreClock;
pub use types::*;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a fresh opaque entity ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
