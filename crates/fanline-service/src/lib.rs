//! Fanline Services
//!
//! The service layer of the social-graph backend. Three pipelines live
//! here, each bounded and deliberately lossy where the spec of the
//! system allows it:
//!
//! - **FollowerListCache**: paginated follower reads through a two-tier
//!   cache (per-owner ID index + per-user snapshots).
//! - **FanReplicator**: bounded queue of Add/Remove intents keeping the
//!   denormalised fan table eventually consistent with follow edges.
//! - **Publisher + FanoutWorkerPool**: transactional outbox drained by
//!   claim-with-skip-locked workers into per-follower inbox rows, with a
//!   sweeper recovering rows stranded by crashes.
//!
//! ## Data flow
//!
//! ```text
//! Follow ──► FollowStore (sync) ──► Replicator queue ──► FanStore
//!
//! Publish ──► [posts + outbox] one tx ──► claim ──► page fans ──► inbox
//!
//! Fetch ──► index range ──► snapshot mget ──► bulk load misses
//! ```
//!
//! [`Runtime`] wires the pieces together and owns start/stop of the
//! background workers.

pub mod config;
pub mod error;
pub mod fanout;
pub mod follower_cache;
pub mod publisher;
pub mod relationship;
pub mod replicator;
pub mod runtime;

pub use config::{FanoutConfig, FollowerCacheConfig, ReplicatorConfig};
pub use error::{Result, ServiceError};
pub use fanout::{FanoutHandle, FanoutWorkerPool};
pub use follower_cache::{FollowerCounters, FollowerListCache};
pub use publisher::Publisher;
pub use relationship::RelationshipService;
pub use replicator::{FanOp, FanReplicator, ReplicatorHandle};
pub use runtime::{Runtime, RuntimeConfig};
