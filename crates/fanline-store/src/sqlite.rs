//! SQLite Store Implementation
//!
//! Implements every store trait over one SQLite database. This is the
//! default backend: embedded, zero-config, fast enough for single-node
//! deployments and deterministic enough for the scenario tests.
//!
//! ## Claim atomicity without SKIP LOCKED
//!
//! SQLite has no row-level locks, but it serialises writers, so the claim
//! is expressed as one statement:
//!
//! ```sql
//! UPDATE outbox SET status = 'processing', claimed_at = ?
//! WHERE id IN (SELECT id FROM outbox WHERE status = 'pending'
//!              ORDER BY created_at, id LIMIT ?)
//! RETURNING ...
//! ```
//!
//! Two workers running this concurrently are serialised by the write
//! lock; the second sees only rows the first left behind. The PostgreSQL
//! backend runs the same statement with `FOR UPDATE SKIP LOCKED` on the
//! inner select, which removes the serialisation as well.
//!
//! ## Connection pool
//!
//! File-backed databases use WAL mode with a busy timeout so concurrent
//! worker tasks retry instead of failing with `SQLITE_BUSY`. In-memory
//! databases pin the pool to a single connection, because every pooled
//! connection would otherwise open its own empty database.

use crate::error::Result;
use crate::{FanStore, FollowStore, InboxStore, OutboxStore, PostStore, UserStore};
use async_trait::async_trait;
use fanline_core::{FanEdge, FollowEdge, InboxRow, OutboxEvent, OutboxStatus, Post, User};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Maximum rows per bulk insert statement, keeping well under SQLite's
/// bound-parameter limit.
const BULK_CHUNK: usize = 1000;

/// SQLite-backed store implementing all persistence traits.
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Open (or create) a file-backed database and run migrations.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. Single connection: pooled in-memory
    /// connections do not share data.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Bulk-insert fan edges with caller-controlled IDs and timestamps.
    /// Scenario setups use this to lay out deterministic follow orders.
    pub async fn seed_fans(&self, rows: &[FanEdge]) -> Result<()> {
        for chunk in rows.chunks(BULK_CHUNK) {
            let mut qb =
                QueryBuilder::new("INSERT INTO fans (id, owner_id, fan_id, created_at) ");
            qb.push_values(chunk, |mut b, f| {
                b.push_bind(&f.id)
                    .push_bind(&f.owner_id)
                    .push_bind(&f.fan_id)
                    .push_bind(f.created_at);
            });
            qb.push(" ON CONFLICT (owner_id, fan_id) DO NOTHING");
            qb.build().execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn row_to_follow(row: &SqliteRow) -> FollowEdge {
    FollowEdge {
        id: row.get("id"),
        follower_id: row.get("follower_id"),
        followee_id: row.get("followee_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_fan(row: &SqliteRow) -> FanEdge {
    FanEdge {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        fan_id: row.get("fan_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_user(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        age: row.get("age"),
        created_at: row.get("created_at"),
    }
}

fn row_to_event(row: &SqliteRow) -> OutboxEvent {
    let status: String = row.get("status");
    OutboxEvent {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        status: OutboxStatus::parse(&status).unwrap_or(OutboxStatus::Pending),
        claimed_at: row.get("claimed_at"),
        processed_at: row.get("processed_at"),
        fanout_count: row.get("fanout_count"),
    }
}

fn row_to_inbox(row: &SqliteRow) -> InboxRow {
    InboxRow {
        id: row.get("id"),
        user_id: row.get("user_id"),
        post_id: row.get("post_id"),
        score: row.get("score"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl FollowStore for SqliteGraphStore {
    async fn create_idempotent(&self, follower_id: &str, followee_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO follows (id, follower_id, followee_id, created_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (follower_id, followee_id) DO NOTHING",
        )
        .bind(fanline_core::new_id())
        .bind(follower_id)
        .bind(followee_id)
        .bind(Self::now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, follower_id: &str, followee_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_followings(
        &self,
        follower_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<FollowEdge>> {
        let rows = sqlx::query(
            "SELECT id, follower_id, followee_id, created_at \
             FROM follows WHERE follower_id = ? \
             ORDER BY created_at DESC, id \
             LIMIT ? OFFSET ?",
        )
        .bind(follower_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_follow).collect())
    }

    async fn exists(&self, follower_id: &str, followee_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ? AND followee_id = ?",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl FanStore for SqliteGraphStore {
    async fn create_idempotent(&self, owner_id: &str, fan_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO fans (id, owner_id, fan_id, created_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (owner_id, fan_id) DO NOTHING",
        )
        .bind(fanline_core::new_id())
        .bind(owner_id)
        .bind(fan_id)
        .bind(Self::now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, owner_id: &str, fan_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM fans WHERE owner_id = ? AND fan_id = ?")
            .bind(owner_id)
            .bind(fan_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_fans(&self, owner_id: &str, offset: u32, limit: u32) -> Result<Vec<FanEdge>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, fan_id, created_at \
             FROM fans WHERE owner_id = ? \
             ORDER BY created_at DESC, id \
             LIMIT ? OFFSET ?",
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_fan).collect())
    }

    async fn list_fan_ids(&self, owner_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT fan_id FROM fans WHERE owner_id = ? ORDER BY created_at DESC, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn list_fan_profiles(
        &self,
        owner_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT u.id, u.username, u.email, u.age, u.created_at \
             FROM fans f JOIN users u ON f.fan_id = u.id \
             WHERE f.owner_id = ? \
             ORDER BY f.created_at DESC, f.id \
             LIMIT ? OFFSET ?",
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_user).collect())
    }

    async fn count_fans(&self, owner_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fans WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl PostStore for SqliteGraphStore {
    async fn insert(&self, post: &Post) -> Result<()> {
        sqlx::query("INSERT INTO posts (id, author_id, payload, created_at) VALUES (?, ?, ?, ?)")
            .bind(&post.id)
            .bind(&post.author_id)
            .bind(&post.payload)
            .bind(post.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_with_event(&self, post: &Post, event: &OutboxEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO posts (id, author_id, payload, created_at) VALUES (?, ?, ?, ?)")
            .bind(&post.id)
            .bind(&post.author_id)
            .bind(&post.payload)
            .bind(post.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO outbox (id, post_id, author_id, created_at, status, fanout_count) \
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(&event.id)
        .bind(&event.post_id)
        .bind(&event.author_id)
        .bind(event.created_at)
        .bind(event.status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for SqliteGraphStore {
    async fn insert(&self, event: &OutboxEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO outbox (id, post_id, author_id, created_at, status, fanout_count) \
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(&event.id)
        .bind(&event.post_id)
        .bind(&event.author_id)
        .bind(event.created_at)
        .bind(event.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            "UPDATE outbox SET status = 'processing', claimed_at = ? \
             WHERE id IN (SELECT id FROM outbox WHERE status = 'pending' \
                          ORDER BY created_at, id LIMIT ?) \
             RETURNING id, post_id, author_id, created_at, status, claimed_at, \
                       processed_at, fanout_count",
        )
        .bind(Self::now_ms())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut events: Vec<OutboxEvent> = rows.iter().map(row_to_event).collect();
        // RETURNING does not guarantee order; callers expect claim order.
        events.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(events)
    }

    async fn mark_done(&self, id: &str, processed_at: i64, fanout_count: i64) -> Result<()> {
        sqlx::query(
            "UPDATE outbox SET status = 'done', processed_at = ?, fanout_count = ? WHERE id = ?",
        )
        .bind(processed_at)
        .bind(fanout_count)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_stale(&self, claimed_before: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE outbox SET status = 'pending', claimed_at = NULL \
             WHERE status = 'processing' AND claimed_at IS NOT NULL AND claimed_at < ?",
        )
        .bind(claimed_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get(&self, id: &str) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(
            "SELECT id, post_id, author_id, created_at, status, claimed_at, \
                    processed_at, fanout_count \
             FROM outbox WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_event))
    }

    async fn count_with_status(&self, status: OutboxStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl InboxStore for SqliteGraphStore {
    async fn upsert_many(&self, rows: &[InboxRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        for chunk in rows.chunks(BULK_CHUNK) {
            let mut qb =
                QueryBuilder::new("INSERT INTO inbox (id, user_id, post_id, score, created_at) ");
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(&r.id)
                    .push_bind(&r.user_id)
                    .push_bind(&r.post_id)
                    .push_bind(r.score)
                    .push_bind(r.created_at);
            });
            qb.push(" ON CONFLICT (user_id, post_id) DO NOTHING");
            inserted += qb.build().execute(&self.pool).await?.rows_affected();
        }
        Ok(inserted)
    }

    async fn list_timeline(
        &self,
        user_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<InboxRow>> {
        let rows = sqlx::query(
            "SELECT id, user_id, post_id, score, created_at \
             FROM inbox WHERE user_id = ? \
             ORDER BY score DESC, id DESC \
             LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_inbox).collect())
    }

    async fn count_for_post(&self, post_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inbox WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl UserStore for SqliteGraphStore {
    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, age, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.age)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_many(&self, users: &[User]) -> Result<()> {
        for chunk in users.chunks(BULK_CHUNK) {
            let mut qb =
                QueryBuilder::new("INSERT INTO users (id, username, email, age, created_at) ");
            qb.push_values(chunk, |mut b, u| {
                b.push_bind(&u.id)
                    .push_bind(&u.username)
                    .push_bind(&u.email)
                    .push_bind(u.age)
                    .push_bind(u.created_at);
            });
            qb.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb =
            QueryBuilder::new("SELECT id, username, email, age, created_at FROM users WHERE id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id);
        }
        qb.push(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_user).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanline_core::{now_ms, new_id};

    async fn setup() -> SqliteGraphStore {
        SqliteGraphStore::new_in_memory().await.unwrap()
    }

    fn test_user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: format!("user_{}", id),
            email: format!("{}@example.com", id),
            age: 30,
            created_at: now_ms(),
        }
    }

    #[tokio::test]
    async fn follow_create_is_idempotent() {
        let store = setup().await;

        FollowStore::create_idempotent(&store, "a", "b").await.unwrap();
        FollowStore::create_idempotent(&store, "a", "b").await.unwrap();

        let edges = store.list_followings("a", 0, 10).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].followee_id, "b");
        assert!(FollowStore::exists(&store, "a", "b").await.unwrap());
    }

    #[tokio::test]
    async fn follow_delete_missing_edge_is_ok() {
        let store = setup().await;
        FollowStore::delete(&store, "a", "b").await.unwrap();
        assert!(!FollowStore::exists(&store, "a", "b").await.unwrap());
    }

    #[tokio::test]
    async fn fan_listing_is_newest_first() {
        let store = setup().await;
        let base = now_ms();
        let fans: Vec<FanEdge> = (0..5)
            .map(|i| FanEdge {
                id: new_id(),
                owner_id: "owner".to_string(),
                fan_id: format!("fan{}", i),
                created_at: base - i * 1000,
            })
            .collect();
        store.seed_fans(&fans).await.unwrap();

        let listed = store.list_fans("owner", 0, 10).await.unwrap();
        assert_eq!(listed.len(), 5);
        assert_eq!(listed[0].fan_id, "fan0", "most recent fan first");
        assert_eq!(listed[4].fan_id, "fan4");

        let ids = store.list_fan_ids("owner").await.unwrap();
        assert_eq!(ids, vec!["fan0", "fan1", "fan2", "fan3", "fan4"]);
        assert_eq!(store.count_fans("owner").await.unwrap(), 5);

        // Offset pagination walks the same order
        let page2 = store.list_fans("owner", 2, 2).await.unwrap();
        assert_eq!(page2[0].fan_id, "fan2");
        assert_eq!(page2[1].fan_id, "fan3");
    }

    #[tokio::test]
    async fn fan_pair_is_unique() {
        let store = setup().await;
        FanStore::create_idempotent(&store, "o", "f").await.unwrap();
        FanStore::create_idempotent(&store, "o", "f").await.unwrap();
        assert_eq!(store.count_fans("o").await.unwrap(), 1);

        FanStore::delete(&store, "o", "f").await.unwrap();
        assert_eq!(store.count_fans("o").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn publish_is_atomic() {
        let store = setup().await;
        let post = Post {
            id: "p1".to_string(),
            author_id: "author".to_string(),
            payload: "hello".to_string(),
            created_at: now_ms(),
        };
        let event = OutboxEvent::pending(&post.id, &post.author_id, post.created_at);

        store.insert_with_event(&post, &event).await.unwrap();
        assert_eq!(
            store.count_with_status(OutboxStatus::Pending).await.unwrap(),
            1
        );

        // A second event for p1 violates outbox uniqueness and must roll
        // back the whole transaction, including the new post row.
        let dup_post = Post {
            id: "p2".to_string(),
            ..post.clone()
        };
        let dup_event = OutboxEvent::pending(&post.id, &post.author_id, post.created_at);
        let err = store.insert_with_event(&dup_post, &dup_event).await;
        assert!(err.is_err());

        // The post from the failed transaction must not exist
        let posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(posts, 1);
        assert_eq!(
            store.count_with_status(OutboxStatus::Pending).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn claim_transitions_and_orders() {
        let store = setup().await;
        let base = now_ms();
        for i in 0..5 {
            let event = OutboxEvent {
                created_at: base + i,
                ..OutboxEvent::pending(&format!("post{}", i), "author", base + i)
            };
            OutboxStore::insert(&store, &event).await.unwrap();
        }

        let first = store.claim_pending(3).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].post_id, "post0", "oldest event claimed first");
        assert!(first.iter().all(|e| e.status == OutboxStatus::Processing));
        assert!(first.iter().all(|e| e.claimed_at.is_some()));

        // The second claim sees only unclaimed rows
        let second = store.claim_pending(10).await.unwrap();
        assert_eq!(second.len(), 2);
        let mut all: Vec<&str> = first
            .iter()
            .chain(second.iter())
            .map(|e| e.post_id.as_str())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 5, "no event claimed twice");

        // Nothing left
        assert!(store.claim_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_done_records_outcome() {
        let store = setup().await;
        let event = OutboxEvent::pending("p", "a", now_ms());
        OutboxStore::insert(&store, &event).await.unwrap();
        store.claim_pending(1).await.unwrap();

        let done_at = now_ms();
        store.mark_done(&event.id, done_at, 42).await.unwrap();

        let stored = store.get(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Done);
        assert_eq!(stored.processed_at, Some(done_at));
        assert_eq!(stored.fanout_count, 42);
    }

    #[tokio::test]
    async fn stale_processing_rows_are_released() {
        let store = setup().await;
        for i in 0..3 {
            let event = OutboxEvent::pending(&format!("p{}", i), "a", now_ms());
            OutboxStore::insert(&store, &event).await.unwrap();
        }
        let claimed = store.claim_pending(10).await.unwrap();
        assert_eq!(claimed.len(), 3);
        assert_eq!(
            store
                .count_with_status(OutboxStatus::Processing)
                .await
                .unwrap(),
            3
        );

        // Threshold in the past releases nothing
        let released = store.release_stale(claimed[0].claimed_at.unwrap() - 1000).await.unwrap();
        assert_eq!(released, 0);

        // Threshold in the future releases everything still processing
        let released = store.release_stale(now_ms() + 1000).await.unwrap();
        assert_eq!(released, 3);
        assert_eq!(
            store.count_with_status(OutboxStatus::Pending).await.unwrap(),
            3
        );

        // Released rows can be claimed again
        assert_eq!(store.claim_pending(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn inbox_upsert_ignores_duplicates() {
        let store = setup().await;
        let rows: Vec<InboxRow> = (0..4)
            .map(|i| InboxRow {
                id: new_id(),
                user_id: format!("u{}", i),
                post_id: "p1".to_string(),
                score: 100 + i,
                created_at: now_ms(),
            })
            .collect();

        assert_eq!(store.upsert_many(&rows).await.unwrap(), 4);
        // Same (user, post) pairs with fresh IDs: all ignored
        let replay: Vec<InboxRow> = rows
            .iter()
            .map(|r| InboxRow {
                id: new_id(),
                score: r.score + 1000,
                ..r.clone()
            })
            .collect();
        assert_eq!(store.upsert_many(&replay).await.unwrap(), 0);
        assert_eq!(store.count_for_post("p1").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn timeline_orders_by_score_then_id() {
        let store = setup().await;
        let rows = vec![
            InboxRow {
                id: "b".to_string(),
                user_id: "u".to_string(),
                post_id: "p1".to_string(),
                score: 100,
                created_at: 1,
            },
            InboxRow {
                id: "a".to_string(),
                user_id: "u".to_string(),
                post_id: "p2".to_string(),
                score: 100,
                created_at: 2,
            },
            InboxRow {
                id: "c".to_string(),
                user_id: "u".to_string(),
                post_id: "p3".to_string(),
                score: 200,
                created_at: 3,
            },
        ];
        store.upsert_many(&rows).await.unwrap();

        let timeline = store.list_timeline("u", 0, 10).await.unwrap();
        let ids: Vec<&str> = timeline.iter().map(|r| r.id.as_str()).collect();
        // Highest score first; equal scores fall back to id descending
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn user_bulk_load_finds_only_existing() {
        let store = setup().await;
        UserStore::insert(&store, &test_user("u1")).await.unwrap();
        store
            .insert_many(&[test_user("u2"), test_user("u3")])
            .await
            .unwrap();

        let found = store
            .find_many(&[
                "u1".to_string(),
                "u2".to_string(),
                "missing".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        assert!(store.find_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fan_profiles_join_follows_index_order() {
        let store = setup().await;
        store
            .insert_many(&[test_user("f1"), test_user("f2"), test_user("f3")])
            .await
            .unwrap();
        let base = now_ms();
        let fans: Vec<FanEdge> = ["f1", "f2", "f3"]
            .iter()
            .enumerate()
            .map(|(i, f)| FanEdge {
                id: new_id(),
                owner_id: "owner".to_string(),
                fan_id: f.to_string(),
                created_at: base - i as i64 * 1000,
            })
            .collect();
        store.seed_fans(&fans).await.unwrap();

        let profiles = store.list_fan_profiles("owner", 0, 2).await.unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].id, "f1");
        assert_eq!(profiles[1].id, "f2");
    }
}
