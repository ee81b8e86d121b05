//! Concurrency tests for the outbox claim protocol against a file-backed
//! SQLite database shared by several worker tasks.

use fanline_core::{now_ms, OutboxEvent, OutboxStatus};
use fanline_store::{OutboxStore, SqliteGraphStore};
use std::collections::HashSet;
use std::sync::Arc;

async fn file_backed_store() -> (SqliteGraphStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteGraphStore::new(dir.path().join("claim_test.db"))
        .await
        .unwrap();
    (store, dir)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_claim_disjoint_batches() {
    let (store, _dir) = file_backed_store().await;
    let store = Arc::new(store);

    let total_events = 64;
    for i in 0..total_events {
        let event = OutboxEvent {
            created_at: 1000 + i,
            ..OutboxEvent::pending(&format!("post{}", i), "author", 1000 + i)
        };
        store.insert(&event).await.unwrap();
    }

    // Four workers race, each claiming until the table is drained.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                let batch = store.claim_pending(8).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                claimed.extend(batch.into_iter().map(|e| e.id));
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(all.len() as i64, total_events, "every event claimed");
    assert_eq!(unique.len() as i64, total_events, "no event claimed twice");

    assert_eq!(
        store
            .count_with_status(OutboxStatus::Processing)
            .await
            .unwrap(),
        total_events as u64
    );
}

#[tokio::test]
async fn released_rows_flow_through_a_second_claim_cycle() {
    let (store, _dir) = file_backed_store().await;

    for i in 0..8 {
        let event = OutboxEvent::pending(&format!("p{}", i), "a", now_ms());
        store.insert(&event).await.unwrap();
    }

    // First worker claims everything and "crashes" before marking done.
    let claimed = store.claim_pending(100).await.unwrap();
    assert_eq!(claimed.len(), 8);

    // Sweeper releases the stranded rows, a fresh worker finishes them.
    let released = store.release_stale(now_ms() + 1).await.unwrap();
    assert_eq!(released, 8);

    let reclaimed = store.claim_pending(100).await.unwrap();
    assert_eq!(reclaimed.len(), 8);
    for event in &reclaimed {
        store.mark_done(&event.id, now_ms(), 0).await.unwrap();
    }
    assert_eq!(
        store.count_with_status(OutboxStatus::Done).await.unwrap(),
        8
    );
}
