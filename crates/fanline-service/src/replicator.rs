//! Fan Replicator
//!
//! Keeps the denormalised `fans` table consistent with the authoritative
//! `follows` table, asynchronously. The follow write path enqueues an
//! intent here and returns; a fixed pool of workers applies the intents
//! to the fan store.
//!
//! ## Overflow policy: drop, never block
//!
//! The queue is bounded and enqueue is `try_send`. When the queue is
//! full the newest intent is dropped with a warning: fan redundancy is
//! eventually consistent anyway, and under sustained overload shedding
//! replication work is preferable to stalling user-visible follow
//! writes. Dropped intents are counted and observable via
//! [`FanReplicator::dropped`]; a reconciliation sweep outside this core
//! can repair the gap.
//!
//! ## Ordering
//!
//! No cross-job ordering is guaranteed. A rapid Follow/Unfollow/Follow
//! can apply out of order; the fan store's unique `(owner, fan)`
//! constraint makes Adds idempotent and Removes commute by
//! last-write-wins. Consumers must treat the fan table as eventually
//! consistent.
//!
//! ## Shutdown
//!
//! `shutdown` closes the intake, polls the queue until it drains or the
//! window expires (default 2 s at 50 ms), then signals stop and returns.
//! Workers prefer remaining jobs over the stop signal, so a short queue
//! actually drains during the window.

use crate::config::ReplicatorConfig;
use fanline_store::FanStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Replication intent for one fan edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOp {
    Add,
    Remove,
}

#[derive(Debug)]
struct ReplicateJob {
    op: FanOp,
    owner_id: String,
    fan_id: String,
    enqueued_at: Instant,
}

/// Handle to a running worker pool; pass back to
/// [`FanReplicator::shutdown`].
pub struct ReplicatorHandle {
    stop_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

/// Bounded asynchronous replicator from follow edges to fan edges.
pub struct FanReplicator {
    fans: Arc<dyn FanStore>,
    config: ReplicatorConfig,

    tx: mpsc::Sender<ReplicateJob>,
    rx: Arc<Mutex<mpsc::Receiver<ReplicateJob>>>,
    stopped: AtomicBool,
    dropped: AtomicU64,

    latency_tx: mpsc::Sender<Duration>,
    latency_rx: Mutex<mpsc::Receiver<Duration>>,
}

impl FanReplicator {
    pub fn new(fans: Arc<dyn FanStore>, config: ReplicatorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size);
        let (latency_tx, latency_rx) = mpsc::channel(config.metrics_capacity);
        Self {
            fans,
            config,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            stopped: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            latency_tx,
            latency_rx: Mutex::new(latency_rx),
        }
    }

    /// Launch the worker pool. Reopens the intake if a previous pool was
    /// shut down.
    pub fn start(self: Arc<Self>) -> ReplicatorHandle {
        self.stopped.store(false, Ordering::Release);
        let (stop_tx, stop_rx) = watch::channel(false);
        let workers = (0..self.config.workers.max(1))
            .map(|worker| {
                let this = Arc::clone(&self);
                let stop_rx = stop_rx.clone();
                tokio::spawn(async move { this.run_worker(worker, stop_rx).await })
            })
            .collect();

        info!(workers = self.config.workers, queue = self.config.queue_size, "fan replicator started");
        ReplicatorHandle { stop_tx, workers }
    }

    async fn run_worker(self: Arc<Self>, worker: usize, mut stop_rx: watch::Receiver<bool>) {
        loop {
            let job = {
                let mut rx = self.rx.lock().await;
                // Jobs win over the stop signal, so stop drains the
                // queue instead of abandoning it.
                tokio::select! {
                    biased;
                    job = rx.recv() => job,
                    _ = stop_rx.changed() => None,
                }
            };
            let Some(job) = job else { break };
            self.apply(job).await;
        }
        debug!(worker, "replicator worker stopped");
    }

    async fn apply(&self, job: ReplicateJob) {
        let result = tokio::time::timeout(self.config.job_timeout, async {
            match job.op {
                FanOp::Add => self.fans.create_idempotent(&job.owner_id, &job.fan_id).await,
                FanOp::Remove => self.fans.delete(&job.owner_id, &job.fan_id).await,
            }
        })
        .await;

        // Errors are swallowed: a later Add/Remove or a reconciliation
        // sweep restores correctness.
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(owner = %job.owner_id, fan = %job.fan_id, error = %e, "fan replication failed")
            }
            Err(_) => {
                warn!(owner = %job.owner_id, fan = %job.fan_id, "fan replication timed out")
            }
        }

        let _ = self.latency_tx.try_send(job.enqueued_at.elapsed());
    }

    /// Enqueue an Add intent. Never blocks; drops when the queue is full
    /// or the replicator is stopped.
    pub fn enqueue_add(&self, owner_id: &str, fan_id: &str) {
        self.enqueue(FanOp::Add, owner_id, fan_id);
    }

    /// Enqueue a Remove intent. Same non-blocking contract as
    /// [`Self::enqueue_add`].
    pub fn enqueue_remove(&self, owner_id: &str, fan_id: &str) {
        self.enqueue(FanOp::Remove, owner_id, fan_id);
    }

    fn enqueue(&self, op: FanOp, owner_id: &str, fan_id: &str) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let job = ReplicateJob {
            op,
            owner_id: owner_id.to_string(),
            fan_id: fan_id.to_string(),
            enqueued_at: Instant::now(),
        };
        if let Err(mpsc::error::TrySendError::Full(job)) = self.tx.try_send(job) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(owner = %job.owner_id, fan = %job.fan_id, "replicator queue full, dropping intent");
        }
    }

    /// Sampled queue depth.
    pub fn queue_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Intents dropped on overflow since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drain the sampled landing latencies (enqueue to apply) collected
    /// so far. Lossy by design: samples are dropped when the channel is
    /// full.
    pub async fn take_latencies(&self) -> Vec<Duration> {
        let mut rx = self.latency_rx.lock().await;
        let mut out = Vec::new();
        while let Ok(latency) = rx.try_recv() {
            out.push(latency);
        }
        out
    }

    /// Close the intake, wait for the queue to drain up to the
    /// configured window, then stop the workers. Returns unconditionally
    /// once the window expires.
    pub async fn shutdown(&self, handle: ReplicatorHandle) {
        self.stopped.store(true, Ordering::Release);

        let deadline = Instant::now() + self.config.drain_timeout;
        while Instant::now() < deadline && self.queue_len() > 0 {
            tokio::time::sleep(self.config.drain_poll).await;
        }

        let _ = handle.stop_tx.send(true);
        for worker in handle.workers {
            if tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .is_err()
            {
                warn!("replicator worker did not stop in time");
            }
        }
        info!(remaining = self.queue_len(), dropped = self.dropped(), "fan replicator stopped");
    }
}
