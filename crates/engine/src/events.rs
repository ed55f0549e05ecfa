//! Event executor: background garbage collection
//!
//! A single worker thread (`vecmeta-gc`) consumes [`GcEvent`]s. For each
//! event it confirms the record is soft-deleted and unreachable from every
//! installed snapshot, then reclaims it through the holders, which run the
//! store's hard delete only once no scoped handle pins the record. Pinned
//! records are retried after `gc.poll_interval_ms`.
//!
//! GC is best-effort. Events are idempotent, ordering between them does not
//! matter, and anything left in the queue at shutdown is found again by
//! recovery on the next open.

use crate::config::GcConfig;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};
use vecmeta_concurrency::{Holders, Reclaim, Snapshots};
use vecmeta_core::{ErrorKind, Id, MetaError, ResourceKind, Result, Store};

/// Failed attempts (store errors, not pins) before an event is dropped
const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Request to reclaim one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcEvent {
    /// Record kind
    pub kind: ResourceKind,
    /// Record id
    pub id: Id,
}

impl GcEvent {
    /// Event for `(kind, id)`
    pub fn new(kind: ResourceKind, id: Id) -> Self {
        GcEvent { kind, id }
    }
}

/// Counters of the event executor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Events waiting in the queue (including deferred ones)
    pub queue_depth: usize,
    /// Events being processed right now
    pub in_flight: usize,
    /// Events accepted since start
    pub submitted: u64,
    /// Records physically removed
    pub hard_deleted: u64,
    /// Attempts postponed because the record was pinned or the store failed
    pub deferred: u64,
    /// Events dropped because there was nothing to do
    pub discarded: u64,
    /// Events dropped after repeated store failures
    pub failed: u64,
}

#[derive(Debug)]
struct Pending {
    event: GcEvent,
    not_before: Option<Instant>,
    failures: u32,
    /// Last attempt found the record pinned by a reader
    pinned: bool,
}

enum Outcome {
    HardDeleted,
    Discarded,
    Pinned(usize),
}

struct EventInner {
    queue: Mutex<VecDeque<Pending>>,
    work_ready: Condvar,
    idle_cond: Condvar,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    hard_deleted: AtomicU64,
    deferred: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
    store: Arc<dyn Store>,
    holders: Arc<Holders>,
    snapshots: Arc<Snapshots>,
    poll_interval: Duration,
    max_batch: usize,
}

/// Background garbage collector
pub struct EventExecutor {
    inner: Arc<EventInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventExecutor {
    /// Start the worker thread
    pub fn start(
        store: Arc<dyn Store>,
        holders: Arc<Holders>,
        snapshots: Arc<Snapshots>,
        config: &GcConfig,
    ) -> Result<Self> {
        let inner = Arc::new(EventInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            idle_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            hard_deleted: AtomicU64::new(0),
            deferred: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            store,
            holders,
            snapshots,
            poll_interval: config.poll_interval(),
            max_batch: config.max_batch.max(1),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("vecmeta-gc".to_string())
            .spawn(move || worker_loop(&worker_inner))
            .map_err(|e| MetaError::internal(format!("failed to spawn GC thread: {}", e)))?;

        Ok(EventExecutor {
            inner,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queue a record for reclamation; returns false after shutdown
    pub fn submit(&self, event: GcEvent) -> bool {
        if self.inner.shutdown.load(Ordering::Acquire) {
            debug!(target: "vecmeta::gc", kind = %event.kind, id = event.id, "Dropped GC event after shutdown");
            return false;
        }
        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Pending {
                event,
                not_before: None,
                failures: 0,
                pinned: false,
            });
        }
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
        self.inner.work_ready.notify_one();
        true
    }

    /// Queue many records at once
    pub fn submit_all(&self, events: impl IntoIterator<Item = GcEvent>) -> usize {
        events.into_iter().filter(|e| self.submit(*e)).count()
    }

    /// Block until the queue is empty and nothing is in flight, or `timeout`
    /// passes. Returns whether the executor went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.in_flight.load(Ordering::Acquire) > 0 {
            if self.inner.idle_cond.wait_until(&mut queue, deadline).timed_out() {
                return queue.is_empty() && self.inner.in_flight.load(Ordering::Acquire) == 0;
            }
        }
        true
    }

    /// Like [`EventExecutor::wait_idle`], but stops waiting once every
    /// queued event has been tried and found pinned.
    ///
    /// Pinned records stay pinned until their readers let go, which shutdown
    /// cannot force. Returns false on timeout.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.queue.lock();
        while self.inner.in_flight.load(Ordering::Acquire) > 0 || queue.iter().any(|p| !p.pinned) {
            if self.inner.idle_cond.wait_until(&mut queue, deadline).timed_out() {
                return self.inner.in_flight.load(Ordering::Acquire) == 0
                    && queue.iter().all(|p| p.pinned);
            }
        }
        true
    }

    /// Stop accepting events and join the worker.
    ///
    /// Events that are ready are still processed; deferred ones are left for
    /// the next open.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!(target: "vecmeta::gc", "GC worker panicked");
            }
        }
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Current counters
    pub fn stats(&self) -> GcStats {
        let queue_depth = self.inner.queue.lock().len();
        GcStats {
            queue_depth,
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            hard_deleted: self.inner.hard_deleted.load(Ordering::Relaxed),
            deferred: self.inner.deferred.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for EventExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventExecutor")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl EventInner {
    fn collect(&self, event: GcEvent) -> Result<Outcome> {
        let GcEvent { kind, id } = event;
        let stored = match self.store.get(kind, id) {
            Ok(stored) => stored,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Outcome::Discarded),
            Err(e) => return Err(e),
        };
        if !stored.is_soft_deleted() {
            return Ok(Outcome::Discarded);
        }
        if self.snapshots.references(kind, id) {
            warn!(target: "vecmeta::gc", %kind, id, "Soft-deleted record is still referenced");
            return Ok(Outcome::Discarded);
        }

        let reclaimed = self.holders.reclaim(kind, id, || {
            match self.store.hard_delete(kind, id) {
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            }
        })?;
        match reclaimed {
            Reclaim::Reclaimed => Ok(Outcome::HardDeleted),
            Reclaim::Pinned(pins) => Ok(Outcome::Pinned(pins)),
        }
    }
}

/// Remove up to `max` events that are due, keeping the rest in order
fn take_ready(queue: &mut VecDeque<Pending>, now: Instant, max: usize) -> Vec<Pending> {
    let mut ready = Vec::new();
    let mut waiting = VecDeque::with_capacity(queue.len());
    while let Some(pending) = queue.pop_front() {
        let due = pending.not_before.map_or(true, |t| t <= now);
        if due && ready.len() < max {
            ready.push(pending);
        } else {
            waiting.push_back(pending);
        }
    }
    *queue = waiting;
    ready
}

fn worker_loop(inner: &EventInner) {
    loop {
        let batch = {
            let mut queue = inner.queue.lock();
            loop {
                let batch = take_ready(&mut queue, Instant::now(), inner.max_batch);
                if !batch.is_empty() {
                    inner.in_flight.fetch_add(batch.len(), Ordering::Release);
                    break batch;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                match queue.iter().filter_map(|p| p.not_before).min() {
                    Some(at) => {
                        inner.work_ready.wait_until(&mut queue, at);
                    }
                    None => inner.work_ready.wait(&mut queue),
                }
            }
        };

        let processed = batch.len();
        let mut retry = Vec::new();
        for mut pending in batch {
            let event = pending.event;
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| inner.collect(event)));
            match outcome {
                Ok(Ok(Outcome::HardDeleted)) => {
                    inner.hard_deleted.fetch_add(1, Ordering::Relaxed);
                    trace!(target: "vecmeta::gc", kind = %event.kind, id = event.id, "Hard-deleted");
                }
                Ok(Ok(Outcome::Discarded)) => {
                    inner.discarded.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Ok(Outcome::Pinned(pins))) => {
                    inner.deferred.fetch_add(1, Ordering::Relaxed);
                    debug!(target: "vecmeta::gc", kind = %event.kind, id = event.id, pins, "Record pinned, deferring");
                    pending.not_before = Some(Instant::now() + inner.poll_interval);
                    pending.pinned = true;
                    retry.push(pending);
                }
                Ok(Err(e)) => {
                    pending.failures += 1;
                    pending.pinned = false;
                    if pending.failures >= MAX_FAILED_ATTEMPTS {
                        inner.failed.fetch_add(1, Ordering::Relaxed);
                        error!(target: "vecmeta::gc", kind = %event.kind, id = event.id, error = %e, "Giving up on GC event");
                    } else {
                        inner.deferred.fetch_add(1, Ordering::Relaxed);
                        warn!(target: "vecmeta::gc", kind = %event.kind, id = event.id, error = %e, "GC attempt failed, retrying");
                        pending.not_before = Some(Instant::now() + inner.poll_interval);
                        retry.push(pending);
                    }
                }
                Err(panic) => {
                    inner.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        target: "vecmeta::gc",
                        kind = %event.kind,
                        id = event.id,
                        "GC event panicked: {:?}",
                        panic.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
                    );
                }
            }
        }

        let mut queue = inner.queue.lock();
        queue.extend(retry);
        inner.in_flight.fetch_sub(processed, Ordering::Release);
        inner.idle_cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vecmeta_concurrency::testing::seed_collection;
    use vecmeta_concurrency::Snapshot;
    use vecmeta_core::{Resource, SegmentFile, StoreExt};
    use vecmeta_storage::MemoryStore;

    struct Env {
        store: Arc<dyn Store>,
        holders: Arc<Holders>,
        snapshots: Arc<Snapshots>,
        gc: EventExecutor,
    }

    fn env() -> Env {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let holders = Arc::new(Holders::new(Arc::clone(&store)));
        let snapshots = Arc::new(Snapshots::new());
        let config = GcConfig {
            poll_interval_ms: 5,
            max_batch: 4,
        };
        let gc = EventExecutor::start(
            Arc::clone(&store),
            Arc::clone(&holders),
            Arc::clone(&snapshots),
            &config,
        )
        .unwrap();
        Env {
            store,
            holders,
            snapshots,
            gc,
        }
    }

    fn wait() -> Duration {
        Duration::from_secs(5)
    }

    fn is_gone<T: Resource>(store: &Arc<dyn Store>, id: Id) -> bool {
        store.get_resource::<T>(id).is_err()
    }

    #[test]
    fn test_soft_deleted_record_is_hard_deleted() {
        let env = env();
        let seeded = seed_collection(&env.store, "c", 1, 1).unwrap();
        let file = seeded.file_ids[0];
        env.store.soft_delete(ResourceKind::SegmentFile, file).unwrap();

        assert!(env.gc.submit(GcEvent::new(ResourceKind::SegmentFile, file)));
        assert!(env.gc.wait_idle(wait()));
        assert!(is_gone::<SegmentFile>(&env.store, file));
        assert_eq!(env.gc.stats().hard_deleted, 1);
    }

    #[test]
    fn test_live_record_is_skipped() {
        let env = env();
        let seeded = seed_collection(&env.store, "c", 1, 1).unwrap();
        env.gc.submit(GcEvent::new(ResourceKind::SegmentFile, seeded.file_ids[0]));
        assert!(env.gc.wait_idle(wait()));
        assert!(!is_gone::<SegmentFile>(&env.store, seeded.file_ids[0]));
        assert_eq!(env.gc.stats().discarded, 1);
    }

    #[test]
    fn test_missing_record_is_discarded() {
        let env = env();
        env.gc.submit(GcEvent::new(ResourceKind::Segment, 999));
        assert!(env.gc.wait_idle(wait()));
        let stats = env.gc.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.hard_deleted, 0);
    }

    #[test]
    fn test_referenced_record_is_kept() {
        let env = env();
        let seeded = seed_collection(&env.store, "c", 1, 1).unwrap();
        let snap = Snapshot::load(&env.holders, seeded.commit_id).unwrap();
        env.snapshots.install(snap).unwrap();
        let file = seeded.file_ids[0];
        env.store.soft_delete(ResourceKind::SegmentFile, file).unwrap();

        env.gc.submit(GcEvent::new(ResourceKind::SegmentFile, file));
        assert!(env.gc.wait_idle(wait()));
        assert!(!is_gone::<SegmentFile>(&env.store, file));
    }

    #[test]
    fn test_pinned_record_waits_for_release() {
        let env = env();
        let seeded = seed_collection(&env.store, "c", 1, 1).unwrap();
        let file = seeded.file_ids[1];
        let pin = env.holders.load::<SegmentFile>(file).unwrap();
        env.store.soft_delete(ResourceKind::SegmentFile, file).unwrap();

        env.gc.submit(GcEvent::new(ResourceKind::SegmentFile, file));
        assert!(!env.gc.wait_idle(Duration::from_millis(50)));
        assert!(!is_gone::<SegmentFile>(&env.store, file));
        assert!(env.gc.stats().deferred >= 1);

        drop(pin);
        assert!(env.gc.wait_idle(wait()));
        assert!(is_gone::<SegmentFile>(&env.store, file));
    }

    #[test]
    fn test_drain_does_not_wait_for_pinned_records() {
        let env = env();
        let seeded = seed_collection(&env.store, "c", 1, 2).unwrap();
        let (pinned, free) = (seeded.file_ids[0], seeded.file_ids[1]);
        let pin = env.holders.load::<SegmentFile>(pinned).unwrap();
        for id in [pinned, free] {
            env.store.soft_delete(ResourceKind::SegmentFile, id).unwrap();
            env.gc.submit(GcEvent::new(ResourceKind::SegmentFile, id));
        }

        let started = Instant::now();
        assert!(env.gc.drain(wait()));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(is_gone::<SegmentFile>(&env.store, free));
        assert!(!is_gone::<SegmentFile>(&env.store, pinned));
        assert_eq!(env.gc.stats().queue_depth, 1);
        drop(pin);
    }

    #[test]
    fn test_duplicate_events_are_idempotent() {
        let env = env();
        let seeded = seed_collection(&env.store, "c", 1, 1).unwrap();
        let file = seeded.file_ids[0];
        env.store.soft_delete(ResourceKind::SegmentFile, file).unwrap();
        let event = GcEvent::new(ResourceKind::SegmentFile, file);
        assert_eq!(env.gc.submit_all([event, event, event]), 3);
        assert!(env.gc.wait_idle(wait()));
        let stats = env.gc.stats();
        assert_eq!(stats.hard_deleted, 1);
        assert_eq!(stats.discarded, 2);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let env = env();
        env.gc.shutdown();
        assert!(env.gc.is_shutdown());
        assert!(!env.gc.submit(GcEvent::new(ResourceKind::Segment, 1)));
    }
}
