//! Operation executor
//!
//! Commits are serialised per collection through a FIFO ticket lane: the
//! thread that took ticket `n` runs only after tickets `0..n` have finished,
//! so at most one commit per collection is in flight and waiting operations
//! run in arrival order. Different collections use different lanes and commit
//! in parallel.
//!
//! CreateCollection and DropCollection additionally hold the process-wide
//! name lock. Lock order is always name lock, then lane.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;
use vecmeta_core::{Id, Result};

#[derive(Debug, Default)]
struct LaneState {
    next_ticket: u64,
    now_serving: u64,
}

/// FIFO lane of one collection
#[derive(Debug, Default)]
struct CommitLane {
    state: Mutex<LaneState>,
    turn: Condvar,
}

impl CommitLane {
    fn acquire(&self) -> LaneTurn<'_> {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        while state.now_serving != ticket {
            self.turn.wait(&mut state);
        }
        LaneTurn { lane: self }
    }

    fn pending(&self) -> u64 {
        let state = self.state.lock();
        state.next_ticket - state.now_serving
    }
}

/// Held while a commit runs; passes the lane on when dropped
struct LaneTurn<'a> {
    lane: &'a CommitLane,
}

impl Drop for LaneTurn<'_> {
    fn drop(&mut self) {
        let mut state = self.lane.state.lock();
        state.now_serving += 1;
        self.lane.turn.notify_all();
    }
}

/// Serialises commits per collection
#[derive(Debug, Default)]
pub struct OperationExecutor {
    lanes: DashMap<Id, Arc<CommitLane>>,
    names: Mutex<()>,
    committed: AtomicU64,
}

impl OperationExecutor {
    /// Create an executor with no lanes
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, collection_id: Id) -> Arc<CommitLane> {
        Arc::clone(
            self.lanes
                .entry(collection_id)
                .or_insert_with(|| Arc::new(CommitLane::default()))
                .value(),
        )
    }

    /// Run `commit` in the lane of `collection_id`
    pub fn run_in_lane<R>(&self, collection_id: Id, commit: impl FnOnce() -> Result<R>) -> Result<R> {
        let lane = self.lane(collection_id);
        let _turn = lane.acquire();
        trace!(target: "vecmeta::op", collection_id, "Lane acquired");
        let result = commit();
        if result.is_ok() {
            self.committed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Run `commit` holding the name lock only
    pub fn run_with_names<R>(&self, commit: impl FnOnce() -> Result<R>) -> Result<R> {
        let _names = self.names.lock();
        let result = commit();
        if result.is_ok() {
            self.committed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Run `commit` holding the name lock and the lane of `collection_id`
    pub fn run_with_names_in_lane<R>(
        &self,
        collection_id: Id,
        commit: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let _names = self.names.lock();
        self.run_in_lane(collection_id, commit)
    }

    /// Forget the lane of a dropped collection
    pub fn retire(&self, collection_id: Id) {
        self.lanes
            .remove_if(&collection_id, |_, lane| lane.pending() == 0);
    }

    /// Operations waiting on or running in the lane of `collection_id`
    pub fn pending(&self, collection_id: Id) -> u64 {
        self.lanes
            .get(&collection_id)
            .map(|lane| lane.pending())
            .unwrap_or(0)
    }

    /// Number of lanes
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Successful commits since creation
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }
}
