//! Tracks which workers have parked at the current refresh barrier.

use std::collections::BTreeSet;

use super::state::WorkerId;

/// Set of checked-in workers for one refresh round.
///
/// A quorum is `capacity - 1` workers (at least one), which lets the last
/// worker to arrive be the one that wakes the refresher. The tracker is full
/// when every worker has checked in.
#[derive(Debug, Clone)]
pub struct QuorumTracker {
    capacity: usize,
    checked_in: BTreeSet<WorkerId>,
}

impl QuorumTracker {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), checked_in: BTreeSet::new() }
    }

    /// Record a worker. Returns `false` if it was already checked in or is
    /// outside the pool.
    pub fn check_in(&mut self, worker: WorkerId) -> bool {
        if worker.index() >= self.capacity {
            return false;
        }
        self.checked_in.insert(worker)
    }

    /// Remove a worker that stopped waiting.
    pub fn withdraw(&mut self, worker: WorkerId) -> bool {
        self.checked_in.remove(&worker)
    }

    pub fn contains(&self, worker: WorkerId) -> bool {
        self.checked_in.contains(&worker)
    }

    pub fn len(&self) -> usize {
        self.checked_in.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checked_in.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn threshold(&self) -> usize {
        self.capacity.saturating_sub(1).max(1)
    }

    pub fn quorum_reached(&self) -> bool {
        self.len() >= self.threshold()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.checked_in.clear();
    }
}
