//! Model checkpoints kept in memory for the restore messages.
//!
//! Three kinds are kept: the state right after loading (initial), one user-labeled state, and
//! a bounded rolling history pushed every `snapshot_interval` steps, each taken just before
//! a step (step back).

use std::collections::VecDeque;

use crate::serialization::ModelState;

/// In-memory snapshot store.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    initial: Option<ModelState>,
    labeled: Option<ModelState>,
    rolling: VecDeque<ModelState>,
    capacity: usize,
}

impl SnapshotStore {
    /// Store keeping at most `capacity` rolling snapshots (at least one).
    pub fn new(capacity: usize) -> Self {
        Self { initial: None, labeled: None, rolling: VecDeque::new(), capacity: capacity.max(1) }
    }

    /// Forget everything (new model loaded) and remember `initial`.
    pub fn reset(&mut self, initial: ModelState) {
        self.rolling.clear();
        self.labeled = None;
        self.initial = Some(initial);
    }

    /// Change the rolling capacity, dropping the oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.rolling.len() > self.capacity {
            self.rolling.pop_front();
        }
    }

    /// Push a rolling snapshot.
    pub fn push(&mut self, state: ModelState) {
        if self.rolling.len() == self.capacity {
            self.rolling.pop_front();
        }
        self.rolling.push_back(state);
    }

    /// Number of rolling snapshots.
    pub fn len(&self) -> usize {
        self.rolling.len()
    }

    /// True when the rolling history is empty.
    pub fn is_empty(&self) -> bool {
        self.rolling.is_empty()
    }

    /// Remove and return the newest rolling snapshot.
    pub fn step_back(&mut self) -> Option<ModelState> {
        self.rolling.pop_back()
    }

    /// Remember `state` as the labeled snapshot.
    pub fn take_labeled(&mut self, state: ModelState) {
        self.labeled = Some(state);
    }

    /// Labeled snapshot, if any. Restoring keeps only rolling history older than it.
    pub fn labeled(&mut self) -> Option<ModelState> {
        let labeled = self.labeled.clone()?;
        self.rolling.retain(|s| s.step_idx < labeled.step_idx);
        Some(labeled)
    }

    /// State right after loading. Restoring clears the rolling history.
    pub fn initial(&mut self) -> Option<ModelState> {
        let initial = self.initial.clone()?;
        self.rolling.clear();
        Some(initial)
    }
}
