//! Record of output chunks already written in the current run.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::ChunkCoord;

use super::lock;

/// Tracks completed chunk coordinates and serializes concurrent writers of
/// the same coordinate.
///
/// Writers hold the coordinate's claim lock across check, assemble and
/// write, so a second writer of the same chunk waits and then observes it
/// complete. Claims on different coordinates never contend.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    completed: Mutex<HashSet<ChunkCoord>>,
    in_flight: Mutex<HashMap<ChunkCoord, Pending>>,
}

#[derive(Debug, Default)]
struct Pending {
    slot: Arc<Mutex<()>>,
    holders: usize,
}

/// A writer's hold on one chunk coordinate.
///
/// The coordinate's entry is retired when its last claim drops, whatever
/// the outcome of the write.
#[derive(Debug)]
pub struct Claim<'a> {
    tracker: &'a CompletionTracker,
    coord: ChunkCoord,
    slot: Arc<Mutex<()>>,
}

impl Claim<'_> {
    /// Block until no other writer holds this coordinate.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        lock(&self.slot)
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.tracker.in_flight);
        if let Some(pending) = in_flight.get_mut(&self.coord) {
            pending.holders = pending.holders.saturating_sub(1);
            if pending.holders == 0 {
                in_flight.remove(&self.coord);
            }
        }
    }
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `coord`. Callers lock the claim before checking completion.
    pub fn claim(&self, coord: ChunkCoord) -> Claim<'_> {
        let mut in_flight = lock(&self.in_flight);
        let pending = in_flight.entry(coord).or_default();
        pending.holders += 1;
        Claim {
            tracker: self,
            coord,
            slot: pending.slot.clone(),
        }
    }

    /// Coordinates with at least one live claim.
    pub fn claimed(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn is_complete(&self, coord: &ChunkCoord) -> bool {
        lock(&self.completed).contains(coord)
    }

    /// Record `coord` as written.
    ///
    /// Returns `false` if it was already recorded.
    pub fn mark_complete(&self, coord: ChunkCoord) -> bool {
        lock(&self.completed).insert(coord)
    }

    pub fn len(&self) -> usize {
        lock(&self.completed).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed coordinates in ascending order.
    pub fn completed(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = lock(&self.completed).iter().copied().collect();
        coords.sort();
        coords
    }

    /// Forget every completion.
    pub fn clear(&mut self) {
        self.completed
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.in_flight
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
