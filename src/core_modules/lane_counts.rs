// THEORY:
// `LaneCountStore` is the only object several stream workers write to. Lanes are
// independent, so each lane gets its own `AtomicU64` and an increment is a single
// `fetch_add`: no lock is shared between lanes and no update can be lost.
//
// Counts only ever grow while a session runs. `reset` exists for the controller
// to reuse a store between sessions once no worker holds on to it any more.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Per-lane vehicle counters shared by every worker of a session.
#[derive(Debug)]
pub struct LaneCountStore {
    lanes: Vec<AtomicU64>,
}

impl LaneCountStore {
    pub fn new(lane_count: usize) -> Self {
        Self {
            lanes: (0..lane_count.max(1)).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Records one vehicle in `lane`. Out-of-range lanes are ignored.
    pub fn increment(&self, lane: usize) {
        match self.lanes.get(lane) {
            Some(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            None => warn!(lane, lanes = self.lanes.len(), "ignoring count for unknown lane"),
        }
    }

    pub fn snapshot(&self) -> LaneCounts {
        LaneCounts(
            self.lanes
                .iter()
                .map(|counter| counter.load(Ordering::Relaxed))
                .collect(),
        )
    }

    pub fn total(&self) -> u64 {
        self.lanes.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Zeroes every lane. Only meaningful while no worker is running.
    pub fn reset(&self) {
        for counter in &self.lanes {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of the lane counters, ordered by lane index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaneCounts(pub Vec<u64>);

impl LaneCounts {
    pub fn get(&self, lane: usize) -> Option<u64> {
        self.0.get(lane).copied()
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for LaneCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, count) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "Lane {}: Vehicles: {}", i + 1, count)?;
        }
        Ok(())
    }
}
