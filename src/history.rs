use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use libc::pid_t;
use crate::classify::counts;
use crate::data::Snapshot;

pub const SNAPSHOTS: usize = 5;
pub const TREND:     usize = 60;

/// The most recent snapshots, newest last.
#[derive(Debug)]
pub struct History {
    ring:     VecDeque<Arc<Snapshot>>,
    capacity: usize,
}

/// Total connection count of each recent scan, oldest first.
#[derive(Debug)]
pub struct Trend {
    points:   VecDeque<usize>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let ring = VecDeque::with_capacity(capacity);
        Self { ring, capacity: capacity.max(1) }
    }

    pub fn push(&mut self, snapshot: Snapshot) -> Arc<Snapshot> {
        while self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        let snapshot = Arc::new(snapshot);
        self.ring.push_back(snapshot.clone());
        snapshot
    }

    pub fn latest(&self) -> Option<&Arc<Snapshot>> {
        self.ring.back()
    }

    /// Highest per-pid connection count across the retained snapshots.
    pub fn peaks(&self) -> HashMap<pid_t, usize> {
        let mut peaks = HashMap::new();
        for snapshot in &self.ring {
            for (pid, n) in counts(snapshot) {
                let peak = peaks.entry(pid).or_insert(0);
                *peak = n.max(*peak);
            }
        }
        peaks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Snapshot>> {
        self.ring.iter()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(SNAPSHOTS)
    }
}

impl Trend {
    pub fn new(capacity: usize) -> Self {
        let points = VecDeque::with_capacity(capacity);
        Self { points, capacity: capacity.max(1) }
    }

    pub fn push(&mut self, total: usize) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(total);
    }

    pub fn points(&self) -> Vec<usize> {
        self.points.iter().copied().collect()
    }
}

impl Default for Trend {
    fn default() -> Self {
        Self::new(TREND)
    }
}
