//! Append-only record of gene -> module snapshots.
//!
//! Snapshot 0 is the initial state and snapshot `s` the state after
//! step `s`. Only the most recent `capacity` snapshots are retained
//! unless the full trajectory is requested.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct AssignmentHistory {
    snapshots: VecDeque<Vec<usize>>,
    /// absolute index of `snapshots[0]`
    first_index: usize,
    /// `None` keeps everything
    capacity: Option<usize>,
}

impl AssignmentHistory {
    /// Keep only the latest `capacity` snapshots
    pub fn bounded(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity + 1),
            first_index: 0,
            capacity: Some(capacity.max(1)),
        }
    }

    /// Keep every snapshot
    pub fn unbounded() -> Self {
        Self {
            snapshots: VecDeque::new(),
            first_index: 0,
            capacity: None,
        }
    }

    pub fn push(&mut self, snapshot: Vec<usize>) {
        self.snapshots.push_back(snapshot);
        if let Some(cap) = self.capacity {
            while self.snapshots.len() > cap {
                self.snapshots.pop_front();
                self.first_index += 1;
            }
        }
    }

    /// Total number of snapshots ever pushed
    pub fn total_len(&self) -> usize {
        self.first_index + self.snapshots.len()
    }

    /// Number of snapshots currently retained
    pub fn retained_len(&self) -> usize {
        self.snapshots.len()
    }

    /// Absolute index of the oldest retained snapshot
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    /// Snapshot by absolute index, if still retained
    pub fn get(&self, index: usize) -> Option<&[usize]> {
        index
            .checked_sub(self.first_index)
            .and_then(|i| self.snapshots.get(i))
            .map(|x| x.as_slice())
    }

    /// Snapshots with absolute indices in `[start, end)`
    pub fn range(&self, start: usize, end: usize) -> anyhow::Result<Vec<&[usize]>> {
        (start..end)
            .map(|i| {
                self.get(i).ok_or_else(|| {
                    anyhow::anyhow!(
                        "snapshot {} is not retained (have {}..{})",
                        i,
                        self.first_index,
                        self.total_len()
                    )
                })
            })
            .collect()
    }

    /// The latest `n` snapshots (fewer if not that many are retained),
    /// oldest first
    pub fn latest(&self, n: usize) -> Vec<&[usize]> {
        let skip = self.snapshots.len().saturating_sub(n);
        self.snapshots.iter().skip(skip).map(|x| x.as_slice()).collect()
    }

    /// All retained snapshots, oldest first
    pub fn into_snapshots(self) -> Vec<Vec<usize>> {
        self.snapshots.into()
    }
}
