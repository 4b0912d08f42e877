//! Bounded probe history
//!
//! Each service keeps the last N probe outcomes for display and graphing.
//! The window is *not* the source of the uptime statistic: uptime is taken
//! from the lifetime counters on the service record so it does not forget
//! outcomes once they scroll out of the window.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// One probe outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub reachable: bool,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: u64,
}

/// FIFO ring buffer of probe outcomes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append at the tail, evicting from the head once over capacity
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Change the capacity, dropping the oldest entries if it shrinks
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Mean latency over the window, 0 when empty
    pub fn avg_latency_ms(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let total: u64 = self.entries.iter().map(|e| e.latency_ms).sum();
        total as f64 / self.entries.len() as f64
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

/// `successes / max(checks, 1)`
pub fn uptime_ratio(successes: u64, checks: u64) -> f64 {
    successes as f64 / checks.max(1) as f64
}

/// Derived statistics for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    /// Lifetime uptime in `[0, 1]`
    pub uptime_ratio: f64,
    pub uptime_percentage: f64,
    /// Mean latency over the bounded window
    pub avg_latency_ms: f64,
    /// The bounded window, oldest first
    pub entries: Vec<HistoryEntry>,
}

impl Aggregate {
    pub fn compute(successes: u64, checks: u64, history: &History) -> Self {
        let ratio = uptime_ratio(successes, checks);
        Self {
            uptime_ratio: ratio,
            uptime_percentage: ratio * 100.0,
            avg_latency_ms: history.avg_latency_ms(),
            entries: history.to_vec(),
        }
    }
}
