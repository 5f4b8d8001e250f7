//! Window types
//!
//! Window bounds are event-time milliseconds, start inclusive and end
//! exclusive.

use crate::record::{Record, RecordBatch};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time bounds of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Start time (inclusive)
    pub start: i64,
    /// End time (exclusive)
    pub end: i64,
}

impl Window {
    /// Create a new window
    pub fn new(start: i64, end: i64) -> Self {
        assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    pub fn size(&self) -> i64 {
        self.end - self.start
    }

    /// Check if a timestamp falls within this window
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Largest timestamp that still belongs to the window
    pub fn max_timestamp(&self) -> i64 {
        self.end - 1
    }

    /// Whether the window's end has been reached at `now`
    pub fn is_closeable(&self, now: i64) -> bool {
        self.end <= now
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            Utc.timestamp_millis_opt(self.start).single(),
            Utc.timestamp_millis_opt(self.end).single(),
        ) {
            (Some(start), Some(end)) => write!(
                f,
                "[{} - {})",
                start.format("%Y-%m-%d %H:%M:%S%.3f"),
                end.format("%Y-%m-%d %H:%M:%S%.3f")
            ),
            _ => write!(f, "[{} - {})", self.start, self.end),
        }
    }
}

impl PartialOrd for Window {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Window {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

/// Records collected for one closed window, in arrival order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowBatch<T> {
    pub window: Window,
    pub records: Vec<Record<T>>,
}

impl<T> WindowBatch<T> {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record<T>) {
        self.records.push(record);
    }
}

impl<T: Send + 'static> RecordBatch<T> for WindowBatch<T> {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn into_records(self) -> Vec<Record<T>> {
        self.records
    }
}
