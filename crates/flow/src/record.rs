//! Stream records
//!
//! A [`Record`] is the unit handed from one operator to the next. Records
//! upstream of a windowing stage may omit the event timestamp; once a record
//! enters a window operator it must carry one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One unit of streamed data with an optional event timestamp in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record<T> {
    data: T,
    timestamp: Option<i64>,
}

impl<T> Record<T> {
    /// Create a timestamped record
    pub fn new(data: T, timestamp: i64) -> Self {
        Self {
            data,
            timestamp: Some(timestamp),
        }
    }

    /// Create a record without an event timestamp
    pub fn without_ts(data: T) -> Self {
        Self {
            data,
            timestamp: None,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }

    /// Transform the payload, keeping the timestamp untouched
    pub fn map<U, F>(self, f: F) -> Record<U>
    where
        F: FnOnce(T) -> U,
    {
        Record {
            data: f(self.data),
            timestamp: self.timestamp,
        }
    }

    /// Fallible [`Record::map`]
    pub fn try_map<U, E, F>(self, f: F) -> Result<Record<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(Record {
            data: f(self.data)?,
            timestamp: self.timestamp,
        })
    }

    /// Replace the payload, keeping the timestamp untouched
    pub fn with_data<U>(&self, data: U) -> Record<U> {
        Record {
            data,
            timestamp: self.timestamp,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(f, "Record {{ ts: {}, data: {} }}", ts, self.data),
            None => write!(f, "Record {{ data: {} }}", self.data),
        }
    }
}

/// A batch of records that can be flattened for ranking
///
/// Implemented for window batches, plain vectors, and maps produced by an
/// upstream grouping stage.
pub trait RecordBatch<T>: Send + 'static {
    /// Number of records in the batch
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the batch, yielding its records
    fn into_records(self) -> Vec<Record<T>>;
}

impl<T: Send + 'static> RecordBatch<T> for Vec<Record<T>> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn into_records(self) -> Vec<Record<T>> {
        self
    }
}

impl<K, T> RecordBatch<T> for HashMap<K, Vec<Record<T>>>
where
    K: Send + 'static,
    T: Send + 'static,
{
    fn len(&self) -> usize {
        self.values().map(Vec::len).sum()
    }

    fn into_records(self) -> Vec<Record<T>> {
        self.into_values().flatten().collect()
    }
}
