//! Window assigners
//!
//! An assigner maps an event timestamp to the window it belongs to.

use super::types::Window;
use crate::error::{WindowError, WindowResult};
use std::fmt;
use std::time::Duration;

/// Trait for assigning timestamps to windows
pub trait WindowAssigner: Send + Sync + fmt::Debug + 'static {
    /// Assign a timestamp to its window
    ///
    /// Fails when the window's bounds cannot be represented.
    fn assign_window(&self, timestamp: i64) -> WindowResult<Window>;

    /// Interval at which open windows are checked for closing, if the
    /// assigner overrides the pipeline default
    fn tick(&self) -> Option<Duration> {
        None
    }
}

/// Tumbling time windows
///
/// Creates fixed-size, non-overlapping windows. Each event is assigned to
/// exactly one window, `start = floor(ts / size) * size`.
///
/// # Example
/// ```text
/// Window size: 15 seconds
/// Event at timestamp 7_000  -> Window [0, 15_000)
/// Event at timestamp 61_000 -> Window [60_000, 75_000)
/// ```
#[derive(Debug, Clone)]
pub struct TumblingTimeWindows {
    size_ms: i64,
    tick: Option<Duration>,
}

impl TumblingTimeWindows {
    /// Create tumbling windows; `advance` must equal `size`
    pub fn new(size: Duration, advance: Duration) -> WindowResult<Self> {
        let size_ms = match i64::try_from(size.as_millis()) {
            Ok(ms) if ms > 0 => ms,
            _ => return Err(WindowError::InvalidWindowSize { size }),
        };
        let advance_ms = i64::try_from(advance.as_millis()).ok();
        if advance_ms != Some(size_ms) {
            return Err(WindowError::UnsupportedAdvance {
                size_ms,
                advance_ms: advance_ms.unwrap_or(i64::MAX),
            });
        }

        Ok(Self {
            size_ms,
            tick: None,
        })
    }

    /// Override how often open windows are checked for closing
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = Some(tick);
        self
    }

    pub fn size_ms(&self) -> i64 {
        self.size_ms
    }

    /// Calculate the window bounds for a given timestamp, if they fit in `i64`
    fn window_bounds(&self, timestamp: i64) -> Option<(i64, i64)> {
        let start = timestamp.div_euclid(self.size_ms).checked_mul(self.size_ms)?;
        let end = start.checked_add(self.size_ms)?;
        Some((start, end))
    }
}

impl WindowAssigner for TumblingTimeWindows {
    fn assign_window(&self, timestamp: i64) -> WindowResult<Window> {
        let (start, end) =
            self.window_bounds(timestamp)
                .ok_or(WindowError::TimestampOutOfRange {
                    timestamp,
                    size_ms: self.size_ms,
                })?;
        Ok(Window::new(start, end))
    }

    fn tick(&self) -> Option<Duration> {
        self.tick
    }
}
