//! Windowing
//!
//! ## Tumbling Windows
//! Fixed-size, non-overlapping windows keyed by event time. Each record
//! belongs to exactly one window.
//!
//! ```text
//! Time:     0----5----10---15---20---25---30
//! Windows:  [----][----][----][----][----]
//! ```
//!
//! A window's records are held until processing time passes the window's
//! end, then emitted downstream as one [`WindowBatch`] and forgotten.
//! Memory is therefore bounded by how many windows are open at once, which
//! depends on the event-time skew of the input.
//!
//! # Example Usage
//!
//! ```rust
//! use flow::window::TumblingTimeWindows;
//! use std::time::Duration;
//!
//! let windows = TumblingTimeWindows::new(Duration::from_secs(15), Duration::from_secs(15))
//!     .expect("tumbling windows")
//!     .with_tick(Duration::from_millis(100));
//! ```

pub mod assigner;
pub mod operator;
pub mod types;

pub use assigner::{TumblingTimeWindows, WindowAssigner};
pub use operator::{WindowBuckets, WindowOperator};
pub use types::{Window, WindowBatch};
