//! In-process dataflow engine
//!
//! Records flow through a chain of operators connected by bounded channels:
//!
//! ```text
//! Source -> Filter -> Map -> Window -> TopN -> Sink
//! ```
//!
//! Every operator runs its own task. A slow consumer blocks its producer, so
//! memory stays bounded without explicit flow control. Faults raised while
//! running are delivered on one error channel returned by
//! [`Pipeline::open`]; [`Pipeline::close`] cancels every task and waits for
//! all of them to exit.

pub mod config;
pub mod error;
pub mod flow;
pub mod lifecycle;
pub mod operator;
pub mod record;
pub mod stats;
pub mod telemetry;
pub mod topn;
pub mod window;

// Re-export commonly used types
pub use config::FlowConfig;
pub use error::{FlowError, Result, WindowError, WindowResult};
pub use flow::{Flow, Pipeline};
pub use lifecycle::{ComponentState, TaskGuard};
pub use operator::{
    ChannelSource, CollectSink, Operator, OperatorContext, Sink, SinkHandle, SliceSource, Source,
};
pub use record::{Record, RecordBatch};
pub use stats::{FlowStats, OperatorStats, OperatorStatsSnapshot};
pub use telemetry::init_tracing;
pub use topn::{Order, TopNOptions, TopNResult, Tuple};
pub use window::{TumblingTimeWindows, Window, WindowAssigner, WindowBatch};
