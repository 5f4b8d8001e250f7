//! Operators and the plumbing they share
//!
//! Every stage of a pipeline implements [`Operator`]: `setup` spawns the
//! stage's tasks and returns straight away, `teardown` waits until those
//! tasks have exited. Sources additionally implement [`Source`] and sinks
//! implement [`Sink`]; the intermediate stages (filter, map, window, top-N)
//! are created by the [`Flow`](crate::flow::Flow) builder.

pub mod sink;
pub mod source;
pub mod unary;

pub use sink::{CollectSink, SinkHandle};
pub use source::{ChannelSource, SliceSource};
pub use unary::{FilterOperator, MapOperator};

use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::lifecycle::ComponentState;
use crate::record::Record;
use crate::stats::OperatorStats;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error};

/// Context handed to an operator at setup and to every user function
#[derive(Debug, Clone)]
pub struct OperatorContext {
    flow: Arc<str>,
    operator: Arc<str>,
    config: Arc<FlowConfig>,
    cancel: CancellationToken,
    errors: mpsc::Sender<FlowError>,
    stats: Arc<OperatorStats>,
}

impl OperatorContext {
    pub(crate) fn new(
        flow: Arc<str>,
        config: Arc<FlowConfig>,
        cancel: CancellationToken,
        errors: mpsc::Sender<FlowError>,
    ) -> Self {
        Self {
            flow,
            operator: Arc::from(""),
            config,
            cancel,
            errors,
            stats: Arc::new(OperatorStats::new()),
        }
    }

    /// Derive the context for one operator, with its own counters
    pub(crate) fn for_operator(&self, operator: &str, stats: Arc<OperatorStats>) -> Self {
        Self {
            operator: Arc::from(operator),
            stats,
            ..self.clone()
        }
    }

    /// Name of the pipeline this operator belongs to
    pub fn flow(&self) -> &str {
        &self.flow
    }

    /// Name of the operator this context was created for
    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn stats(&self) -> &OperatorStats {
        &self.stats
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Future that resolves when the pipeline is closed
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Report a fault on the shared error channel without blocking
    ///
    /// When the channel is full the error is dropped; the earlier ones are
    /// already waiting for the caller.
    pub fn report(&self, err: FlowError) {
        self.stats.inc_errors();
        error!(
            flow = %self.flow,
            operator = %self.operator,
            error = %err,
            "Operator fault"
        );
        if let Err(e) = self.errors.try_send(err) {
            debug!(error = %e, "error channel full or closed, error dropped");
        }
    }
}

/// Lifecycle shared by every pipeline stage
#[async_trait]
pub trait Operator: Send {
    /// Operator name, used in logs, errors and statistics
    fn name(&self) -> &str;

    /// Lifecycle tracker of the tasks this operator spawns
    fn state(&self) -> &ComponentState;

    /// Start consuming asynchronously
    ///
    /// Must not block: spawn the operator's tasks and return.
    fn setup(&mut self, ctx: &OperatorContext) -> Result<()>;

    /// Wait until every task spawned by `setup` has exited
    async fn teardown(&mut self) -> Result<()> {
        self.state().wait().await;
        Ok(())
    }
}

/// Head of a pipeline
pub trait Source<T>: Operator {
    /// Attach the channel the source writes into
    fn connect(&mut self, downstream: mpsc::Sender<Record<T>>);
}

/// Tail of a pipeline
pub trait Sink<T>: Operator {
    /// Write-only intake of the sink
    fn input(&self) -> mpsc::Sender<Record<T>>;
}

/// Receive the next upstream record, or `None` on closure or cancellation
pub(crate) async fn recv_upstream<T>(
    ctx: &OperatorContext,
    input: &mut mpsc::Receiver<Record<T>>,
) -> Option<Record<T>> {
    let received = tokio::select! {
        biased;
        _ = ctx.cancelled() => None,
        item = input.recv() => item,
    };
    if received.is_some() {
        ctx.stats().inc_records_in();
    }
    received
}

/// Hand a record to the next stage
///
/// Returns `false` when the pipeline is cancelled or the consumer is gone,
/// in which case the caller should stop.
pub(crate) async fn send_downstream<T>(
    ctx: &OperatorContext,
    output: &mpsc::Sender<Record<T>>,
    record: Record<T>,
) -> bool {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => false,
        sent = output.send(record) => match sent {
            Ok(()) => {
                ctx.stats().inc_records_out();
                true
            }
            Err(_) => {
                debug!(operator = %ctx.operator(), "downstream closed");
                false
            }
        },
    }
}

/// Render a caught panic payload as text
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;

    #[tokio::test]
    async fn test_report_keeps_first_error_when_full() {
        let config = FlowConfig {
            error_channel_capacity: 1,
            ..Default::default()
        };
        let (ctx, mut errors, _cancel) = context(config);

        ctx.report(FlowError::Unexpected("first".into()));
        ctx.report(FlowError::Unexpected("second".into()));

        let first = errors.try_recv().expect("first error delivered");
        assert!(first.to_string().contains("first"));
        assert!(errors.try_recv().is_err());
        assert_eq!(ctx.stats().snapshot("op").errors, 2);
    }

    #[tokio::test]
    async fn test_send_downstream_stops_on_cancel() {
        let (ctx, _errors, cancel) = context(FlowConfig::default());
        let (tx, _rx) = mpsc::channel(1);

        assert!(send_downstream(&ctx, &tx, Record::without_ts(1)).await);
        cancel.cancel();
        // Channel is full, only cancellation can unblock the send.
        assert!(!send_downstream(&ctx, &tx, Record::without_ts(2)).await);
    }

    #[tokio::test]
    async fn test_recv_upstream_none_on_close() {
        let (ctx, _errors, _cancel) = context(FlowConfig::default());
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(Record::without_ts(1)).await.unwrap();
        drop(tx);

        assert_eq!(recv_upstream(&ctx, &mut rx).await, Some(Record::without_ts(1)));
        assert_eq!(recv_upstream(&ctx, &mut rx).await, None);
        assert_eq!(ctx.stats().snapshot("op").records_in, 1);
    }

    #[test]
    fn test_panic_message() {
        let caught = std::panic::catch_unwind(|| {
            panic!("static message");
        }).unwrap_err();
        assert_eq!(panic_message(caught), "static message");

        let caught = std::panic::catch_unwind(|| {
            panic!("formatted {}", 7);
        }).unwrap_err();
        assert_eq!(panic_message(caught), "formatted 7");
    }
}
