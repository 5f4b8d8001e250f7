//! Window operator
//!
//! Buckets incoming records by event time and emits each bucket as one
//! [`WindowBatch`] once processing time has passed the bucket's end. A
//! periodic tick drives the closing check; buckets are emitted in start
//! order and dropped from memory as soon as they are emitted.

use super::assigner::WindowAssigner;
use super::types::{Window, WindowBatch};
use crate::error::{FlowError, Result, WindowError};
use crate::lifecycle::ComponentState;
use crate::operator::{panic_message, send_downstream, Operator, OperatorContext};
use crate::record::Record;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Open buckets of one window operator, keyed by window start
#[derive(Debug)]
pub struct WindowBuckets<T> {
    open: BTreeMap<i64, WindowBatch<T>>,
    /// End of the most recently emitted window
    closed_until: Option<i64>,
}

impl<T> Default for WindowBuckets<T> {
    fn default() -> Self {
        Self {
            open: BTreeMap::new(),
            closed_until: None,
        }
    }
}

impl<T> WindowBuckets<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record to its window's bucket
    ///
    /// Returns the record back when its window starts before the end of an
    /// already emitted window.
    pub fn insert(&mut self, window: Window, record: Record<T>) -> std::result::Result<(), Record<T>> {
        if matches!(self.closed_until, Some(closed) if window.start < closed) {
            return Err(record);
        }
        self.open
            .entry(window.start)
            .or_insert_with(|| WindowBatch::new(window))
            .push(record);
        Ok(())
    }

    /// Remove and return every bucket whose end is at or before `now`,
    /// lowest start first
    pub fn drain_closeable(&mut self, now: i64) -> Vec<WindowBatch<T>> {
        let mut closed = Vec::new();
        while let Some(entry) = self.open.first_entry() {
            if !entry.get().window.is_closeable(now) {
                break;
            }
            let batch = entry.remove();
            self.closed_until = Some(batch.window.end);
            closed.push(batch);
        }
        closed
    }

    /// Number of buckets not yet emitted
    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

/// Operator applying a [`WindowAssigner`] to a record stream
pub struct WindowOperator<T, A> {
    name: String,
    assigner: Option<A>,
    input: Option<mpsc::Receiver<Record<T>>>,
    output: Option<mpsc::Sender<Record<WindowBatch<T>>>>,
    state: ComponentState,
}

impl<T, A: WindowAssigner> WindowOperator<T, A> {
    pub fn new(
        name: impl Into<String>,
        assigner: A,
        input: mpsc::Receiver<Record<T>>,
        output: mpsc::Sender<Record<WindowBatch<T>>>,
    ) -> Self {
        Self {
            name: name.into(),
            assigner: Some(assigner),
            input: Some(input),
            output: Some(output),
            state: ComponentState::new(),
        }
    }
}

impl<T, A> Operator for WindowOperator<T, A>
where
    T: Send + 'static,
    A: WindowAssigner,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn setup(&mut self, ctx: &OperatorContext) -> Result<()> {
        let (Some(assigner), Some(input), Some(output)) =
            (self.assigner.take(), self.input.take(), self.output.take())
        else {
            return Err(FlowError::Lifecycle(format!(
                "operator '{}' already started",
                self.name
            )));
        };
        let guard = self.state.enter();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let _guard = guard;
            run_window(ctx, assigner, input, output).await;
        });
        Ok(())
    }
}

fn processing_time() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn run_window<T, A: WindowAssigner>(
    ctx: OperatorContext,
    assigner: A,
    mut input: mpsc::Receiver<Record<T>>,
    output: mpsc::Sender<Record<WindowBatch<T>>>,
) {
    let tick = assigner.tick().unwrap_or_else(|| ctx.config().window_tick());
    let mut ticker = time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut buckets = WindowBuckets::new();
    let mut input_open = true;

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => break,
            _ = ticker.tick() => {
                if !emit_closeable(&ctx, &mut buckets, &output).await {
                    break;
                }
                if !input_open && buckets.is_empty() {
                    break;
                }
            }
            item = input.recv(), if input_open => match item {
                Some(record) => {
                    ctx.stats().inc_records_in();
                    let Some(timestamp) = record.timestamp() else {
                        ctx.report(
                            WindowError::MissingTimestamp {
                                operator: ctx.operator().to_string(),
                            }
                            .into(),
                        );
                        break;
                    };
                    let window = match catch_unwind(AssertUnwindSafe(|| {
                        assigner.assign_window(timestamp)
                    })) {
                        Ok(Ok(window)) => window,
                        Ok(Err(err)) => {
                            ctx.report(err.into());
                            break;
                        }
                        Err(panic) => {
                            ctx.report(FlowError::UserFunction {
                                operator: ctx.operator().to_string(),
                                reason: panic_message(panic),
                            });
                            break;
                        }
                    };
                    if buckets.insert(window, record).is_err() {
                        ctx.stats().inc_records_dropped();
                        warn!(
                            operator = %ctx.operator(),
                            timestamp,
                            window = %window,
                            "Dropping record for an already emitted window"
                        );
                    }
                }
                None => {
                    input_open = false;
                    if buckets.is_empty() {
                        break;
                    }
                    debug!(
                        operator = %ctx.operator(),
                        open_windows = buckets.len(),
                        "Input closed, waiting for open windows to close"
                    );
                }
            },
        }
    }
    debug!(operator = %ctx.operator(), "window stopped");
}

async fn emit_closeable<T>(
    ctx: &OperatorContext,
    buckets: &mut WindowBuckets<T>,
    output: &mpsc::Sender<Record<WindowBatch<T>>>,
) -> bool {
    for batch in buckets.drain_closeable(processing_time()) {
        let window = batch.window;
        debug!(
            operator = %ctx.operator(),
            window = %window,
            records = batch.records.len(),
            "Window closed"
        );
        if !send_downstream(ctx, output, Record::new(batch, window.max_timestamp())).await {
            return false;
        }
    }
    true
}
