//! Pipeline builder and lifecycle
//!
//! [`Flow`] chains operators with a fluent API; [`Flow::to`] fixes the sink
//! and yields a [`Pipeline`]. Nothing runs and no channel exists until
//! [`Pipeline::open`]: each stage only records how to wire itself to the
//! stage after it.
//!
//! # Example
//!
//! ```rust,no_run
//! use flow::operator::{CollectSink, SliceSource};
//! use flow::Flow;
//!
//! # async fn example() -> flow::Result<()> {
//! let sink = CollectSink::new();
//! let collected = sink.handle();
//!
//! let mut pipeline = Flow::new("evens", SliceSource::new((0..10).collect::<Vec<i32>>()))
//!     .filter(|_, v: &i32| v % 2 == 0)
//!     .map(|_, v: i32| v * 10)
//!     .to(sink);
//!
//! let mut errors = pipeline.open().await?;
//! // ... later
//! pipeline.close().await?;
//! assert!(errors.try_recv().is_err());
//! # let _ = collected;
//! # Ok(())
//! # }
//! ```

use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::operator::unary::BoxError;
use crate::operator::{FilterOperator, MapOperator, Operator, OperatorContext, Sink, Source};
use crate::record::{Record, RecordBatch};
use crate::stats::{FlowStats, OperatorStats};
use crate::topn::{TopNOperator, TopNOptions, TopNResult};
use crate::window::{WindowAssigner, WindowBatch, WindowOperator};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type Operators = Vec<Box<dyn Operator>>;

/// Wires the chain built so far to the channel its last stage writes into,
/// returning the operators from source to that stage
type Connect<T> = Box<dyn FnOnce(mpsc::Sender<Record<T>>) -> Operators + Send>;

/// A pipeline under construction whose tail emits `Record<T>`
pub struct Flow<T> {
    name: String,
    config: FlowConfig,
    stages: usize,
    connect: Connect<T>,
}

impl<T: Send + 'static> Flow<T> {
    /// Start a pipeline from a source, with default configuration
    pub fn new<S>(name: impl Into<String>, source: S) -> Self
    where
        S: Source<T> + 'static,
    {
        Self::with_config(name, source, FlowConfig::default())
    }

    pub fn with_config<S>(name: impl Into<String>, source: S, config: FlowConfig) -> Self
    where
        S: Source<T> + 'static,
    {
        let connect: Connect<T> = Box::new(move |output| {
            let mut source = source;
            source.connect(output);
            vec![Box::new(source) as Box<dyn Operator>]
        });
        Self {
            name: name.into(),
            config,
            stages: 0,
            connect,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a stage reading this flow's tail and writing `Record<U>`
    fn then<U, B>(mut self, kind: &str, build: B) -> Flow<U>
    where
        U: Send + 'static,
        B: FnOnce(String, mpsc::Receiver<Record<T>>, mpsc::Sender<Record<U>>) -> Box<dyn Operator>
            + Send
            + 'static,
    {
        self.stages += 1;
        let stage = format!("{}-{}", kind, self.stages);
        let capacity = self.config.channel_capacity;
        let upstream = self.connect;

        Flow {
            name: self.name,
            config: self.config,
            stages: self.stages,
            connect: Box::new(move |output| {
                let (tx, rx) = mpsc::channel(capacity);
                let mut operators = upstream(tx);
                operators.push(build(stage, rx, output));
                operators
            }),
        }
    }

    /// Keep only records whose payload satisfies `predicate`
    pub fn filter<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&OperatorContext, &T) -> bool + Send + 'static,
    {
        self.then("filter", move |name, input, output| {
            Box::new(FilterOperator::new(name, predicate, input, output))
        })
    }

    /// Transform every payload, keeping timestamps
    pub fn map<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(&OperatorContext, T) -> U + Send + 'static,
    {
        let func = move |ctx: &OperatorContext, data: T| Ok::<U, BoxError>(f(ctx, data));
        self.then("map", move |name, input, output| {
            Box::new(MapOperator::new(name, func, input, output))
        })
    }

    /// Transform every payload; an `Err` is reported like a panic and stops
    /// the stage
    pub fn try_map<U, E, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        E: Into<BoxError>,
        F: Fn(&OperatorContext, T) -> std::result::Result<U, E> + Send + 'static,
    {
        let func = move |ctx: &OperatorContext, data: T| f(ctx, data).map_err(Into::<BoxError>::into);
        self.then("map", move |name, input, output| {
            Box::new(MapOperator::new(name, func, input, output))
        })
    }

    /// Bucket records into windows, emitting one batch per closed window
    pub fn window<A>(self, assigner: A) -> Flow<WindowBatch<T>>
    where
        A: WindowAssigner,
    {
        self.then("window", move |name, input, output| {
            Box::new(WindowOperator::new(name, assigner, input, output))
        })
    }

    /// Rank each batch into at most `n` entries per group
    pub fn top_n<E>(self, n: usize, options: TopNOptions<E>) -> Flow<TopNResult<E>>
    where
        T: RecordBatch<E>,
        E: Send + 'static,
    {
        self.then("top-n", move |name, input, output| {
            Box::new(TopNOperator::new(name, n, options, input, output))
        })
    }

    /// Terminate the chain with a sink
    pub fn to<S>(self, sink: S) -> Pipeline
    where
        S: Sink<T> + 'static,
    {
        let connect = self.connect;
        let build: Build = Box::new(move || {
            let mut operators = connect(sink.input());
            operators.push(Box::new(sink));
            operators
        });

        Pipeline {
            name: self.name,
            config: self.config,
            cancel: CancellationToken::new(),
            stats: Vec::new(),
            stage: Stage::Ready(build),
        }
    }
}

type Build = Box<dyn FnOnce() -> Operators + Send>;

enum Stage {
    Ready(Build),
    Running(Operators),
    Closed,
}

/// A fully built pipeline, ready to be opened once
pub struct Pipeline {
    name: String,
    config: FlowConfig,
    cancel: CancellationToken,
    stats: Vec<(String, Arc<OperatorStats>)>,
    stage: Stage,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        matches!(self.stage, Stage::Running(_))
    }

    /// Wire the channels and start every operator, sink first
    ///
    /// Returns the receiving end of the error channel shared by all
    /// operators. It is closed once [`Pipeline::close`] returns.
    pub async fn open(&mut self) -> Result<mpsc::Receiver<FlowError>> {
        let build = match std::mem::replace(&mut self.stage, Stage::Closed) {
            Stage::Ready(build) => build,
            other => {
                self.stage = other;
                return Err(FlowError::Lifecycle(format!(
                    "pipeline '{}' was already opened",
                    self.name
                )));
            }
        };
        if let Err(err) = self.config.validate() {
            self.stage = Stage::Ready(build);
            return Err(err);
        }

        let mut operators = build();
        let (errors_tx, errors_rx) = mpsc::channel(self.config.error_channel_capacity);
        let base = OperatorContext::new(
            Arc::from(self.name.as_str()),
            Arc::new(self.config.clone()),
            self.cancel.clone(),
            errors_tx,
        );
        self.stats = operators
            .iter()
            .map(|op| (op.name().to_string(), Arc::new(OperatorStats::new())))
            .collect();

        let started = operators
            .iter_mut()
            .zip(&self.stats)
            .rev()
            .try_for_each(|(op, (name, stats))| op.setup(&base.for_operator(name, Arc::clone(stats))));
        drop(base);

        if let Err(err) = started {
            error!(flow = %self.name, error = %err, "Failed to open pipeline");
            self.cancel.cancel();
            for op in operators.iter_mut() {
                if let Err(e) = op.teardown().await {
                    warn!(flow = %self.name, operator = %op.name(), error = %e, "Teardown failed");
                }
            }
            return Err(err);
        }

        info!(
            flow = %self.name,
            operators = operators.len(),
            channel_capacity = self.config.channel_capacity,
            "Pipeline opened"
        );
        self.stage = Stage::Running(operators);
        Ok(errors_rx)
    }

    /// Cancel every operator and wait until all their tasks have exited
    ///
    /// Returns the first teardown error. Does nothing if the pipeline is not
    /// running.
    pub async fn close(&mut self) -> Result<()> {
        let mut operators = match std::mem::replace(&mut self.stage, Stage::Closed) {
            Stage::Running(operators) => operators,
            other => {
                self.stage = other;
                return Ok(());
            }
        };

        info!(flow = %self.name, "Closing pipeline");
        self.cancel.cancel();

        let mut first_error = None;
        for op in operators.iter_mut() {
            if let Err(err) = op.teardown().await {
                warn!(flow = %self.name, operator = %op.name(), error = %err, "Teardown failed");
                first_error.get_or_insert(err);
            }
        }

        info!(
            flow = %self.name,
            errors = self.stats().total_errors(),
            "Pipeline closed"
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Counters of every operator, source first
    pub fn stats(&self) -> FlowStats {
        FlowStats {
            flow: self.name.clone(),
            operators: self
                .stats
                .iter()
                .map(|(name, stats)| stats.snapshot(name))
                .collect(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(flow = %self.name, "Pipeline dropped without close, cancelling");
            self.cancel.cancel();
        }
    }
}
