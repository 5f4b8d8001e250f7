//! Stateless one-in, at-most-one-out operators
//!
//! Both operators run a single task that reads until the input closes. A
//! panicking (or, for map, failing) user function is reported on the error
//! channel and ends the task.

use super::{panic_message, recv_upstream, send_downstream, Operator, OperatorContext};
use crate::error::{FlowError, Result};
use crate::lifecycle::ComponentState;
use crate::record::Record;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::debug;

/// Error type user map functions may return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Drops records whose predicate is false
pub struct FilterOperator<T, F> {
    name: String,
    predicate: Option<F>,
    input: Option<mpsc::Receiver<Record<T>>>,
    output: Option<mpsc::Sender<Record<T>>>,
    state: ComponentState,
}

impl<T, F> FilterOperator<T, F>
where
    F: Fn(&OperatorContext, &T) -> bool + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        predicate: F,
        input: mpsc::Receiver<Record<T>>,
        output: mpsc::Sender<Record<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Some(predicate),
            input: Some(input),
            output: Some(output),
            state: ComponentState::new(),
        }
    }
}

impl<T, F> Operator for FilterOperator<T, F>
where
    T: Send + 'static,
    F: Fn(&OperatorContext, &T) -> bool + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn setup(&mut self, ctx: &OperatorContext) -> Result<()> {
        let (Some(predicate), Some(input), Some(output)) =
            (self.predicate.take(), self.input.take(), self.output.take())
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
            run_filter(ctx, predicate, input, output).await;
        });
        Ok(())
    }
}

async fn run_filter<T, F>(
    ctx: OperatorContext,
    predicate: F,
    mut input: mpsc::Receiver<Record<T>>,
    output: mpsc::Sender<Record<T>>,
) where
    F: Fn(&OperatorContext, &T) -> bool,
{
    while let Some(record) = recv_upstream(&ctx, &mut input).await {
        let keep = match catch_unwind(AssertUnwindSafe(|| predicate(&ctx, record.data()))) {
            Ok(keep) => keep,
            Err(panic) => {
                ctx.report(FlowError::UserFunction {
                    operator: ctx.operator().to_string(),
                    reason: panic_message(panic),
                });
                break;
            }
        };

        if !keep {
            ctx.stats().inc_records_dropped();
            continue;
        }
        if !send_downstream(&ctx, &output, record).await {
            break;
        }
    }
    debug!(operator = %ctx.operator(), "filter stopped");
}

/// Transforms every record's payload, keeping its timestamp
pub struct MapOperator<T, U, F> {
    name: String,
    func: Option<F>,
    input: Option<mpsc::Receiver<Record<T>>>,
    output: Option<mpsc::Sender<Record<U>>>,
    state: ComponentState,
}

impl<T, U, F> MapOperator<T, U, F>
where
    F: Fn(&OperatorContext, T) -> std::result::Result<U, BoxError> + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        func: F,
        input: mpsc::Receiver<Record<T>>,
        output: mpsc::Sender<Record<U>>,
    ) -> Self {
        Self {
            name: name.into(),
            func: Some(func),
            input: Some(input),
            output: Some(output),
            state: ComponentState::new(),
        }
    }
}

impl<T, U, F> Operator for MapOperator<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(&OperatorContext, T) -> std::result::Result<U, BoxError> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn setup(&mut self, ctx: &OperatorContext) -> Result<()> {
        let (Some(func), Some(input), Some(output)) =
            (self.func.take(), self.input.take(), self.output.take())
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
            run_map(ctx, func, input, output).await;
        });
        Ok(())
    }
}

async fn run_map<T, U, F>(
    ctx: OperatorContext,
    func: F,
    mut input: mpsc::Receiver<Record<T>>,
    output: mpsc::Sender<Record<U>>,
) where
    F: Fn(&OperatorContext, T) -> std::result::Result<U, BoxError>,
{
    while let Some(record) = recv_upstream(&ctx, &mut input).await {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            record.try_map(|data| func(&ctx, data))
        }));
        let reason = match outcome {
            Ok(Ok(mapped)) => {
                if send_downstream(&ctx, &output, mapped).await {
                    continue;
                }
                break;
            }
            Ok(Err(err)) => err.to_string(),
            Err(panic) => panic_message(panic),
        };

        ctx.report(FlowError::UserFunction {
            operator: ctx.operator().to_string(),
            reason,
        });
        break;
    }
    debug!(operator = %ctx.operator(), "map stopped");
}
