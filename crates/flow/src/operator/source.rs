//! Built-in sources

use super::{send_downstream, Operator, OperatorContext, Source};
use crate::error::{FlowError, Result};
use crate::lifecycle::ComponentState;
use crate::record::Record;
use tokio::sync::mpsc;
use tracing::debug;

/// Emits a fixed list of records, then closes its output
///
/// # Example
///
/// ```rust
/// use flow::operator::SliceSource;
/// use flow::Record;
///
/// let plain = SliceSource::new(vec![1, 2, 3]);
/// let timed = SliceSource::from_records(vec![Record::new("a", 1_000)]);
/// ```
pub struct SliceSource<T> {
    name: String,
    records: Vec<Record<T>>,
    downstream: Option<mpsc::Sender<Record<T>>>,
    state: ComponentState,
}

impl<T> SliceSource<T> {
    /// Source of timestamp-less records
    pub fn new(items: Vec<T>) -> Self {
        Self::from_records(items.into_iter().map(Record::without_ts).collect())
    }

    /// Source of prepared (typically timestamped) records
    pub fn from_records(records: Vec<Record<T>>) -> Self {
        Self {
            name: "slice-source".to_string(),
            records,
            downstream: None,
            state: ComponentState::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<T: Send + 'static> Operator for SliceSource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn setup(&mut self, ctx: &OperatorContext) -> Result<()> {
        let downstream = self.downstream.take().ok_or_else(|| {
            FlowError::Lifecycle(format!("source '{}' is not connected", self.name))
        })?;
        let records = std::mem::take(&mut self.records);
        let guard = self.state.enter();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let _guard = guard;
            emit_all(ctx, records, downstream).await;
        });
        Ok(())
    }
}

impl<T: Send + 'static> Source<T> for SliceSource<T> {
    fn connect(&mut self, downstream: mpsc::Sender<Record<T>>) {
        self.downstream = Some(downstream);
    }
}

async fn emit_all<T>(ctx: OperatorContext, records: Vec<Record<T>>, downstream: mpsc::Sender<Record<T>>) {
    for record in records {
        if !send_downstream(&ctx, &downstream, record).await {
            break;
        }
    }
    debug!(operator = %ctx.operator(), "slice source exhausted");
}

/// Forwards values pushed into an external channel
///
/// The source ends when every [`mpsc::Sender`] returned by
/// [`ChannelSource::new`] has been dropped.
pub struct ChannelSource<T> {
    name: String,
    upstream: Option<mpsc::Receiver<Record<T>>>,
    downstream: Option<mpsc::Sender<Record<T>>>,
    state: ComponentState,
}

impl<T> ChannelSource<T> {
    /// Create the source and the handle used to feed it
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<Record<T>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let source = Self {
            name: "channel-source".to_string(),
            upstream: Some(rx),
            downstream: None,
            state: ComponentState::new(),
        };
        (source, tx)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<T: Send + 'static> Operator for ChannelSource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn setup(&mut self, ctx: &OperatorContext) -> Result<()> {
        let name = self.name.clone();
        let not_ready =
            || FlowError::Lifecycle(format!("source '{}' already started or not connected", name));
        let downstream = self.downstream.take().ok_or_else(not_ready)?;
        let upstream = self.upstream.take().ok_or_else(not_ready)?;
        let guard = self.state.enter();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let _guard = guard;
            forward(ctx, upstream, downstream).await;
        });
        Ok(())
    }
}

impl<T: Send + 'static> Source<T> for ChannelSource<T> {
    fn connect(&mut self, downstream: mpsc::Sender<Record<T>>) {
        self.downstream = Some(downstream);
    }
}

async fn forward<T>(
    ctx: OperatorContext,
    mut upstream: mpsc::Receiver<Record<T>>,
    downstream: mpsc::Sender<Record<T>>,
) {
    while let Some(record) = super::recv_upstream(&ctx, &mut upstream).await {
        if !send_downstream(&ctx, &downstream, record).await {
            break;
        }
    }
    debug!(operator = %ctx.operator(), "channel source finished");
}
