//! Built-in sinks

use super::{recv_upstream, Operator, OperatorContext, Sink};
use crate::error::Result;
use crate::lifecycle::ComponentState;
use crate::record::Record;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Accumulates every received record in arrival order
///
/// Meant for tests and demos; keep a [`SinkHandle`] before handing the sink
/// to the pipeline to inspect what arrived.
pub struct CollectSink<T> {
    name: String,
    intake: mpsc::Sender<Record<T>>,
    pending: Option<mpsc::Receiver<Record<T>>>,
    collected: Arc<RwLock<Vec<Record<T>>>>,
    state: ComponentState,
}

impl<T> CollectSink<T> {
    pub fn new() -> Self {
        let (intake, pending) = mpsc::channel(1);
        Self {
            name: "collect-sink".to_string(),
            intake,
            pending: Some(pending),
            collected: Arc::new(RwLock::new(Vec::new())),
            state: ComponentState::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Read access to the accumulated records
    pub fn handle(&self) -> SinkHandle<T> {
        SinkHandle {
            collected: Arc::clone(&self.collected),
        }
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Operator for CollectSink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn setup(&mut self, ctx: &OperatorContext) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            // Already consuming.
            return Ok(());
        };
        let collected = Arc::clone(&self.collected);
        let guard = self.state.enter();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let _guard = guard;
            collect(ctx, pending, collected).await;
        });
        Ok(())
    }
}

impl<T: Send + Sync + 'static> Sink<T> for CollectSink<T> {
    fn input(&self) -> mpsc::Sender<Record<T>> {
        self.intake.clone()
    }
}

async fn collect<T>(
    ctx: OperatorContext,
    mut pending: mpsc::Receiver<Record<T>>,
    collected: Arc<RwLock<Vec<Record<T>>>>,
) {
    while let Some(record) = recv_upstream(&ctx, &mut pending).await {
        collected.write().push(record);
    }
    debug!(operator = %ctx.operator(), "collect sink stopped");
}

/// Shared view of a [`CollectSink`]'s records
pub struct SinkHandle<T> {
    collected: Arc<RwLock<Vec<Record<T>>>>,
}

impl<T> Clone for SinkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            collected: Arc::clone(&self.collected),
        }
    }
}

impl<T: Clone> SinkHandle<T> {
    /// Copy of everything received so far
    pub fn value(&self) -> Vec<Record<T>> {
        self.collected.read().clone()
    }
}

impl<T> SinkHandle<T> {
    pub fn len(&self) -> usize {
        self.collected.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.read().is_empty()
    }
}
