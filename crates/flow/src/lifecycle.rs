//! Per-operator lifecycle tracking
//!
//! [`ComponentState`] counts the tasks an operator has spawned. A task takes
//! a [`TaskGuard`] *before* it is spawned and releases it when it exits, so
//! `teardown` can await [`ComponentState::wait`] and know every task is gone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    active: AtomicUsize,
    drained: Notify,
}

/// Outstanding-task counter with a wait-for-zero operation
#[derive(Debug, Clone, Default)]
pub struct ComponentState {
    inner: Arc<Inner>,
}

impl ComponentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one running task; the returned guard unregisters it on drop
    pub fn enter(&self) -> TaskGuard {
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        TaskGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of tasks currently registered
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Resolve once no task is registered
    pub async fn wait(&self) {
        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            // Register interest before checking, or a release between the
            // load and the await would be missed.
            drained.as_mut().enable();

            if self.active() == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// RAII registration of one task in a [`ComponentState`]
#[derive(Debug)]
pub struct TaskGuard {
    inner: Arc<Inner>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
