//! Cooperative cancellation for in-flight fetches.
//!
//! A [`CancellableTask`] wraps a future that receives a [`CancelToken`]. Cancelling
//! through a [`CancelHandle`] resolves the task to `Err(Cancelled)` immediately; the
//! executor itself is expected to check the token before committing anything.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new_pair() -> (CancelHandle, CancelToken) {
        let token = CancelToken::default();
        let handle = CancelHandle {
            state: token.state.clone(),
        };
        (handle, token)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }

    /// Resolves once the paired handle cancels.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl CancelHandle {
    /// Idempotent; cancelling a settled task changes nothing.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

pub struct CancellableTask<F> {
    handle: CancelHandle,
    token: CancelToken,
    future: F,
}

/// Builds a task around `executor`, handing it the token it must honour.
pub fn cancellable<T, F, Fut>(executor: F) -> CancellableTask<Fut>
where
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = T>,
{
    let (handle, token) = CancelToken::new_pair();
    let future = executor(token.clone());
    CancellableTask { handle, token, future }
}

impl<F, T> CancellableTask<F>
where
    F: Future<Output = T>,
{
    pub fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub async fn join(self) -> Result<T, Cancelled> {
        let CancellableTask { token, future, .. } = self;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }
}

/// Holds the single live handle of one operation class.
#[derive(Debug)]
pub struct TaskSlot {
    name: &'static str,
    current: Mutex<Option<CancelHandle>>,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: Mutex::new(None),
        }
    }

    /// Installs the handle of an already-built task, cancelling the previous one.
    pub fn install(&self, handle: CancelHandle) {
        if let Some(previous) = self.lock().replace(handle) {
            if !previous.is_cancelled() {
                debug!(slot = self.name, "superseding in-flight operation");
            }
            previous.cancel();
        }
    }

    /// Cancels the current task. Returns `true` if it had not been cancelled yet.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(current) => {
                let live = !current.is_cancelled();
                current.cancel();
                live
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancelHandle>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
