// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Execution context: cooperative cancellation and deadlines.
//!
//! A `Context` is a cheap clonable handle. Cancelling any clone cancels
//! them all; the engine polls `ensure_active` before every node it
//! evaluates, and suspended waits race against `done`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};

use crate::error::RuntimeError;

#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<CtxInner>,
}

#[derive(Debug, Default)]
struct CtxInner {
    cancelled: AtomicBool,
    notify: Notify,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that only ends when explicitly cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that exceeds its deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(CtxInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                deadline: Some(deadline),
            }),
        }
    }

    /// Cancel this context and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Err if the context has been cancelled or its deadline has passed.
    pub fn ensure_active(&self) -> Result<(), RuntimeError> {
        if self.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        if let Some(deadline) = self.inner.deadline {
            if Instant::now() >= deadline {
                return Err(RuntimeError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Resolves once the context ends, with the error that ended it.
    /// The notified future is armed before the flag check so a cancel
    /// landing between the two is never missed.
    pub async fn done(&self) -> RuntimeError {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return RuntimeError::Cancelled;
            }
            match self.inner.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = time::sleep_until(deadline) => return RuntimeError::DeadlineExceeded,
                    }
                }
                None => notified.await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_context_is_active() {
        let ctx = Context::new();
        assert!(ctx.ensure_active().is_ok());
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_reaches_all_clones() {
        let ctx = Context::new();
        let clone = ctx.clone();
        clone.cancel();

        assert!(matches!(
            ctx.ensure_active(),
            Err(RuntimeError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = Context::with_timeout(Duration::from_millis(10));
        assert!(ctx.ensure_active().is_ok());

        time::advance(Duration::from_millis(20)).await;
        assert!(matches!(
            ctx.ensure_active(),
            Err(RuntimeError::DeadlineExceeded)
        ));
        assert!(matches!(ctx.done().await, RuntimeError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_done_resolves_on_cancel() {
        let ctx = Context::new();
        let watcher = ctx.clone();
        let handle = tokio::spawn(async move { watcher.done().await });

        tokio::task::yield_now().await;
        ctx.cancel();

        let err = time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("done() should resolve after cancel")
            .expect("task panicked");
        assert!(matches!(err, RuntimeError::Cancelled));
    }
}
