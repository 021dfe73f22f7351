//! Batch-wide cancellation signal.
//!
//! One `CancelSignal` is cloned into every task. Stages check it at their
//! boundaries and race it against external calls, so a Ctrl+C or a rejected
//! credential stops in-flight work instead of waiting for the whole batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::error::{Result, VidscribeError};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Only the first reason is kept.
    pub fn cancel<S: Into<String>>(&self, reason: S) {
        {
            let mut slot = self.inner.reason.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner
            .reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn error(&self) -> VidscribeError {
        VidscribeError::Cancelled(self.reason().unwrap_or_else(|| "batch cancelled".to_string()))
    }

    /// Stage-boundary check.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(self.error());
        }
        Ok(())
    }

    /// Resolves once the signal has been tripped.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
