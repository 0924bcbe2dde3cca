//! Cooperative cancellation for analysis runs.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{DigestError, DigestResult};

/// Shared cancel flag. Clones observe the same signal.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Fail fast between stages.
    pub fn check(&self) -> DigestResult<()> {
        if self.is_cancelled() {
            Err(DigestError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless cancellation arrives first, in which case `fut` is
    /// dropped and [`DigestError::Cancelled`] is returned.
    pub async fn guard<T, F>(&self, fut: F) -> DigestResult<T>
    where
        F: Future<Output = DigestResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(DigestError::Cancelled),
            out = fut => out,
        }
    }
}
