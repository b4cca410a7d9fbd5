//! Shared cancellation signal for background workers.
//!
//! A [`CancelSource`] owns the signal; any number of [`CancelToken`]s observe
//! it.  Tokens can be polled synchronously ([`CancelToken::is_cancelled`]) or
//! awaited ([`CancelToken::cancelled`]) inside a `tokio::select!` so that a
//! pending accept or read is abandoned as soon as cancellation fires.
//!
//! Dropping the source counts as cancellation.

use tokio::sync::watch;

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Create a token observing this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal cancellation to every token.  Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal.  Clone freely.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// `true` once the source has cancelled or been dropped.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the source has cancelled or been dropped.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means the source is gone, which is treated as cancellation.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
