//! Best-effort outbound notifier.
//!
//! Each notification is a single UTF-8 text line delivered over a fresh TCP
//! connection to a fixed address: connect, write the line, close.  Delivery
//! failures are logged and never reported to the caller.
//!
//! Notifications are queued on a bounded channel and delivered one at a time
//! by a single worker thread, so a burst of events can never spawn more than
//! one sender.  When the queue is full new notifications are dropped.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use sensorlink_types::LinkError;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::cancel::{CancelSource, CancelToken};

/// Configuration for [`Notifier`].
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// `host:port` of the receiving endpoint.
    pub address: String,
    /// Maximum number of undelivered notifications.
    pub queue_capacity: usize,
    /// Upper bound on connecting and writing one notification.
    pub timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            address: "192.168.3.64:5300".to_string(),
            queue_capacity: 32,
            timeout: Duration::from_millis(500),
        }
    }
}

/// Owner of the delivery worker.  Dropping it stops the worker after the
/// in-flight delivery (if any) and joins the thread.
#[derive(Debug)]
pub struct Notifier {
    tx: mpsc::Sender<String>,
    cancel: CancelSource,
    worker: Option<JoinHandle<()>>,
}

impl Notifier {
    /// Start the delivery worker.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Spawn`] if the worker thread cannot be created.
    pub fn spawn(config: NotifierConfig) -> Result<Self, LinkError> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let cancel = CancelSource::new();
        let token = cancel.token();
        let name = "notifier".to_string();

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(config, rx, token))
            .map_err(|source| LinkError::Spawn { name, source })?;

        Ok(Self {
            tx,
            cancel,
            worker: Some(worker),
        })
    }

    /// A cloneable handle for queueing notifications.
    pub fn handle(&self) -> NotifierHandle {
        NotifierHandle { tx: self.tx.clone() }
    }

    /// Stop the worker and wait for it to exit.  Queued notifications that
    /// have not started delivery are discarded.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("notifier thread panicked");
            }
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer handle for a [`Notifier`].
#[derive(Debug, Clone)]
pub struct NotifierHandle {
    tx: mpsc::Sender<String>,
}

impl NotifierHandle {
    /// Queue `line` for delivery.  Never blocks.
    ///
    /// Returns `false` when the notification was dropped because the queue
    /// is full or the notifier has shut down.
    pub fn notify(&self, line: impl Into<String>) -> bool {
        match self.tx.try_send(line.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("notifier queue full; dropping notification");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("notifier stopped; dropping notification");
                false
            }
        }
    }
}

fn run_worker(config: NotifierConfig, mut rx: mpsc::Receiver<String>, cancel: CancelToken) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build notifier runtime");
            return;
        }
    };

    runtime.block_on(async move {
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                line = rx.recv() => match line {
                    Some(line) => line,
                    None => break,
                },
            };
            match deliver(&config.address, &line, config.timeout).await {
                Ok(()) => debug!(address = %config.address, "notification delivered"),
                Err(e) => warn!(error = %e, "notification not delivered"),
            }
        }
    });
}

async fn deliver(address: &str, line: &str, timeout: Duration) -> Result<(), LinkError> {
    let send = async {
        let mut stream = TcpStream::connect(address).await?;
        stream.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            stream.write_all(b"\n").await?;
        }
        stream.shutdown().await
    };
    match tokio::time::timeout(timeout, send).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(LinkError::Notifier(format!("send to {address} failed: {e}"))),
        Err(_) => Err(LinkError::Notifier(format!("send to {address} timed out"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn delivers_one_line_per_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let notifier = Notifier::spawn(NotifierConfig {
            address,
            queue_capacity: 4,
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let handle = notifier.handle();
        assert!(handle.notify("first"));
        assert!(handle.notify("second\n"));

        for expected in ["first\n", "second\n"] {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).unwrap();
            assert_eq!(received, expected);
        }
        notifier.shutdown();
    }

    #[test]
    fn unreachable_endpoint_is_not_fatal() {
        // Bind then drop to obtain a port nobody is listening on.
        let address = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().to_string()
        };
        let notifier = Notifier::spawn(NotifierConfig {
            address,
            queue_capacity: 4,
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        assert!(notifier.handle().notify("lost"));
        std::thread::sleep(Duration::from_millis(100));
        notifier.shutdown();
    }

    #[test]
    fn notify_after_shutdown_is_dropped() {
        let notifier = Notifier::spawn(NotifierConfig::default()).unwrap();
        let handle = notifier.handle();
        notifier.shutdown();
        assert!(!handle.notify("too late"));
    }
}
