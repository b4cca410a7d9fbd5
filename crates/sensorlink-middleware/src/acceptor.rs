//! [`ConnectionAcceptor`] – one listening socket serviced by one dedicated
//! worker thread.
//!
//! The socket is bound synchronously by [`ConnectionAcceptor::bind`] so that
//! bind failures surface to the caller before any thread exists.
//! [`ConnectionAcceptor::spawn`] then moves the socket onto a named worker
//! thread that drives a single-threaded Tokio runtime:
//!
//! 1. Wait for the next inbound connection, or for cancellation.
//! 2. Serve that connection to completion with [`read_stream`], forwarding
//!    every unit to the `on_unit` callback on the worker thread.
//! 3. Go back to step 1.  Only one connection is served at a time; further
//!    clients queue in the listen backlog until the current one ends.
//!
//! Read errors end the current connection but never the acceptor.  On
//! cancellation the loop exits and the listening socket is closed before the
//! thread terminates.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sensorlink_types::LinkError;
use tokio::net::TcpListener;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::reader::{ReadMode, ReadOutcome, read_stream};

/// Pause between a failed accept and the next attempt.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A bound, not yet running, listening socket.
#[derive(Debug)]
pub struct ConnectionAcceptor {
    role: String,
    listener: StdTcpListener,
    local_addr: SocketAddr,
    mode: ReadMode,
}

impl ConnectionAcceptor {
    /// Bind a listening socket on `addr`.
    ///
    /// `role` is a short label (`"sensor"`, `"command"`) used for thread
    /// names and log fields.  Binding port `0` picks an ephemeral port;
    /// query it with [`local_addr`][Self::local_addr].
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Bind`] if the address is unavailable.
    pub fn bind(role: impl Into<String>, addr: SocketAddr, mode: ReadMode) -> Result<Self, LinkError> {
        let role = role.into();
        let bind_err = |source| LinkError::Bind {
            role: role.clone(),
            addr,
            source,
        };
        let listener = StdTcpListener::bind(addr).map_err(bind_err)?;
        // Tokio requires non-blocking sockets when adopting a std listener.
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self {
            role,
            listener,
            local_addr,
            mode,
        })
    }

    /// The address the socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Move the socket onto its worker thread and start accepting.
    ///
    /// `on_unit` runs on the worker thread, once per received unit, in
    /// receipt order.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Spawn`] if the OS refuses to create the thread.
    pub fn spawn<F>(self, on_unit: F, cancel: CancelToken) -> Result<AcceptorHandle, LinkError>
    where
        F: FnMut(String) + Send + 'static,
    {
        let name = format!("{}-acceptor", self.role);
        let role = self.role.clone();
        let local_addr = self.local_addr;

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run(on_unit, cancel))
            .map_err(|source| LinkError::Spawn { name, source })?;

        Ok(AcceptorHandle {
            role,
            local_addr,
            thread,
        })
    }

    fn run<F>(self, on_unit: F, cancel: CancelToken)
    where
        F: FnMut(String),
    {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!(role = %self.role, error = %e, "failed to build acceptor runtime");
                return;
            }
        };
        runtime.block_on(self.accept_loop(on_unit, cancel));
    }

    async fn accept_loop<F>(self, mut on_unit: F, cancel: CancelToken)
    where
        F: FnMut(String),
    {
        let Self {
            role,
            listener,
            local_addr,
            mode,
        } = self;

        let listener = match TcpListener::from_std(listener) {
            Ok(l) => l,
            Err(e) => {
                error!(role = %role, error = %e, "failed to register listener");
                return;
            }
        };
        info!(role = %role, addr = %local_addr, "listening");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(role = %role, error = %e, "accept failed; retrying");
                    if !accept_backoff(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let span = info_span!("connection", role = %role, peer = %peer, conn_id = %Uuid::new_v4());
            async {
                info!("client connected");
                match read_stream(stream, mode, &cancel, &mut on_unit).await {
                    Ok(ReadOutcome::Closed) => info!("client disconnected"),
                    Ok(ReadOutcome::Cancelled) => debug!("connection abandoned on cancel"),
                    Err(e) => warn!(error = %e, "connection read failed"),
                }
            }
            .instrument(span)
            .await;
        }

        drop(listener);
        info!(role = %role, addr = %local_addr, "listener stopped");
    }
}

/// Wait out [`ACCEPT_RETRY_DELAY`].  Returns `false` if cancelled first.
///
/// Errors such as fd exhaustion persist across attempts.
async fn accept_backoff(cancel: &CancelToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}

/// Handle to a running acceptor thread.
#[derive(Debug)]
pub struct AcceptorHandle {
    role: String,
    local_addr: SocketAddr,
    thread: JoinHandle<()>,
}

impl AcceptorHandle {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the worker thread exits.
    ///
    /// Returns `false` if the worker panicked.  The caller must have
    /// cancelled the acceptor's token first or this never returns.
    pub fn join(self) -> bool {
        match self.thread.join() {
            Ok(()) => true,
            Err(_) => {
                error!(role = %self.role, "acceptor thread panicked");
                false
            }
        }
    }
}
