//! [`IngestionService`] – the two-port ingestion front end.
//!
//! The service owns one [`ConnectionAcceptor`] per port and a single
//! [`CancelSource`] governing both:
//!
//! | Port | Read mode | Decoder | Effect enqueued |
//! |---|---|---|---|
//! | sensor (5000) | fixed-size chunks | [`decode_sensor_chunk`] | [`IngestTarget::apply_sensor`] |
//! | command (5001) | lines | [`decode_command_line`] | [`IngestTarget::apply_command`] |
//!
//! Decoding happens on the acceptor threads.  Decoded values never touch
//! consumer state directly: each one is wrapped in a closure and enqueued on
//! the consumer's [`MainThreadDispatcher`][crate::dispatcher::MainThreadDispatcher]
//! through a [`DispatchHandle`].  Malformed payloads are logged and dropped.
//!
//! [`IngestionService::stop_all`] cancels both acceptors and joins both
//! threads before returning; dropping the service does the same.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use sensorlink_types::{Command, LinkError, SensorRecord};
use tracing::{debug, info, warn};

use crate::acceptor::{AcceptorHandle, ConnectionAcceptor};
use crate::cancel::CancelSource;
use crate::dispatcher::DispatchHandle;
use crate::protocol::{decode_command_line, decode_sensor_chunk};
use crate::reader::{DEFAULT_CHUNK_SIZE, ReadMode};

/// Consumer-owned state that decoded input is applied to.
///
/// Both methods run on the consumer's thread, inside a dispatcher drain.
pub trait IngestTarget: 'static {
    fn apply_sensor(&mut self, record: SensorRecord);
    fn apply_command(&mut self, command: Command);
}

/// Listener addresses and buffer sizing for [`IngestionService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionConfig {
    pub bind_address: IpAddr,
    pub sensor_port: u16,
    pub command_port: u16,
    pub sensor_chunk_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            sensor_port: 5000,
            command_port: 5001,
            sensor_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

struct Running {
    cancel: CancelSource,
    sensor: AcceptorHandle,
    command: AcceptorHandle,
}

/// Lifecycle owner of the sensor and command acceptors.
pub struct IngestionService<C: IngestTarget> {
    config: IngestionConfig,
    dispatch: DispatchHandle<C>,
    running: Option<Running>,
}

impl<C: IngestTarget> IngestionService<C> {
    pub fn new(config: IngestionConfig, dispatch: DispatchHandle<C>) -> Self {
        Self {
            config,
            dispatch,
            running: None,
        }
    }

    /// Bind both ports and start both acceptor threads.
    ///
    /// # Errors
    ///
    /// * [`LinkError::AlreadyRunning`] if called twice without
    ///   [`stop_all`][Self::stop_all].
    /// * [`LinkError::Bind`] / [`LinkError::Spawn`] if either acceptor cannot
    ///   start.  Nothing is left running in that case.
    pub fn start_all(&mut self) -> Result<(), LinkError> {
        if self.running.is_some() {
            return Err(LinkError::AlreadyRunning);
        }

        let ip = self.config.bind_address;
        let sensor = ConnectionAcceptor::bind(
            "sensor",
            SocketAddr::new(ip, self.config.sensor_port),
            ReadMode::Chunked {
                chunk_size: self.config.sensor_chunk_size,
            },
        )?;
        let command = ConnectionAcceptor::bind(
            "command",
            SocketAddr::new(ip, self.config.command_port),
            ReadMode::Lines,
        )?;

        let cancel = CancelSource::new();
        let sensor = sensor.spawn(sensor_handler(self.dispatch.clone()), cancel.token())?;
        let command = match command.spawn(command_handler(self.dispatch.clone()), cancel.token()) {
            Ok(handle) => handle,
            Err(e) => {
                cancel.cancel();
                sensor.join();
                return Err(e);
            }
        };

        info!(
            sensor = %sensor.local_addr(),
            command = %command.local_addr(),
            "ingestion service started"
        );
        self.running = Some(Running {
            cancel,
            sensor,
            command,
        });
        Ok(())
    }

    /// Cancel both acceptors and block until both threads have exited.
    ///
    /// A worker parked in a read on an idle connection notices cancellation
    /// immediately.  No-op when the service is not running.
    pub fn stop_all(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        let sensor_ok = running.sensor.join();
        let command_ok = running.command.join();
        info!(sensor_ok, command_ok, "ingestion service stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bound address of the sensor listener while running.
    pub fn sensor_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.sensor.local_addr())
    }

    /// Bound address of the command listener while running.
    pub fn command_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.command.local_addr())
    }
}

impl<C: IngestTarget> Drop for IngestionService<C> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn sensor_handler<C: IngestTarget>(dispatch: DispatchHandle<C>) -> impl FnMut(String) + Send + 'static {
    move |chunk: String| match decode_sensor_chunk(&chunk) {
        Ok(record) => {
            debug!(fields = ?record.fields(), "sensor record decoded");
            dispatch.enqueue(move |ctx: &mut C| ctx.apply_sensor(record));
        }
        Err(e) => warn!(error = %e, chunk = %chunk.trim(), "dropping sensor chunk"),
    }
}

fn command_handler<C: IngestTarget>(dispatch: DispatchHandle<C>) -> impl FnMut(String) + Send + 'static {
    move |line: String| match decode_command_line(&line) {
        Ok(command) => {
            debug!(command = ?command, "command decoded");
            dispatch.enqueue(move |ctx: &mut C| ctx.apply_command(command));
        }
        Err(e) => warn!(error = %e, "dropping command line"),
    }
}
