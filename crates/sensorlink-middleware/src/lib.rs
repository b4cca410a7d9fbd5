//! `sensorlink-middleware` – The Ingestion Layer
//!
//! Moves bytes from two TCP ports into a single-threaded consumer without
//! letting network threads touch consumer state.
//!
//! # Modules
//!
//! - [`protocol`] – pure decoders for sensor chunks and command lines.
//! - [`reader`] – per-connection read loops (fixed-size chunks or lines).
//! - [`acceptor`] – [`ConnectionAcceptor`]: one listening socket on one
//!   worker thread, serving connections one at a time.
//! - [`cancel`] – [`CancelSource`] / [`CancelToken`]: the shared stop signal.
//! - [`dispatcher`] – [`MainThreadDispatcher`]: the only synchronisation
//!   point between producers and the consumer.
//! - [`service`] – [`IngestionService`]: start/stop/join lifecycle of both
//!   acceptors and the decode → enqueue wiring.
//! - [`notifier`] – [`Notifier`]: bounded, best-effort outbound reports.

pub mod acceptor;
pub mod cancel;
pub mod dispatcher;
pub mod notifier;
pub mod protocol;
pub mod reader;
pub mod service;

pub use acceptor::{AcceptorHandle, ConnectionAcceptor};
pub use cancel::{CancelSource, CancelToken};
pub use dispatcher::{DispatchHandle, MainThreadDispatcher};
pub use notifier::{Notifier, NotifierConfig, NotifierHandle};
pub use protocol::{COMMAND_OFFSET, decode_command_line, decode_sensor_chunk};
pub use reader::{ReadMode, ReadOutcome};
pub use service::{IngestTarget, IngestionConfig, IngestionService};
