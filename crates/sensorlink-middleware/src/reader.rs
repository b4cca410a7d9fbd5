//! Per-connection read loops.
//!
//! A connection is read in one of two [`ReadMode`]s:
//!
//! | Mode | Unit forwarded | Typical port |
//! |---|---|---|
//! | [`ReadMode::Chunked`] | whatever non-empty chunk a single read returns | sensor |
//! | [`ReadMode::Lines`] | one newline-terminated record, terminator stripped | command |
//!
//! Both loops stop on end-of-stream, on a read error, or as soon as the
//! [`CancelToken`] fires, even while a read is pending.  Bytes are decoded as
//! UTF-8 with invalid sequences replaced, so a bad byte never ends a session.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::cancel::CancelToken;

/// Default buffer size for [`ReadMode::Chunked`].
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// How a connection's byte stream is cut into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Forward each non-empty read of at most `chunk_size` bytes.
    Chunked { chunk_size: usize },
    /// Forward each newline-terminated line.
    Lines,
}

/// Why a read loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The peer closed the stream.
    Closed,
    /// The cancellation signal fired.
    Cancelled,
}

/// Read `reader` to completion in the given `mode`, calling `on_unit` once
/// per received unit.
///
/// # Errors
///
/// Propagates the first I/O error from the underlying stream.
pub async fn read_stream<R, F>(
    reader: R,
    mode: ReadMode,
    cancel: &CancelToken,
    on_unit: &mut F,
) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    match mode {
        ReadMode::Chunked { chunk_size } => read_chunks(reader, chunk_size, cancel, on_unit).await,
        ReadMode::Lines => read_lines(reader, cancel, on_unit).await,
    }
}

async fn read_chunks<R, F>(
    mut reader: R,
    chunk_size: usize,
    cancel: &CancelToken,
    on_unit: &mut F,
) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ReadOutcome::Cancelled),
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            return Ok(ReadOutcome::Closed);
        }
        on_unit(String::from_utf8_lossy(&buf[..n]).into_owned());
    }
}

async fn read_lines<R, F>(reader: R, cancel: &CancelToken, on_unit: &mut F) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ReadOutcome::Cancelled),
            read = reader.read_until(b'\n', &mut line) => read?,
        };
        if n == 0 {
            return Ok(ReadOutcome::Closed);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        on_unit(String::from_utf8_lossy(&line).into_owned());
    }
}
