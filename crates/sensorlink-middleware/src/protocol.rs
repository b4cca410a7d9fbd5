//! Payload decoders for the two ingestion ports.
//!
//! * **Sensor port** – each received chunk is one JSON object carrying the six
//!   velocity fields of a [`SensorRecord`].
//! * **Command port** – each received line carries its command character at
//!   byte offset [`COMMAND_OFFSET`]; the bytes before it are ignored.
//!
//! Both decoders are pure: they never touch shared state and report malformed
//! input as a [`LinkError`] for the caller to log and drop.

use sensorlink_types::{Command, LinkError, SensorRecord};

/// Byte offset of the command character inside a command line.
pub const COMMAND_OFFSET: usize = 3;

/// Decode one sensor chunk into a [`SensorRecord`].
///
/// Surrounding whitespace and NUL padding are tolerated.
///
/// # Errors
///
/// Returns [`LinkError::MalformedSensor`] when the chunk is not a complete
/// JSON object with all six numeric fields.
pub fn decode_sensor_chunk(chunk: &str) -> Result<SensorRecord, LinkError> {
    let payload = chunk.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    serde_json::from_str(payload).map_err(|e| LinkError::MalformedSensor(e.to_string()))
}

/// Decode one command line into a [`Command`].
///
/// # Errors
///
/// * [`LinkError::CommandTooShort`] when the line has no byte at
///   [`COMMAND_OFFSET`].
/// * [`LinkError::UnknownCommand`] when that byte is outside the control
///   alphabet.
pub fn decode_command_line(line: &str) -> Result<Command, LinkError> {
    let bytes = line.as_bytes();
    let Some(&byte) = bytes.get(COMMAND_OFFSET) else {
        return Err(LinkError::CommandTooShort { len: bytes.len() });
    };
    let c = char::from(byte);
    Command::from_char(c).ok_or(LinkError::UnknownCommand(c))
}
