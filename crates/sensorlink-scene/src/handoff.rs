//! File mailbox between the sensor path and the physics path.
//!
//! The sensor path overwrites the file with six lines (linear x/y/z then
//! angular x/y/z, two decimals each).  The physics path reads the record and
//! truncates the file, so each record is consumed at most once.
//!
//! Access is unsynchronised: a write landing between [`HandoffFile::take`]'s
//! read and its truncation is lost.  Both sides run on the consumer thread
//! in this workspace, but an external writer is not excluded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sensorlink_types::{LinkError, VelocityPair};
use tracing::{debug, warn};

/// Number of lines in one record.
pub const RECORD_LINES: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffFile {
    path: PathBuf,
}

impl HandoffFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file contents with `velocities`.
    pub fn write(&self, velocities: VelocityPair) -> Result<(), LinkError> {
        let body: String = velocities
            .to_array()
            .iter()
            .map(|v| format!("{v:.2}\n"))
            .collect();
        fs::write(&self.path, body).map_err(|source| self.io_error(source))?;
        debug!(path = %self.path.display(), "handoff record written");
        Ok(())
    }

    /// Read the pending record, if any, and truncate the file.
    ///
    /// Returns `Ok(None)` when the file is missing or holds fewer than six
    /// non-empty lines.  The file is truncated even when its content fails
    /// to parse, so a corrupt record is reported once and then discarded.
    pub fn take(&self) -> Result<Option<VelocityPair>, LinkError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "handoff file missing; no update available");
                return Ok(None);
            }
            Err(source) => return Err(self.io_error(source)),
        };

        fs::write(&self.path, "").map_err(|source| self.io_error(source))?;

        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(RECORD_LINES)
            .collect();
        if lines.len() < RECORD_LINES {
            if !lines.is_empty() {
                warn!(lines = lines.len(), "incomplete handoff record discarded");
            }
            return Ok(None);
        }

        let mut values = [0.0f32; RECORD_LINES];
        for (slot, line) in values.iter_mut().zip(&lines) {
            *slot = parse_value(line)?;
        }
        Ok(Some(VelocityPair::from_array(values)))
    }

    fn io_error(&self, source: io::Error) -> LinkError {
        LinkError::Handoff {
            path: self.path.clone(),
            source,
        }
    }
}

/// Accepts either `.` or `,` as the decimal separator.
fn parse_value(line: &str) -> Result<f32, LinkError> {
    line.replace(',', ".")
        .parse::<f32>()
        .map_err(|e| LinkError::HandoffParse(format!("{line:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlink_types::Vec3;

    fn mailbox() -> (tempfile::TempDir, HandoffFile) {
        let dir = tempfile::tempdir().unwrap();
        let file = HandoffFile::new(dir.path().join("SensorData.txt"));
        (dir, file)
    }

    #[test]
    fn write_then_take_round_trips_at_two_decimals() {
        let (_dir, file) = mailbox();
        let pair = VelocityPair::new(Vec3::new(1.234, -2.0, 0.5), Vec3::new(0.0, 9.999, -0.011));
        file.write(pair).unwrap();

        assert_eq!(
            fs::read_to_string(file.path()).unwrap(),
            "1.23\n-2.00\n0.50\n0.00\n10.00\n-0.01\n"
        );

        let read = file.take().unwrap().unwrap();
        for (got, want) in read.to_array().iter().zip(pair.to_array()) {
            assert!((got - want).abs() <= 0.005 + 1e-6, "{got} vs {want}");
        }
    }

    #[test]
    fn second_take_yields_nothing() {
        let (_dir, file) = mailbox();
        file.write(VelocityPair::default()).unwrap();
        assert!(file.take().unwrap().is_some());
        assert!(file.take().unwrap().is_none());
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "");
    }

    #[test]
    fn missing_file_is_no_update() {
        let (_dir, file) = mailbox();
        assert!(file.take().unwrap().is_none());
    }

    #[test]
    fn short_record_is_discarded() {
        let (_dir, file) = mailbox();
        fs::write(file.path(), "1.0\n2.0\n3.0\n").unwrap();
        assert!(file.take().unwrap().is_none());
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "");
    }

    #[test]
    fn tolerates_comma_decimals_and_blank_lines() {
        let (_dir, file) = mailbox();
        fs::write(file.path(), "1,50\n\n2.00\n3\n 4.25 \n5\n6\n").unwrap();
        let read = file.take().unwrap().unwrap();
        assert_eq!(read.to_array(), [1.5, 2.0, 3.0, 4.25, 5.0, 6.0]);
    }

    #[test]
    fn garbage_is_reported_then_cleared() {
        let (_dir, file) = mailbox();
        fs::write(file.path(), "1\n2\nthree\n4\n5\n6\n").unwrap();
        assert!(matches!(file.take(), Err(LinkError::HandoffParse(_))));
        assert!(file.take().unwrap().is_none());
    }
}
