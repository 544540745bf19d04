//! Device wire protocol parsing.
//!
//! The acquisition board streams ASCII lines:
//!
//! ```text
//! timestamp_ms,raw_adc,millivolts\n      data
//! STATUS:Started streaming\n             control (also CMD:, ERROR:, INFO:)
//! ```
//!
//! Data lines must carry exactly three numeric fields. Anything else is
//! counted and skipped; a bad line never stalls the stream.

use crate::collector::types::Sample;
use crate::error::AcquisitionError;
use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;

/// Prefixes that mark device control/status lines.
const CONTROL_PREFIXES: [&str; 4] = ["STATUS:", "CMD:", "ERROR:", "INFO:"];

/// Optional prefixes some firmware builds put in front of data lines.
const DATA_PREFIXES: [&str; 2] = ["DATA:", "DATA|"];

/// Emit a warning every this many parse errors.
const PARSE_WARN_EVERY: u64 = 100;

/// A decoded data line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataLine {
    /// Device clock in milliseconds
    pub timestamp_ms: f64,
    /// Raw ADC count
    pub raw_adc: f64,
    /// Calibrated signal value
    pub millivolts: f64,
}

impl DataLine {
    /// Convert to a [`Sample`] with the timestamp in seconds.
    pub fn to_sample(self) -> Sample {
        Sample::new(self.timestamp_ms / 1000.0, self.millivolts)
    }
}

/// Classification of one line from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum WireLine {
    /// A valid sample line
    Data(DataLine),
    /// A status or command echo, trimmed
    Control(String),
    /// Blank line
    Empty,
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

/// Parse one line of the wire protocol.
pub fn parse_line(line: &str) -> Result<WireLine, AcquisitionError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(WireLine::Empty);
    }

    if CONTROL_PREFIXES
        .iter()
        .any(|p| strip_prefix_ignore_case(trimmed, p).is_some())
    {
        return Ok(WireLine::Control(trimmed.to_string()));
    }

    let payload = DATA_PREFIXES
        .iter()
        .find_map(|p| strip_prefix_ignore_case(trimmed, p))
        .unwrap_or(trimmed);

    let malformed = |reason: String| AcquisitionError::Parse {
        line: trimmed.to_string(),
        reason,
    };

    let fields: Vec<&str> = payload.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(malformed(format!("expected 3 fields, found {}", fields.len())));
    }

    let mut values = [0.0f64; 3];
    for (slot, field) in values.iter_mut().zip(&fields) {
        let value: f64 = field
            .parse()
            .map_err(|_| malformed(format!("field {field:?} is not numeric")))?;
        if !value.is_finite() {
            return Err(malformed(format!("field {field:?} is not finite")));
        }
        *slot = value;
    }

    Ok(WireLine::Data(DataLine {
        timestamp_ms: values[0],
        raw_adc: values[1],
        millivolts: values[2],
    }))
}

/// Opens the byte stream to the device.
///
/// Endpoint discovery is left to the implementation; the supervisor only
/// needs a fresh readable stream per connection attempt.
pub trait Connector: Send {
    fn connect(&mut self) -> Result<Box<dyn BufRead + Send>, AcquisitionError>;

    /// Human-readable endpoint name for logs.
    fn endpoint(&self) -> String;
}

/// Serial line speed of the acquisition board firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Longest a single read may block before control returns to the loop.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Connector for a serial port (e.g. `/dev/ttyUSB0`, `COM3`).
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    /// Serial port name and line speed; reads time out after [`READ_TIMEOUT`].
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl Connector for SerialConnector {
    fn connect(&mut self) -> Result<Box<dyn BufRead + Send>, AcquisitionError> {
        let port = serialport::new(self.port.as_str(), self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| AcquisitionError::Connection(format!("cannot open {}: {e}", self.port)))?;
        Ok(Box::new(BufReader::new(port)))
    }

    fn endpoint(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }
}

/// Reads samples from a connected device stream.
pub struct HardwareSource {
    reader: Box<dyn BufRead + Send>,
    line: String,
    alive: bool,
    seen_data: bool,
    samples_read: u64,
    parse_errors: u64,
    unreported_parse_errors: u64,
    control_lines: u64,
}

impl HardwareSource {
    /// Wrap a freshly opened device stream.
    pub fn new(reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            reader,
            line: String::new(),
            alive: true,
            seen_data: false,
            samples_read: 0,
            parse_errors: 0,
            unreported_parse_errors: 0,
            control_lines: 0,
        }
    }

    /// Read lines until one yields a sample.
    ///
    /// Control lines and malformed lines are skipped. Text before the first
    /// valid data line is treated as the device's startup banner. A read
    /// timeout returns `NoData` and keeps any partial line for the next call.
    /// End of stream and read failures surface as errors and mark the source
    /// dead.
    pub fn pull_sample(&mut self) -> Result<Sample, AcquisitionError> {
        if !self.alive {
            return Err(AcquisitionError::Disconnected);
        }

        loop {
            let read = match self.reader.read_line(&mut self.line) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Err(AcquisitionError::NoData);
                }
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    // Non UTF-8 garbage on the wire.
                    self.line.clear();
                    self.record_parse_error("<invalid utf-8>", "line is not valid UTF-8");
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.alive = false;
                    return Err(AcquisitionError::Connection(e.to_string()));
                }
            };
            if read == 0 && self.line.is_empty() {
                self.alive = false;
                return Err(AcquisitionError::Disconnected);
            }

            let parsed = parse_line(&self.line);
            self.line.clear();
            match parsed {
                Ok(WireLine::Data(data)) => {
                    self.seen_data = true;
                    self.samples_read += 1;
                    return Ok(data.to_sample());
                }
                Ok(WireLine::Control(text)) => {
                    self.control_lines += 1;
                    tracing::debug!(line = %text, "Device control line");
                }
                Ok(WireLine::Empty) => {}
                Err(AcquisitionError::Parse { line, reason }) => {
                    if self.seen_data {
                        self.record_parse_error(&line, &reason);
                    } else {
                        tracing::debug!(line = %line, "Device banner");
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn record_parse_error(&mut self, line: &str, reason: &str) {
        self.parse_errors += 1;
        self.unreported_parse_errors += 1;
        tracing::debug!(line = %line, reason = %reason, "Skipping malformed line");
        if self.parse_errors % PARSE_WARN_EVERY == 1 {
            tracing::warn!(total = self.parse_errors, "Malformed device lines are being skipped");
        }
    }

    /// False once the stream has ended or failed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Data lines decoded on this connection.
    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }

    /// Total malformed data lines skipped.
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }

    /// Parse errors since the last call.
    pub fn take_parse_errors(&mut self) -> u64 {
        std::mem::take(&mut self.unreported_parse_errors)
    }

    /// Control and status lines seen on this connection.
    pub fn control_lines(&self) -> u64 {
        self.control_lines
    }
}
