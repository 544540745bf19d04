//! Error types for the CortexKey agent.
//!
//! Only [`ConfigError`] is allowed to stop a session, and only before the
//! control loop starts. Every other kind is absorbed by the component that
//! raises it (skip, retry, fall back or drop a window).

use thiserror::Error;

/// Errors raised while acquiring samples.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// A hardware data line could not be parsed.
    #[error("Malformed data line {line:?}: {reason}")]
    Parse { line: String, reason: String },

    /// The device endpoint could not be opened or read.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The device is connected but sent nothing within the read timeout.
    #[error("No data from device within the read timeout")]
    NoData,

    /// The device stream reached end of file.
    #[error("Device stream closed")]
    Disconnected,

    /// The supervisor gave up on hardware.
    #[error("Gave up on hardware after {attempts} connection attempts")]
    ExhaustedRetries { attempts: u32 },

    /// A stop was requested while waiting on the device.
    #[error("Acquisition cancelled")]
    Cancelled,
}

impl From<std::io::Error> for AcquisitionError {
    fn from(e: std::io::Error) -> Self {
        AcquisitionError::Connection(e.to_string())
    }
}

/// Errors raised while conditioning a window or extracting features.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Non-finite value produced by {stage}")]
    NonFinite { stage: &'static str },

    #[error("Window of {len} samples is too short for analysis (need {min})")]
    WindowTooShort { len: usize, min: usize },
}

/// Errors raised by signature encryption and verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Encryption failed")]
    Encryption,

    #[error("Signature authentication failed - wrong passphrase or tampered data")]
    Authentication,

    #[error("Malformed signature: {0}")]
    Malformed(String),
}

/// Fatal configuration errors, reported before any session starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("A non-empty passphrase is required")]
    MissingPassphrase,

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),

    #[error("Window size must be at least {min} samples, got {got}")]
    InvalidWindow { got: usize, min: usize },

    #[error("Step size ({step}) must be positive and smaller than window size ({window})")]
    InvalidStride { step: usize, window: usize },

    #[error("Invalid filter configuration: {0}")]
    InvalidFilter(String),

    #[error("Maximum reconnect attempts must be at least 1")]
    InvalidReconnectAttempts,

    #[error("Baud rate must be positive")]
    InvalidBaudRate,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// A window that could not be turned into a signature. The window is dropped
/// and the session continues.
#[derive(Debug, Error)]
pub enum WindowError {
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
