//! Configuration for the CortexKey agent.

use crate::collector::hardware::DEFAULT_BAUD_RATE;
use crate::collector::types::MockMode;
use crate::core::record::OutputFormat;
use crate::core::signature::Passphrase;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest window the conditioner and Welch estimator can work with.
pub const MIN_WINDOW_SIZE: usize = 16;

/// Main configuration for a signing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sampling rate of both sources (Hz)
    pub sample_rate_hz: f64,

    /// Samples per analysis window
    pub window_size: usize,

    /// New samples between consecutive windows
    pub step_size: usize,

    /// Consecutive failed hardware attempts before falling back to synthetic data
    pub max_reconnect_attempts: u32,

    /// Stop automatically after this many seconds
    pub max_duration_secs: Option<u64>,

    /// Identity pattern for synthetic data
    pub mock_mode: MockMode,

    /// Skip hardware entirely
    pub force_mock: bool,

    /// Serial port of the acquisition board (e.g. /dev/ttyUSB0)
    pub device_path: Option<PathBuf>,

    /// Serial line speed of the acquisition board
    pub baud_rate: u32,

    /// Mains frequency to reject (50 or 60 Hz)
    pub notch_hz: f64,
    /// Quality factor of the notch; higher is narrower
    pub notch_q: f64,
    /// Band-pass lower edge (Hz)
    pub bandpass_low_hz: f64,
    /// Band-pass upper edge (Hz)
    pub bandpass_high_hz: f64,

    /// Where signature records are appended; console only when unset
    pub output_path: Option<PathBuf>,
    /// Record format for `output_path`
    pub output_format: OutputFormat,

    /// Path for storing the last session summary
    pub data_path: PathBuf,

    /// Never written to disk
    #[serde(skip)]
    pub passphrase: Option<Passphrase>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cortexkey");

        Self {
            sample_rate_hz: 256.0,
            window_size: 512,
            step_size: 128,
            max_reconnect_attempts: 10,
            max_duration_secs: None,
            mock_mode: MockMode::Authenticated,
            force_mock: false,
            device_path: None,
            baud_rate: DEFAULT_BAUD_RATE,
            notch_hz: 50.0,
            notch_q: 30.0,
            bandpass_low_hz: 5.0,
            bandpass_high_hz: 30.0,
            output_path: None,
            output_format: OutputFormat::Csv,
            data_path: data_dir,
            passphrase: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cortexkey")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        if let Some(parent) = self.output_path.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Auto-stop limit, if any.
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }

    /// The validated passphrase.
    pub fn passphrase(&self) -> Result<&Passphrase, ConfigError> {
        match &self.passphrase {
            Some(p) if !p.is_blank() => Ok(p),
            _ => Err(ConfigError::MissingPassphrase),
        }
    }

    /// Check every setting a session depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.passphrase()?;

        let fs = self.sample_rate_hz;
        if !fs.is_finite() || fs <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(fs));
        }

        if self.window_size < MIN_WINDOW_SIZE {
            return Err(ConfigError::InvalidWindow {
                got: self.window_size,
                min: MIN_WINDOW_SIZE,
            });
        }
        if self.step_size == 0 || self.step_size >= self.window_size {
            return Err(ConfigError::InvalidStride {
                step: self.step_size,
                window: self.window_size,
            });
        }

        let nyquist = fs / 2.0;
        let inside = |f: f64| f.is_finite() && f > 0.0 && f < nyquist;
        if !inside(self.notch_hz) {
            return Err(ConfigError::InvalidFilter(format!(
                "notch at {} Hz is outside (0, {nyquist}) Hz",
                self.notch_hz
            )));
        }
        if !(self.notch_q.is_finite() && self.notch_q > 0.0) {
            return Err(ConfigError::InvalidFilter(format!(
                "notch Q must be positive, got {}",
                self.notch_q
            )));
        }
        if !inside(self.bandpass_low_hz) || !inside(self.bandpass_high_hz) {
            return Err(ConfigError::InvalidFilter(format!(
                "band {}-{} Hz is outside (0, {nyquist}) Hz",
                self.bandpass_low_hz, self.bandpass_high_hz
            )));
        }
        if self.bandpass_low_hz >= self.bandpass_high_hz {
            return Err(ConfigError::InvalidFilter(format!(
                "band low edge {} Hz must be below high edge {} Hz",
                self.bandpass_low_hz, self.bandpass_high_hz
            )));
        }

        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidReconnectAttempts);
        }

        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }

        Ok(())
    }
}
