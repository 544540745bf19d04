//! Sample and source-mode types shared by every acquisition path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single biosignal reading.
///
/// `timestamp` is monotonic seconds: the device clock for hardware samples,
/// the tick schedule for synthetic ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds
    pub timestamp: f64,
    /// Signal value (microvolts for synthetic data, millivolts from the board)
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Where samples are currently coming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceMode {
    /// Synthetic generator
    Mock,
    /// Physical device over the wire protocol
    Hardware,
}

impl SourceMode {
    /// Label used in output records.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Mock => "MOCK",
            SourceMode::Hardware => "HARDWARE",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity pattern produced by the synthetic generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Consistent, alpha-dominant resting pattern
    #[default]
    Authenticated,
    /// Weak shifted alpha, elevated beta, heavy noise and artifacts
    Impostor,
}

impl MockMode {
    /// Lowercase name, as accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            MockMode::Authenticated => "authenticated",
            MockMode::Impostor => "impostor",
        }
    }
}

impl fmt::Display for MockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "authenticated" | "auth" => Ok(MockMode::Authenticated),
            "impostor" | "imp" => Ok(MockMode::Impostor),
            other => Err(format!(
                "invalid mock mode '{other}', use 'authenticated' or 'impostor'"
            )),
        }
    }
}
