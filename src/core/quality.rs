//! Advisory raw-signal quality checks.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

/// Coarse signal quality grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLabel {
    /// Clean contact, plausible amplitude
    Good,
    /// Usable but noisy or weak
    Fair,
    /// No contact, saturation or heavy artifacts
    Poor,
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityLabel::Good => "good",
            QualityLabel::Fair => "fair",
            QualityLabel::Poor => "poor",
        };
        f.write_str(s)
    }
}

/// Grade a slice from its RMS and absolute peak.
pub fn classify(rms: f64, peak: f64) -> QualityLabel {
    if peak > 100.0 || rms > 50.0 {
        // Saturation or artifact
        QualityLabel::Poor
    } else if peak < 0.1 && rms < 0.05 {
        // No electrode contact
        QualityLabel::Poor
    } else if (0.5..=10.0).contains(&rms) && peak <= 50.0 {
        QualityLabel::Good
    } else {
        QualityLabel::Fair
    }
}

/// Grade of one quality interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Root mean square of the raw values
    pub rms: f64,
    /// Largest absolute raw value
    pub peak: f64,
    /// Grade derived from `rms` and `peak`
    pub label: QualityLabel,
}

impl QualityReport {
    /// Grade raw values. An empty slice is poor.
    pub fn from_samples(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                rms: 0.0,
                peak: 0.0,
                label: QualityLabel::Poor,
            };
        }
        let rms = values.quadratic_mean();
        let peak = values.abs_max();
        Self {
            rms,
            peak,
            label: classify(rms, peak),
        }
    }
}

/// Grades every `interval` raw samples (about one second of data).
#[derive(Debug)]
pub struct QualityMonitor {
    interval: usize,
    pending: Vec<f64>,
    last: Option<QualityReport>,
}

impl QualityMonitor {
    /// Monitor reporting once per second of samples.
    pub fn new(sample_rate_hz: f64) -> Self {
        let interval = (sample_rate_hz.round() as usize).max(1);
        Self {
            interval,
            pending: Vec::with_capacity(interval),
            last: None,
        }
    }

    /// Feed one raw value; returns a report when an interval completes.
    pub fn observe(&mut self, value: f64) -> Option<QualityReport> {
        self.pending.push(value);
        if self.pending.len() < self.interval {
            return None;
        }

        let report = QualityReport::from_samples(&self.pending);
        self.pending.clear();
        if report.label == QualityLabel::Poor {
            tracing::warn!(rms = report.rms, peak = report.peak, "Signal quality poor");
        } else {
            tracing::debug!(rms = report.rms, peak = report.peak, quality = %report.label, "Signal quality");
        }
        self.last = Some(report);
        Some(report)
    }

    /// Most recent grade, if any interval has completed.
    pub fn last(&self) -> Option<QualityReport> {
        self.last
    }
}
