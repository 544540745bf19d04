//! Spectral band-power features.
//!
//! Power spectral density is estimated with Welch's method: the window is
//! split into 50%-overlapping sub-segments of a quarter of its length, each
//! segment is mean-removed and Hann tapered, and the periodograms are
//! averaged. Band powers integrate the one-sided density over half-open
//! frequency ranges.

use crate::error::ProcessingError;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Theta band, Hz.
pub const THETA_BAND: (f64, f64) = (4.0, 8.0);
/// Alpha band, Hz.
pub const ALPHA_BAND: (f64, f64) = (8.0, 13.0);
/// Beta band, Hz.
pub const BETA_BAND: (f64, f64) = (13.0, 30.0);

/// Denominator floor for band ratios.
const RATIO_FLOOR: f64 = 1e-12;

/// Number of features in a vector.
pub const FEATURE_COUNT: usize = 6;

/// Serialized size of a feature vector in bytes.
pub const FEATURE_BYTES: usize = FEATURE_COUNT * 8;

/// Six band-power features computed from one conditioned window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Power in 4-8 Hz
    pub theta_power: f64,
    /// Power in 8-13 Hz
    pub alpha_power: f64,
    /// Power in 13-30 Hz
    pub beta_power: f64,
    /// Alpha over theta, denominator floored at `RATIO_FLOOR`
    pub alpha_theta_ratio: f64,
    /// Alpha over beta, denominator floored at `RATIO_FLOOR`
    pub alpha_beta_ratio: f64,
    /// Power over the whole analysed spectrum
    pub total_power: f64,
}

impl FeatureVector {
    /// Build a vector from band powers, deriving the ratios.
    pub fn from_bands(theta: f64, alpha: f64, beta: f64, total: f64) -> Self {
        Self {
            theta_power: theta,
            alpha_power: alpha,
            beta_power: beta,
            alpha_theta_ratio: alpha / theta.max(RATIO_FLOOR),
            alpha_beta_ratio: alpha / beta.max(RATIO_FLOOR),
            total_power: total,
        }
    }

    /// Features in canonical order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.theta_power,
            self.alpha_power,
            self.beta_power,
            self.alpha_theta_ratio,
            self.alpha_beta_ratio,
            self.total_power,
        ]
    }

    /// Inverse of [`to_array`](Self::to_array).
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            theta_power: values[0],
            alpha_power: values[1],
            beta_power: values[2],
            alpha_theta_ratio: values[3],
            alpha_beta_ratio: values[4],
            total_power: values[5],
        }
    }

    /// Little-endian f64 encoding used as the encryption plaintext.
    pub fn to_bytes(&self) -> [u8; FEATURE_BYTES] {
        let mut out = [0u8; FEATURE_BYTES];
        for (chunk, value) in out.chunks_exact_mut(8).zip(self.to_array()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Decode [`to_bytes`](Self::to_bytes) output. Returns `None` on a length mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FEATURE_BYTES {
            return None;
        }
        let mut values = [0.0; FEATURE_COUNT];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *value = f64::from_le_bytes(raw);
        }
        Some(Self::from_array(values))
    }

    /// True when no feature is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// One-sided power spectral density.
#[derive(Debug, Clone, PartialEq)]
pub struct Psd {
    /// Bin centre frequencies in Hz
    pub frequencies: Vec<f64>,
    /// Power per Hz at each bin
    pub density: Vec<f64>,
    /// Bin spacing in Hz
    pub resolution: f64,
}

impl Psd {
    /// Integrated power over `[lo, hi)` Hz.
    pub fn band_power(&self, lo: f64, hi: f64) -> f64 {
        self.frequencies
            .iter()
            .zip(&self.density)
            .filter(|(f, _)| **f >= lo && **f < hi)
            .map(|(_, p)| p * self.resolution)
            .sum()
    }

    /// Integrated power over every bin.
    pub fn total_power(&self) -> f64 {
        self.density.iter().sum::<f64>() * self.resolution
    }

    /// Frequency of the strongest bin inside `[lo, hi)`.
    pub fn peak_frequency(&self, lo: f64, hi: f64) -> Option<f64> {
        self.frequencies
            .iter()
            .zip(&self.density)
            .filter(|(f, _)| **f >= lo && **f < hi)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(f, _)| *f)
    }
}

/// Periodic Hann taper of length `n`.
pub fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Computes [`FeatureVector`]s for windows of a fixed length.
pub struct FeatureExtractor {
    sample_rate_hz: f64,
    segment_len: usize,
    hop: usize,
    taper: Vec<f64>,
    /// 1 / (fs * sum(w^2))
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl FeatureExtractor {
    /// Plan the FFT for windows of `window_len` samples.
    pub fn new(sample_rate_hz: f64, window_len: usize) -> Self {
        let segment_len = (window_len / 4).max(4);
        let taper = hann_window(segment_len);
        let energy: f64 = taper.iter().map(|w| w * w).sum();
        let fft = FftPlanner::new().plan_fft_forward(segment_len);
        Self {
            sample_rate_hz,
            segment_len,
            hop: segment_len / 2,
            taper,
            scale: 1.0 / (sample_rate_hz * energy),
            fft,
        }
    }

    /// Welch sub-segment length in samples.
    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    /// Welch PSD estimate of `signal`.
    pub fn welch(&self, signal: &[f64]) -> Result<Psd, ProcessingError> {
        let n = self.segment_len;
        if signal.len() < n {
            return Err(ProcessingError::WindowTooShort {
                len: signal.len(),
                min: n,
            });
        }

        let bins = n / 2 + 1;
        let mut density = vec![0.0; bins];
        let mut buffer = vec![Complex::new(0.0, 0.0); n];
        let mut segments = 0usize;

        let mut start = 0;
        while start + n <= signal.len() {
            let segment = &signal[start..start + n];
            let mean = segment.iter().sum::<f64>() / n as f64;
            for ((slot, x), w) in buffer.iter_mut().zip(segment).zip(&self.taper) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }
            self.fft.process(&mut buffer);
            for (acc, c) in density.iter_mut().zip(&buffer) {
                *acc += c.norm_sqr();
            }
            segments += 1;
            start += self.hop;
        }

        let norm = self.scale / segments as f64;
        let nyquist_bin = if n % 2 == 0 { Some(bins - 1) } else { None };
        for (k, p) in density.iter_mut().enumerate() {
            *p *= norm;
            if k != 0 && Some(k) != nyquist_bin {
                *p *= 2.0;
            }
        }

        let resolution = self.sample_rate_hz / n as f64;
        let frequencies = (0..bins).map(|k| k as f64 * resolution).collect();

        Ok(Psd {
            frequencies,
            density,
            resolution,
        })
    }

    /// Band-power features of one conditioned window.
    pub fn extract(&self, signal: &[f64]) -> Result<FeatureVector, ProcessingError> {
        let psd = self.welch(signal)?;
        let features = FeatureVector::from_bands(
            psd.band_power(THETA_BAND.0, THETA_BAND.1),
            psd.band_power(ALPHA_BAND.0, ALPHA_BAND.1),
            psd.band_power(BETA_BAND.0, BETA_BAND.1),
            psd.total_power(),
        );
        if !features.is_finite() {
            return Err(ProcessingError::NonFinite { stage: "features" });
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::distributions::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use statrs::distribution::Normal;

    const FS: f64 = 256.0;

    fn sine(freq: f64, amp: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    #[test]
    fn test_alpha_sine_lands_in_alpha_band() {
        let extractor = FeatureExtractor::new(FS, 512);
        let features = extractor.extract(&sine(10.0, 10.0, 512)).unwrap();

        // Mean power of a sine is amp^2 / 2.
        assert!((features.alpha_power - 50.0).abs() < 2.5, "{features:?}");
        assert!(features.theta_power < 0.5);
        assert!(features.beta_power < 0.5);
        assert!((features.total_power - 50.0).abs() < 2.5);
        assert!(features.alpha_beta_ratio > 100.0);
    }

    #[test]
    fn test_white_noise_total_matches_variance() {
        let mut rng = StdRng::seed_from_u64(11);
        let normal = Normal::new(0.0, 3.0).unwrap();
        let noise: Vec<f64> = (0..512).map(|_| normal.sample(&mut rng)).collect();

        let extractor = FeatureExtractor::new(FS, 512);
        let total = extractor.extract(&noise).unwrap().total_power;
        assert!((total / 9.0 - 1.0).abs() < 0.25, "total {total}");
    }

    #[test]
    fn test_zero_theta_gives_finite_ratio() {
        let features = FeatureVector::from_bands(0.0, 5.0, 0.0, 5.0);
        assert!(features.alpha_theta_ratio.is_finite());
        assert!(features.alpha_theta_ratio > 1e9);

        let extractor = FeatureExtractor::new(FS, 512);
        let silent = extractor.extract(&[0.0; 512]).unwrap();
        assert_eq!(silent.alpha_theta_ratio, 0.0);
    }

    #[test]
    fn test_psd_resolution_and_peak() {
        let extractor = FeatureExtractor::new(FS, 512);
        let psd = extractor.welch(&sine(20.0, 1.0, 512)).unwrap();

        assert_eq!(psd.resolution, 2.0);
        assert_eq!(psd.frequencies.len(), 65);
        assert_eq!(psd.peak_frequency(13.0, 30.0), Some(20.0));
    }

    #[test]
    fn test_byte_layout() {
        let features = FeatureVector::from_array([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let bytes = features.to_bytes();
        assert_eq!(&bytes[8..16], &2.0f64.to_le_bytes());
        assert_eq!(FeatureVector::from_bytes(&bytes), Some(features));
        assert_eq!(FeatureVector::from_bytes(&bytes[..40]), None);
    }

    #[test]
    fn test_short_signal_rejected() {
        let extractor = FeatureExtractor::new(FS, 512);
        assert!(matches!(
            extractor.extract(&[0.0; 64]),
            Err(ProcessingError::WindowTooShort { len: 64, min: 128 })
        ));
    }
}
