//! Mains-notch and band-pass conditioning.
//!
//! All filters are second-order sections in transposed direct form II with
//! bilinear-transform (RBJ cookbook) coefficients. The band-pass is a
//! fourth-order Butterworth high-pass cascaded with a fourth-order
//! Butterworth low-pass, each built from two biquads with the Butterworth
//! pole Q values.
//!
//! Windows are filtered forward and backward (zero phase), so band edges do
//! not shift the alpha/beta peaks in time or frequency.

use crate::core::windowing::Window;
use crate::error::ProcessingError;
use std::f64::consts::PI;

/// Shortest window the conditioner accepts.
pub const MIN_WINDOW_LEN: usize = 16;

/// Q values of the two biquads making up a fourth-order Butterworth stage.
fn butterworth_q(order: usize) -> Vec<f64> {
    (0..order / 2)
        .map(|k| 1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2 * order) as f64).cos()))
        .collect()
}

/// One second-order IIR section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn normalized(b: [f64; 3], a: [f64; 3]) -> Self {
        let a0 = a[0];
        Self {
            b0: b[0] / a0,
            b1: b[1] / a0,
            b2: b[2] / a0,
            a1: a[1] / a0,
            a2: a[2] / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn omega(freq_hz: f64, q: f64, sample_rate_hz: f64) -> (f64, f64) {
        let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
        (w0.cos(), w0.sin() / (2.0 * q))
    }

    /// Band-stop centred on `center_hz` with quality factor `q`.
    pub fn notch(center_hz: f64, q: f64, sample_rate_hz: f64) -> Self {
        let (cos_w, alpha) = Self::omega(center_hz, q, sample_rate_hz);
        Self::normalized(
            [1.0, -2.0 * cos_w, 1.0],
            [1.0 + alpha, -2.0 * cos_w, 1.0 - alpha],
        )
    }

    /// Second-order low-pass section.
    pub fn lowpass(cutoff_hz: f64, q: f64, sample_rate_hz: f64) -> Self {
        let (cos_w, alpha) = Self::omega(cutoff_hz, q, sample_rate_hz);
        let b = (1.0 - cos_w) / 2.0;
        Self::normalized(
            [b, 1.0 - cos_w, b],
            [1.0 + alpha, -2.0 * cos_w, 1.0 - alpha],
        )
    }

    /// Second-order high-pass section.
    pub fn highpass(cutoff_hz: f64, q: f64, sample_rate_hz: f64) -> Self {
        let (cos_w, alpha) = Self::omega(cutoff_hz, q, sample_rate_hz);
        let b = (1.0 + cos_w) / 2.0;
        Self::normalized(
            [b, -(1.0 + cos_w), b],
            [1.0 + alpha, -2.0 * cos_w, 1.0 - alpha],
        )
    }

    /// Gain at DC.
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Magnitude response at `freq_hz`.
    pub fn magnitude(&self, freq_hz: f64, sample_rate_hz: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / sample_rate_hz;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }

    /// Filter one value (transposed direct form II).
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    /// Load the steady state for a constant input `x`; returns the output.
    pub fn prime(&mut self, x: f64) -> f64 {
        let y = x * self.dc_gain();
        self.z1 = (self.b1 + self.b2) * x - (self.a1 + self.a2) * y;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    /// Clear the delay line.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Notch followed by band-pass, applied to whole windows.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    sample_rate_hz: f64,
    stages: Vec<Biquad>,
}

impl SignalConditioner {
    /// Frequencies must already be validated to lie inside `(0, fs / 2)`.
    pub fn new(
        sample_rate_hz: f64,
        notch_hz: f64,
        notch_q: f64,
        low_hz: f64,
        high_hz: f64,
    ) -> Self {
        let mut stages = vec![Biquad::notch(notch_hz, notch_q, sample_rate_hz)];
        let qs = butterworth_q(4);
        stages.extend(qs.iter().map(|&q| Biquad::highpass(low_hz, q, sample_rate_hz)));
        stages.extend(qs.iter().map(|&q| Biquad::lowpass(high_hz, q, sample_rate_hz)));
        Self {
            sample_rate_hz,
            stages,
        }
    }

    /// Combined single-pass magnitude response at `freq_hz`.
    pub fn magnitude(&self, freq_hz: f64) -> f64 {
        self.stages
            .iter()
            .map(|s| s.magnitude(freq_hz, self.sample_rate_hz))
            .product()
    }

    /// Clear all filter state. Called once at session start.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    fn prime(&mut self, x: f64) {
        let mut level = x;
        for stage in &mut self.stages {
            level = stage.prime(level);
        }
    }

    fn run(&mut self, input: &mut [f64]) {
        for v in input.iter_mut() {
            let mut y = *v;
            for stage in &mut self.stages {
                y = stage.process(y);
            }
            *v = y;
        }
    }

    /// Zero-phase filter one window.
    ///
    /// The window is padded with its odd reflection at both ends, filtered
    /// forward and backward with steady-state initial conditions, and the
    /// padding is stripped again. Output length equals window length.
    pub fn condition(&mut self, window: &Window) -> Result<Vec<f64>, ProcessingError> {
        self.condition_values(&window.values())
    }

    /// Zero-phase filter a raw value slice. Output has the input length.
    pub fn condition_values(&mut self, values: &[f64]) -> Result<Vec<f64>, ProcessingError> {
        let n = values.len();
        if n < MIN_WINDOW_LEN {
            return Err(ProcessingError::WindowTooShort {
                len: n,
                min: MIN_WINDOW_LEN,
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ProcessingError::NonFinite { stage: "input" });
        }

        let pad = (3 * (2 * self.stages.len() + 1)).min(n - 1);
        let first = values[0];
        let last = values[n - 1];

        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - values[i]));
        ext.extend_from_slice(values);
        ext.extend((1..=pad).map(|i| 2.0 * last - values[n - 1 - i]));

        self.prime(ext[0]);
        self.run(&mut ext);

        ext.reverse();
        self.prime(ext[0]);
        self.run(&mut ext);
        ext.reverse();

        let out = ext[pad..pad + n].to_vec();
        if out.iter().any(|v| !v.is_finite()) {
            return Err(ProcessingError::NonFinite {
                stage: "conditioning",
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::statistics::Statistics;

    const FS: f64 = 256.0;

    fn conditioner() -> SignalConditioner {
        SignalConditioner::new(FS, 50.0, 30.0, 5.0, 30.0)
    }

    fn sine(freq: f64, amp: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    fn middle_rms(x: &[f64]) -> f64 {
        x[128..384].quadratic_mean()
    }

    #[test]
    fn test_butterworth_q_values() {
        let qs = butterworth_q(4);
        assert!((qs[0] - 0.5412).abs() < 1e-3);
        assert!((qs[1] - 1.3066).abs() < 1e-3);
    }

    #[test]
    fn test_notch_response() {
        let notch = Biquad::notch(50.0, 30.0, FS);
        assert!(notch.magnitude(50.0, FS) < 1e-6);
        assert!((notch.magnitude(10.0, FS) - 1.0).abs() < 0.01);
        assert!((notch.dc_gain() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mains_interference_suppressed() {
        let mut cond = conditioner();
        let input = sine(50.0, 100.0, 512);
        let output = cond.condition_values(&input).unwrap();
        assert!(middle_rms(&output) < 0.01 * middle_rms(&input));
    }

    #[test]
    fn test_alpha_band_passes() {
        let mut cond = conditioner();
        let input = sine(10.0, 20.0, 512);
        let output = cond.condition_values(&input).unwrap();
        let ratio = middle_rms(&output) / middle_rms(&input);
        assert!((0.9..1.1).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn test_dc_offset_removed() {
        let mut cond = conditioner();
        let output = cond.condition_values(&vec![250.0; 512]).unwrap();
        assert!(output.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_output_length_matches_window() {
        let mut cond = conditioner();
        let output = cond.condition_values(&sine(12.0, 5.0, 40)).unwrap();
        assert_eq!(output.len(), 40);
    }

    #[test]
    fn test_rejects_bad_windows() {
        let mut cond = conditioner();
        assert!(matches!(
            cond.condition_values(&[1.0; 8]),
            Err(ProcessingError::WindowTooShort { len: 8, .. })
        ));

        let mut input = sine(10.0, 1.0, 64);
        input[10] = f64::NAN;
        assert!(matches!(
            cond.condition_values(&input),
            Err(ProcessingError::NonFinite { stage: "input" })
        ));
    }

    #[test]
    fn test_passband_response() {
        let cond = conditioner();
        assert!(cond.magnitude(10.0) > 0.95);
        assert!(cond.magnitude(1.0) < 0.01);
        assert!(cond.magnitude(60.0) < 0.1);
    }
}
