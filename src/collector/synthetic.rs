//! Physiologically shaped synthetic biosignal generator.
//!
//! Produces one of two identity patterns as an additive composition of
//! band-limited oscillators, 1/f background noise and the usual recording
//! artifacts (eye blinks, muscle bursts, baseline drift). Amplitudes are in
//! microvolts.

use crate::collector::types::{MockMode, Sample};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;
use std::f64::consts::PI;

/// Duration over which a blink waveform is evaluated (seconds).
const BLINK_WINDOW_SECS: f64 = 0.3;
/// Blink peak offset after onset (seconds).
const BLINK_CENTER_SECS: f64 = 0.05;
/// Gaussian width term of the blink pulse (seconds squared).
const BLINK_WIDTH: f64 = 0.002;
const BLINK_AMPLITUDE: f64 = 80.0;

const MUSCLE_BURST_SECS: f64 = 0.15;
const MUSCLE_DECAY_SECS: f64 = 0.05;
const MUSCLE_FREQ_HZ: f64 = 45.0;

/// Per-mode artifact and noise parameters.
#[derive(Debug, Clone, Copy)]
struct ArtifactProfile {
    blink_interval_secs: (f64, f64),
    muscle_probability: f64,
    muscle_amplitude: f64,
    drift_scale: f64,
}

impl ArtifactProfile {
    fn for_mode(mode: MockMode) -> Self {
        match mode {
            MockMode::Authenticated => Self {
                blink_interval_secs: (3.0, 8.0),
                muscle_probability: 0.0005,
                muscle_amplitude: 7.5,
                drift_scale: 1.0,
            },
            // Blinks 2.5x more frequent, muscle tension common and strong.
            MockMode::Impostor => Self {
                blink_interval_secs: (1.2, 3.2),
                muscle_probability: 0.003,
                muscle_amplitude: 37.5,
                drift_scale: 2.0,
            },
        }
    }
}

/// Session-fixed "individual" rhythm parameters.
#[derive(Debug, Clone, Copy)]
struct RhythmProfile {
    alpha_freq: f64,
    alpha_amp: f64,
    theta_freq: f64,
    beta_freq: f64,
    /// Alpha frequency used when imitating someone else
    impostor_alpha_freq: f64,
    phase_offsets: [f64; 5],
}

impl RhythmProfile {
    fn draw(rng: &mut StdRng) -> Self {
        let alpha_freq = rng.gen_range(9.5..11.5);
        let shift = rng.gen_range(1.5..3.0);
        let impostor_alpha_freq = if rng.gen_bool(0.5) {
            alpha_freq - shift
        } else {
            alpha_freq + shift
        };
        let mut phase_offsets = [0.0; 5];
        for phase in phase_offsets.iter_mut() {
            *phase = rng.gen_range(0.0..2.0 * PI);
        }
        Self {
            alpha_freq,
            alpha_amp: rng.gen_range(20.0..30.0),
            theta_freq: rng.gen_range(5.5..7.5),
            beta_freq: rng.gen_range(18.0..25.0),
            impostor_alpha_freq,
            phase_offsets,
        }
    }
}

/// Paul Kellet's economy pink-noise filter: five leaky integrators over
/// white noise whose sum approximates a 1/f spectrum.
#[derive(Debug, Clone, Default)]
pub struct PinkNoise {
    state: [f64; 5],
}

impl PinkNoise {
    const POLES: [f64; 5] = [0.99886, 0.99332, 0.96900, 0.86650, 0.55000];
    const GAINS: [f64; 5] = [0.0555179, 0.0750759, 0.1538520, 0.3104856, 0.5329522];
    const OUTPUT_SCALE: f64 = 0.11;

    /// Filter with all integrators at rest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one white-noise sample and return the next pink sample.
    pub fn next(&mut self, white: f64) -> f64 {
        let mut sum = 0.0;
        for ((s, pole), gain) in self.state.iter_mut().zip(Self::POLES).zip(Self::GAINS) {
            *s = pole * *s + white * gain;
            sum += *s;
        }
        sum * Self::OUTPUT_SCALE
    }

    /// Return every integrator to zero.
    pub fn reset(&mut self) {
        self.state = [0.0; 5];
    }
}

/// Slow random walk with a decaying rate, added as a DC offset.
#[derive(Debug, Clone, Default)]
struct BaselineDrift {
    rate: f64,
    offset: f64,
}

impl BaselineDrift {
    const STEP: f64 = 0.0001;
    const RATE_DECAY: f64 = 0.9995;
    const OFFSET_DECAY: f64 = 0.9999;

    fn next(&mut self, white: f64) -> f64 {
        self.rate += white * Self::STEP;
        self.rate *= Self::RATE_DECAY;
        self.offset += self.rate;
        self.offset *= Self::OFFSET_DECAY;
        self.offset
    }
}

/// Generates synthetic samples at a fixed sample rate.
pub struct SyntheticSource {
    sample_rate_hz: f64,
    mode: MockMode,
    rng: StdRng,
    white: Normal,
    rhythm: RhythmProfile,
    artifacts: ArtifactProfile,
    pink: PinkNoise,
    drift: BaselineDrift,
    sample_index: u64,
    last_blink: Option<f64>,
    next_blink_at: f64,
    blink_count: u64,
    last_muscle: Option<f64>,
}

impl SyntheticSource {
    /// Create a generator seeded from the OS entropy source.
    pub fn new(sample_rate_hz: f64, mode: MockMode) -> Self {
        Self::with_rng(sample_rate_hz, mode, StdRng::from_entropy())
    }

    /// Create a reproducible generator.
    pub fn seeded(sample_rate_hz: f64, mode: MockMode, seed: u64) -> Self {
        Self::with_rng(sample_rate_hz, mode, StdRng::seed_from_u64(seed))
    }

    fn with_rng(sample_rate_hz: f64, mode: MockMode, mut rng: StdRng) -> Self {
        let rhythm = RhythmProfile::draw(&mut rng);
        let artifacts = ArtifactProfile::for_mode(mode);
        let (lo, hi) = artifacts.blink_interval_secs;
        let next_blink_at = rng.gen_range(lo..hi);

        Self {
            sample_rate_hz,
            mode,
            rng,
            white: standard_normal(),
            rhythm,
            artifacts,
            pink: PinkNoise::new(),
            drift: BaselineDrift::default(),
            sample_index: 0,
            last_blink: None,
            next_blink_at,
            blink_count: 0,
            last_muscle: None,
        }
    }

    /// Active identity pattern.
    pub fn mode(&self) -> MockMode {
        self.mode
    }

    /// Switch identity pattern; the individual alpha rhythm is redrawn.
    pub fn set_mode(&mut self, mode: MockMode) {
        self.mode = mode;
        self.artifacts = ArtifactProfile::for_mode(mode);
        self.rhythm.alpha_freq = self.rng.gen_range(9.5..11.5);
        self.rhythm.alpha_amp = self.rng.gen_range(20.0..30.0);
        tracing::info!(mode = %mode, "Synthetic source mode switched");
    }

    /// Restart generator time and artifact state.
    pub fn reset(&mut self) {
        self.sample_index = 0;
        self.pink.reset();
        self.drift = BaselineDrift::default();
        self.last_blink = None;
        self.last_muscle = None;
        self.blink_count = 0;
        let (lo, hi) = self.artifacts.blink_interval_secs;
        self.next_blink_at = self.rng.gen_range(lo..hi);
    }

    /// Number of blink onsets generated so far.
    pub fn blink_count(&self) -> u64 {
        self.blink_count
    }

    /// Individual alpha frequency of the current session (Hz).
    pub fn alpha_frequency(&self) -> f64 {
        self.rhythm.alpha_freq
    }

    /// Generate the next sample on the fixed `n / fs` time grid.
    pub fn next_sample(&mut self) -> Sample {
        let t = self.sample_index as f64 / self.sample_rate_hz;
        self.sample_index += 1;
        let value = match self.mode {
            MockMode::Authenticated => self.authenticated(t),
            MockMode::Impostor => self.impostor(t),
        };
        Sample::new(t, value)
    }

    fn gaussian(&mut self) -> f64 {
        self.white.sample(&mut self.rng)
    }

    fn pink_noise(&mut self) -> f64 {
        let white = self.gaussian() * 0.5;
        self.pink.next(white)
    }

    fn baseline_drift(&mut self) -> f64 {
        let white = self.gaussian();
        self.drift.next(white) * self.artifacts.drift_scale
    }

    fn eye_blink(&mut self, t: f64) -> f64 {
        if t >= self.next_blink_at {
            self.last_blink = Some(t);
            self.blink_count += 1;
            let (lo, hi) = self.artifacts.blink_interval_secs;
            self.next_blink_at = t + self.rng.gen_range(lo..hi);
        }

        match self.last_blink {
            Some(onset) if t - onset < BLINK_WINDOW_SECS => {
                let dt = t - onset - BLINK_CENTER_SECS;
                BLINK_AMPLITUDE * (-(dt * dt) / BLINK_WIDTH).exp()
            }
            _ => 0.0,
        }
    }

    fn muscle_artifact(&mut self, t: f64) -> f64 {
        if self.rng.gen::<f64>() < self.artifacts.muscle_probability {
            self.last_muscle = Some(t);
        }

        match self.last_muscle {
            Some(onset) if t - onset < MUSCLE_BURST_SECS => {
                let since = t - onset;
                self.artifacts.muscle_amplitude
                    * (2.0 * PI * MUSCLE_FREQ_HZ * t).sin()
                    * (-since / MUSCLE_DECAY_SECS).exp()
            }
            _ => 0.0,
        }
    }

    fn authenticated(&mut self, t: f64) -> f64 {
        let r = self.rhythm;
        let phase = r.phase_offsets;

        let delta = 4.0 * (2.0 * PI * 2.5 * t + phase[0]).sin();
        let theta = 12.0 * (2.0 * PI * r.theta_freq * t + phase[1]).sin();
        let alpha = r.alpha_amp * (2.0 * PI * r.alpha_freq * t + phase[2]).sin();
        let beta = 6.0 * (2.0 * PI * r.beta_freq * t + phase[3]).sin();
        let gamma = 2.5 * (2.0 * PI * 35.0 * t + phase[4]).sin();
        // Non-sinusoidal alpha shape.
        let alpha_harmonic = 0.9 * (2.0 * PI * 2.0 * r.alpha_freq * t + phase[2]).sin();

        // Slow alpha blocking/enhancement and theta waxing.
        let alpha_modulation = 1.0 + 0.15 * (2.0 * PI * 0.1 * t).sin();
        let theta_modulation = 1.0 + 0.1 * (2.0 * PI * 0.15 * t + 1.2).sin();

        let background = self.pink_noise() * 3.5;
        let drift = self.baseline_drift();
        let blink = self.eye_blink(t);
        let muscle = self.muscle_artifact(t);

        delta
            + theta * theta_modulation
            + alpha * alpha_modulation
            + alpha_harmonic
            + beta
            + gamma
            + background
            + drift
            + blink
            + muscle
    }

    fn impostor(&mut self, t: f64) -> f64 {
        let alpha_freq = self.rhythm.impostor_alpha_freq;

        // Phase jitter on every component keeps the rhythms irregular.
        let delta = 3.0 * (2.0 * PI * 2.8 * t + self.rng.gen::<f64>() * 0.5).sin();
        let theta_gain = self.rng.gen_range(0.6..1.4);
        let theta = 8.0 * theta_gain * (2.0 * PI * 6.5 * t + self.rng.gen::<f64>() * 0.5).sin();
        let alpha = 10.0 * (2.0 * PI * alpha_freq * t + self.rng.gen::<f64>() * 0.5).sin();
        let beta = 15.0 * (2.0 * PI * 22.0 * t + self.rng.gen::<f64>() * 0.5).sin();
        let gamma = 5.0 * (2.0 * PI * 38.0 * t + self.rng.gen::<f64>() * 0.5).sin();

        let pink = self.pink_noise() * 8.0;
        let white = self.gaussian() * 5.0;
        let drift = self.baseline_drift();
        let blink = self.eye_blink(t);
        let muscle = self.muscle_artifact(t);

        delta + theta + alpha + beta + gamma + pink + white + drift + blink + muscle
    }
}

fn standard_normal() -> Normal {
    match Normal::new(0.0, 1.0) {
        Ok(n) => n,
        Err(_) => unreachable!("unit normal parameters are valid"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_sources_are_reproducible() {
        let mut a = SyntheticSource::seeded(256.0, MockMode::Authenticated, 7);
        let mut b = SyntheticSource::seeded(256.0, MockMode::Authenticated, 7);
        for _ in 0..1000 {
            assert_eq!(a.next_sample(), b.next_sample());
        }
    }

    #[test]
    fn test_timestamps_follow_sample_grid() {
        let mut source = SyntheticSource::seeded(250.0, MockMode::Impostor, 1);
        for n in 0..500 {
            let sample = source.next_sample();
            assert_eq!(sample.timestamp, n as f64 / 250.0);
            assert!(sample.value.is_finite());
        }
    }

    #[test]
    fn test_blink_frequency_per_mode() {
        let fs = 256.0;
        let seconds = 120.0;
        let samples = (fs * seconds) as usize;

        let mut auth = SyntheticSource::seeded(fs, MockMode::Authenticated, 11);
        let mut imp = SyntheticSource::seeded(fs, MockMode::Impostor, 11);
        for _ in 0..samples {
            auth.next_sample();
            imp.next_sample();
        }

        // Inter-blink intervals are bounded, so the counts are too.
        assert!((14..=41).contains(&auth.blink_count()), "{}", auth.blink_count());
        assert!((36..=101).contains(&imp.blink_count()), "{}", imp.blink_count());
        assert!(imp.blink_count() > auth.blink_count());
    }

    #[test]
    fn test_blink_pulse_peaks_after_onset() {
        let fs = 1000.0;
        let mut source = SyntheticSource::seeded(fs, MockMode::Authenticated, 3);
        let first_blink = source.next_blink_at;
        let onset_index = (first_blink * fs).ceil() as u64;

        let mut peak = (0.0_f64, 0.0_f64);
        for n in 0..onset_index + 300 {
            let t = n as f64 / fs;
            let blink = source.eye_blink(t);
            if blink > peak.1 {
                peak = (t, blink);
            }
        }
        let onset = source.last_blink.unwrap();
        assert!((peak.0 - onset - BLINK_CENTER_SECS).abs() < 0.002);
        assert!(peak.1 > 75.0 && peak.1 <= BLINK_AMPLITUDE);
    }

    #[test]
    fn test_pink_noise_is_correlated() {
        let mut rng = StdRng::seed_from_u64(42);
        let normal = standard_normal();
        let mut pink = PinkNoise::new();
        let values: Vec<f64> = (0..20_000).map(|_| pink.next(normal.sample(&mut rng))).collect();

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        let lag1: f64 = values
            .windows(2)
            .map(|w| (w[0] - mean) * (w[1] - mean))
            .sum();
        // White noise would sit near zero.
        assert!(lag1 / var > 0.5);
    }

    #[test]
    fn test_set_mode_redraws_alpha() {
        let mut source = SyntheticSource::seeded(256.0, MockMode::Authenticated, 5);
        source.set_mode(MockMode::Impostor);
        assert_eq!(source.mode(), MockMode::Impostor);
        assert!((9.5..11.5).contains(&source.alpha_frequency()));
    }

    #[test]
    fn test_reset_restarts_time() {
        let mut source = SyntheticSource::seeded(256.0, MockMode::Authenticated, 9);
        for _ in 0..100 {
            source.next_sample();
        }
        source.reset();
        assert_eq!(source.next_sample().timestamp, 0.0);
    }
}
