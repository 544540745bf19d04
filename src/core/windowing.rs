//! Sliding-window buffering of the sample stream.
//!
//! Samples accumulate in a fixed-capacity ring of `W` samples. Once the ring
//! is full, a window is emitted every `S` new samples, so consecutive windows
//! overlap by `W - S` samples.

use crate::collector::types::Sample;
use std::collections::VecDeque;

/// A fixed-length, ordered slice of the sample stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Sequence number of this window within the session (0-based)
    pub index: u64,
    /// Stream index one past the last sample in the window
    pub end_sample: u64,
    /// Samples in stream order
    pub samples: Vec<Sample>,
}

impl Window {
    /// Signal values in time order.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of the first sample.
    pub fn start_time(&self) -> Option<f64> {
        self.samples.first().map(|s| s.timestamp)
    }

    /// Timestamp of the last sample.
    pub fn end_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.timestamp)
    }
}

/// Accumulates samples and emits overlapping windows on a fixed stride.
pub struct SlidingWindowBuffer {
    window_size: usize,
    step_size: usize,
    buffer: VecDeque<Sample>,
    /// Samples pushed since the last emission
    since_emit: usize,
    samples_seen: u64,
    windows_emitted: u64,
}

impl SlidingWindowBuffer {
    /// `0 < step_size < window_size` is enforced by config validation.
    pub fn new(window_size: usize, step_size: usize) -> Self {
        Self {
            window_size,
            step_size,
            buffer: VecDeque::with_capacity(window_size),
            since_emit: 0,
            samples_seen: 0,
            windows_emitted: 0,
        }
    }

    /// Add one sample; returns a window when a stride completes on a full
    /// buffer.
    pub fn push(&mut self, sample: Sample) -> Option<Window> {
        if self.buffer.len() == self.window_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);
        self.samples_seen += 1;
        self.since_emit += 1;

        if self.buffer.len() < self.window_size || self.since_emit < self.step_size {
            return None;
        }

        self.since_emit = 0;
        let window = Window {
            index: self.windows_emitted,
            end_sample: self.samples_seen,
            samples: self.buffer.iter().copied().collect(),
        };
        self.windows_emitted += 1;
        Some(window)
    }

    /// Drop buffered samples, e.g. after switching to a different source.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.since_emit = 0;
    }

    /// Samples per window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples between window emissions.
    pub fn step_size(&self) -> usize {
        self.step_size
    }

    /// Samples currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Windows emitted this session.
    pub fn windows_emitted(&self) -> u64 {
        self.windows_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buffer: &mut SlidingWindowBuffer, count: u64) -> Vec<Window> {
        (0..count)
            .filter_map(|n| buffer.push(Sample::new(n as f64 / 256.0, n as f64)))
            .collect()
    }

    #[test]
    fn test_first_window_when_buffer_fills() {
        let mut buffer = SlidingWindowBuffer::new(512, 128);
        let windows = feed(&mut buffer, 512);

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].end_sample, 512);
        assert_eq!(windows[0].values()[0], 0.0);
    }

    #[test]
    fn test_windows_have_fixed_length_and_stride() {
        let mut buffer = SlidingWindowBuffer::new(512, 128);
        let windows = feed(&mut buffer, 2048);

        for (i, window) in windows.iter().enumerate() {
            assert_eq!(window.len(), 512);
            assert_eq!(window.index, i as u64);
            assert_eq!(window.end_sample, 512 + 128 * i as u64);
            // Time ordered, no gaps.
            let values = window.values();
            assert!(values.windows(2).all(|p| p[1] == p[0] + 1.0));
        }
        // Overlap of W - S samples between neighbours.
        assert_eq!(windows[1].values()[0], windows[0].values()[128]);
    }

    #[test]
    fn test_one_minute_window_count() {
        let mut buffer = SlidingWindowBuffer::new(512, 128);
        let windows = feed(&mut buffer, 60 * 256);

        // floor((15360 - 512) / 128) + 1
        assert_eq!(windows.len(), 117);
        assert_eq!(buffer.windows_emitted(), 117);
    }

    #[test]
    fn test_reset_refills_before_emitting() {
        let mut buffer = SlidingWindowBuffer::new(64, 16);
        feed(&mut buffer, 100);
        buffer.reset();
        assert_eq!(buffer.buffered(), 0);
        assert!(feed(&mut buffer, 63).is_empty());
        assert_eq!(feed(&mut buffer, 1).len(), 1);
    }
}
