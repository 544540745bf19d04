//! Drift-corrected sample pacing.
//!
//! Tick `n` is scheduled at `start + n / fs`, computed from the immutable
//! start time and the tick index. Sleep overshoot therefore never
//! accumulates: each tick is at most one sleep-overshoot late, no matter how
//! long the session runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking wait.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;

    /// Block the caller for (at least) `duration`.
    fn sleep(&self, duration: Duration);
}

/// Clock handle shared between the timing controller and the supervisor.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock implementation backed by [`Instant`].
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// A new system clock behind a [`SharedClock`] handle.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for tests and offline runs.
///
/// `sleep` advances time instantly, plus a configurable overshoot that
/// models OS scheduler latency.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    nanos: AtomicU64,
    sleep_overshoot_nanos: u64,
    slept_nanos: AtomicU64,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `sleep` advances time by an extra `overshoot`, like a loaded scheduler.
    pub fn with_sleep_overshoot(overshoot: Duration) -> Self {
        Self {
            sleep_overshoot_nanos: overshoot.as_nanos() as u64,
            ..Self::default()
        }
    }

    /// Move time forward without sleeping (models processing work).
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Total time requested through `sleep`.
    pub fn total_slept(&self) -> Duration {
        Duration::from_nanos(self.slept_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        let requested = duration.as_nanos() as u64;
        self.slept_nanos.fetch_add(requested, Ordering::SeqCst);
        self.nanos
            .fetch_add(requested + self.sleep_overshoot_nanos, Ordering::SeqCst);
    }
}

/// One fired tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Tick number since the last restart
    pub index: u64,
    /// Scheduled time relative to the controller start
    pub target: Duration,
    /// Observed time relative to the controller start
    pub fired_at: Duration,
}

impl Tick {
    /// Session time of this tick in seconds.
    pub fn seconds(&self) -> f64 {
        self.target.as_secs_f64()
    }

    /// How far past its schedule the tick fired.
    pub fn lateness(&self) -> Duration {
        self.fired_at.saturating_sub(self.target)
    }
}

/// Observed pacing jitter, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JitterStats {
    /// Ticks fired since the last restart
    pub ticks: u64,
    /// Worst observed lateness
    pub max_lateness: Duration,
    /// Average lateness over all ticks
    pub mean_lateness: Duration,
    /// Times the schedule was re-anchored after falling a full period behind
    pub resyncs: u64,
}

/// Produces ticks at a fixed rate using absolute scheduling.
pub struct TimingController {
    clock: SharedClock,
    sample_rate_hz: f64,
    period: Duration,
    /// Clock reading that tick 0 is anchored to
    start: Duration,
    /// Ticks fired since the anchor was last moved
    anchor_index: u64,
    next_index: u64,
    total_lateness: Duration,
    max_lateness: Duration,
    resyncs: u64,
}

impl TimingController {
    /// Create a controller anchored at the clock's current time.
    ///
    /// `sample_rate_hz` must be positive; configuration validation enforces it.
    pub fn new(sample_rate_hz: f64, clock: SharedClock) -> Self {
        let start = clock.now();
        Self {
            clock,
            sample_rate_hz,
            period: Duration::from_secs_f64(1.0 / sample_rate_hz),
            start,
            anchor_index: 0,
            next_index: 0,
            total_lateness: Duration::ZERO,
            max_lateness: Duration::ZERO,
            resyncs: 0,
        }
    }

    /// Re-anchor the schedule at the current time and restart tick numbering.
    pub fn restart(&mut self) {
        self.start = self.clock.now();
        self.anchor_index = 0;
        self.next_index = 0;
        self.total_lateness = Duration::ZERO;
        self.max_lateness = Duration::ZERO;
        self.resyncs = 0;
    }

    /// Index of the next tick to fire.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    fn target_for(&self, index: u64) -> Duration {
        let offset = (index - self.anchor_index) as f64 / self.sample_rate_hz;
        self.start + Duration::from_secs_f64(offset)
    }

    /// Block until the next tick is due and return it.
    ///
    /// A tick that is already due fires immediately; ticks are never fired
    /// back-to-back to catch up. If the caller has fallen more than one
    /// period behind, the schedule is re-anchored at the current time.
    pub fn wait_next_tick(&mut self) -> Tick {
        let index = self.next_index;
        let mut target = self.target_for(index);
        let now = self.clock.now();

        if now < target {
            self.clock.sleep(target - now);
        } else if now - target > self.period {
            tracing::debug!(
                behind_ms = (now - target).as_secs_f64() * 1000.0,
                "Pacing fell behind, re-anchoring schedule"
            );
            self.start = now;
            self.anchor_index = index;
            self.resyncs += 1;
            target = now;
        }

        let fired = self.clock.now();
        let lateness = fired.saturating_sub(target);
        self.total_lateness += lateness;
        self.max_lateness = self.max_lateness.max(lateness);
        self.next_index += 1;

        Tick {
            index,
            target: target.saturating_sub(self.start) + self.anchor_offset(),
            fired_at: fired.saturating_sub(self.start) + self.anchor_offset(),
        }
    }

    /// Schedule offset of the current anchor relative to tick 0.
    fn anchor_offset(&self) -> Duration {
        Duration::from_secs_f64(self.anchor_index as f64 / self.sample_rate_hz)
    }

    /// Lateness statistics since the last restart.
    pub fn jitter(&self) -> JitterStats {
        let mean_lateness = if self.next_index == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.total_lateness.as_secs_f64() / self.next_index as f64)
        };
        JitterStats {
            ticks: self.next_index,
            max_lateness: self.max_lateness,
            mean_lateness,
            resyncs: self.resyncs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_never_fire_early() {
        let clock = Arc::new(SimulatedClock::new());
        let mut timing = TimingController::new(256.0, clock.clone());

        for n in 0..1000u64 {
            let tick = timing.wait_next_tick();
            assert_eq!(tick.index, n);
            let expected = Duration::from_secs_f64(n as f64 / 256.0);
            assert!(clock.now() >= expected);
        }
    }

    #[test]
    fn test_one_hour_drift_is_bounded() {
        let fs = 256.0;
        let overshoot = Duration::from_micros(200);
        let work = Duration::from_micros(150);
        let ticks = 3600 * 256u64;

        let clock = Arc::new(SimulatedClock::with_sleep_overshoot(overshoot));
        let mut timing = TimingController::new(fs, clock.clone());
        let mut last = None;
        for _ in 0..ticks {
            clock.advance(work);
            last = Some(timing.wait_next_tick());
        }

        let last = last.unwrap();
        let scheduled = Duration::from_secs_f64((ticks - 1) as f64 / fs);
        let error = clock.now().saturating_sub(scheduled);
        assert!(error < Duration::from_millis(5), "drift {error:?}");
        assert_eq!(timing.jitter().resyncs, 0);
        assert!(last.lateness() <= overshoot + Duration::from_micros(1));

        // Relative sleeping accumulates every overshoot and every bit of work.
        let naive = SimulatedClock::with_sleep_overshoot(overshoot);
        let period = Duration::from_secs_f64(1.0 / fs);
        for _ in 0..ticks {
            naive.advance(work);
            naive.sleep(period);
        }
        let naive_error = naive.now().saturating_sub(scheduled);
        assert!(naive_error > Duration::from_secs(1));
    }

    #[test]
    fn test_late_tick_fires_immediately_without_burst() {
        let clock = Arc::new(SimulatedClock::new());
        let mut timing = TimingController::new(100.0, clock.clone());
        timing.wait_next_tick();

        // Stall for 50 periods.
        clock.advance(Duration::from_millis(500));
        let before = clock.now();
        let late = timing.wait_next_tick();
        assert_eq!(clock.now(), before, "late tick must not sleep");
        assert_eq!(timing.jitter().resyncs, 1);

        // The following tick is a full period later, not back-to-back.
        let next = timing.wait_next_tick();
        assert!(next.target - late.target >= Duration::from_millis(9));
        assert!(clock.now() - before >= Duration::from_millis(9));
    }

    #[test]
    fn test_small_lateness_keeps_schedule() {
        let clock = Arc::new(SimulatedClock::new());
        let mut timing = TimingController::new(100.0, clock.clone());
        timing.wait_next_tick();
        clock.advance(Duration::from_millis(15));
        timing.wait_next_tick();
        let third = timing.wait_next_tick();

        assert_eq!(timing.jitter().resyncs, 0);
        assert_eq!(third.target, Duration::from_millis(20));
    }

    #[test]
    fn test_restart_resets_numbering() {
        let clock = Arc::new(SimulatedClock::new());
        let mut timing = TimingController::new(10.0, clock.clone());
        for _ in 0..5 {
            timing.wait_next_tick();
        }
        timing.restart();
        assert_eq!(timing.next_index(), 0);
        assert_eq!(timing.wait_next_tick().index, 0);
    }
}
