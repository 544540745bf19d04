//! Hardware connection lifecycle.
//!
//! ```text
//!   Idle ──start──▶ Connecting ──ok──▶ Connected
//!                     ▲   │               │
//!                     │   │ fail,backoff  │ read failure
//!                     │   ▼               │
//!                     └───┘◀──────────────┘
//!                         │ attempts >= max
//!                         ▼
//!                      Degraded (one-way)
//! ```

use crate::collector::hardware::{Connector, HardwareSource};
use crate::collector::timing::SharedClock;
use crate::collector::types::Sample;
use crate::error::AcquisitionError;
use crate::session::control::StopToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Upper bound on a single backoff wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Granularity at which a backoff wait checks for a stop request.
const BACKOFF_SLICE: Duration = Duration::from_millis(250);

/// Hardware connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not started
    Idle,
    /// Opening the device or waiting out a backoff
    Connecting,
    /// Stream open
    Connected,
    /// Hardware abandoned for the rest of the session
    Degraded,
}

impl ConnectionState {
    fn slot(self) -> usize {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Degraded => 3,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// Backoff before the next attempt, after `attempts` consecutive failures.
pub fn backoff_delay(attempts: u32) -> Duration {
    if attempts >= 5 {
        return MAX_BACKOFF;
    }
    Duration::from_secs(1u64 << attempts).min(MAX_BACKOFF)
}

/// Drives a [`Connector`] through connect, read and retry.
///
/// The failure counter is reset only when a fresh connection delivers its
/// first sample. A link that opens but dies before producing data counts as
/// a failed attempt, so a flapping device still ends in `Degraded`.
pub struct ReconnectionSupervisor {
    connector: Box<dyn Connector>,
    source: Option<HardwareSource>,
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    verified: bool,
    clock: SharedClock,
    stop: StopToken,
    entered: [u64; 4],
    parse_errors: u64,
}

impl ReconnectionSupervisor {
    /// `max_attempts` is clamped to at least one.
    pub fn new(
        connector: Box<dyn Connector>,
        max_attempts: u32,
        clock: SharedClock,
        stop: StopToken,
    ) -> Self {
        let mut entered = [0; 4];
        entered[ConnectionState::Idle.slot()] = 1;
        Self {
            connector,
            source: None,
            state: ConnectionState::Idle,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            verified: false,
            clock,
            stop,
            entered,
            parse_errors: 0,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts in the current connecting cycle.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of times `state` has been entered.
    pub fn times_entered(&self, state: ConnectionState) -> u64 {
        self.entered[state.slot()]
    }

    /// Endpoint description from the connector.
    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    /// Malformed lines skipped since the last call, across connections.
    pub fn take_parse_errors(&mut self) -> u64 {
        let live = self
            .source
            .as_mut()
            .map(HardwareSource::take_parse_errors)
            .unwrap_or(0);
        std::mem::take(&mut self.parse_errors) + live
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "Connection state change");
        self.state = next;
        self.entered[next.slot()] += 1;
    }

    /// Leave `Idle`. Called implicitly by the first [`pull`](Self::pull).
    pub fn start(&mut self) {
        if self.state == ConnectionState::Idle {
            tracing::info!(endpoint = %self.connector.endpoint(), "Connecting to device");
            self.transition(ConnectionState::Connecting);
        }
    }

    /// Pull the next hardware sample, connecting and retrying as needed.
    ///
    /// Returns `ExhaustedRetries` once the supervisor has degraded, and
    /// `Cancelled` if a stop is requested while connecting or backing off.
    /// A connected but silent device yields `NoData` after each read timeout
    /// so the caller can check for a stop.
    pub fn pull(&mut self) -> Result<Sample, AcquisitionError> {
        loop {
            if self.stop.is_stop_requested() {
                return Err(AcquisitionError::Cancelled);
            }

            match self.state {
                ConnectionState::Degraded => {
                    return Err(AcquisitionError::ExhaustedRetries {
                        attempts: self.attempts,
                    });
                }
                ConnectionState::Idle => self.start(),
                ConnectionState::Connecting => self.try_connect()?,
                ConnectionState::Connected => {
                    let Some(source) = self.source.as_mut() else {
                        self.transition(ConnectionState::Connecting);
                        continue;
                    };
                    match source.pull_sample() {
                        Ok(sample) => {
                            if !self.verified {
                                self.verified = true;
                                self.attempts = 0;
                            }
                            return Ok(sample);
                        }
                        Err(AcquisitionError::NoData) => return Err(AcquisitionError::NoData),
                        Err(e) => {
                            tracing::warn!(error = %e, "Device read failed");
                            self.drop_connection();
                            if !self.verified {
                                self.record_failure()?;
                            }
                            self.transition(ConnectionState::Connecting);
                        }
                    }
                }
            }
        }
    }

    fn try_connect(&mut self) -> Result<(), AcquisitionError> {
        match self.connector.connect() {
            Ok(reader) => {
                tracing::info!(endpoint = %self.connector.endpoint(), "Device connected");
                self.source = Some(HardwareSource::new(reader));
                self.verified = false;
                self.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt = self.attempts + 1,
                    max = self.max_attempts,
                    "Device connection failed"
                );
                self.record_failure()
            }
        }
    }

    /// Count a failed attempt, then either degrade or wait out the backoff.
    fn record_failure(&mut self) -> Result<(), AcquisitionError> {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            tracing::error!(
                attempts = self.attempts,
                "Hardware unavailable, falling back to synthetic source"
            );
            self.transition(ConnectionState::Degraded);
            return Err(AcquisitionError::ExhaustedRetries {
                attempts: self.attempts,
            });
        }

        let delay = backoff_delay(self.attempts);
        tracing::info!(delay_secs = delay.as_secs(), "Retrying device connection");
        self.wait(delay)
    }

    fn wait(&self, delay: Duration) -> Result<(), AcquisitionError> {
        let mut remaining = delay;
        while !remaining.is_zero() {
            if self.stop.is_stop_requested() {
                return Err(AcquisitionError::Cancelled);
            }
            let slice = remaining.min(BACKOFF_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
        Ok(())
    }

    fn drop_connection(&mut self) {
        if let Some(mut source) = self.source.take() {
            tracing::debug!(samples = source.samples_read(), "Device connection closed");
            self.parse_errors += source.take_parse_errors();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::timing::{Clock, SimulatedClock};
    use std::collections::VecDeque;
    use std::io::{BufRead, Cursor};
    use std::sync::Arc;

    /// Scripted connector: `Some(text)` opens a stream with that content,
    /// `None` fails. Once the script runs out, every attempt fails.
    struct ScriptedConnector {
        script: VecDeque<Option<&'static str>>,
        calls: Arc<std::sync::atomic::AtomicU32>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Option<&'static str>>) -> (Self, Arc<std::sync::atomic::AtomicU32>) {
            let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
            (
                Self {
                    script: script.into(),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&mut self) -> Result<Box<dyn BufRead + Send>, AcquisitionError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            match self.script.pop_front().flatten() {
                Some(text) => Ok(Box::new(Cursor::new(text.as_bytes().to_vec()))),
                None => Err(AcquisitionError::Connection("no device".into())),
            }
        }

        fn endpoint(&self) -> String {
            "scripted".into()
        }
    }

    fn supervisor(
        script: Vec<Option<&'static str>>,
        max: u32,
    ) -> (ReconnectionSupervisor, Arc<SimulatedClock>, Arc<std::sync::atomic::AtomicU32>) {
        let clock = Arc::new(SimulatedClock::new());
        let (connector, calls) = ScriptedConnector::new(script);
        let sup = ReconnectionSupervisor::new(
            Box::new(connector),
            max,
            clock.clone(),
            StopToken::new(),
        );
        (sup, clock, calls)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let delays: Vec<u64> = (1..=7).map(|n| backoff_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30, 30]);
        assert_eq!(backoff_delay(40), MAX_BACKOFF);
    }

    #[test]
    fn test_degrades_after_exactly_max_attempts() {
        let (mut sup, clock, calls) = supervisor(vec![], 10);

        let err = sup.pull().unwrap_err();
        assert!(matches!(err, AcquisitionError::ExhaustedRetries { attempts: 10 }));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 10);
        assert_eq!(sup.state(), ConnectionState::Degraded);
        assert_eq!(sup.times_entered(ConnectionState::Degraded), 1);

        // Backoff after failures 1..=9; none after the final one.
        let expected: u64 = (1..=9).map(|n| backoff_delay(n).as_secs()).sum();
        assert_eq!(clock.total_slept(), Duration::from_secs(expected));

        // Degraded is terminal: no further connection attempts.
        assert!(sup.pull().is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 10);
        assert_eq!(sup.times_entered(ConnectionState::Degraded), 1);
    }

    #[test]
    fn test_connects_after_transient_failures() {
        let (mut sup, _clock, _) = supervisor(vec![None, None, Some("0,1,5.0\n4,1,6.0\n")], 10);

        assert_eq!(sup.pull().unwrap().value, 5.0);
        assert_eq!(sup.state(), ConnectionState::Connected);
        assert_eq!(sup.attempts(), 0);
        assert_eq!(sup.pull().unwrap().value, 6.0);
    }

    #[test]
    fn test_read_failure_returns_to_connecting() {
        let (mut sup, _clock, _) = supervisor(vec![Some("0,1,1.0\n"), Some("4,1,2.0\n")], 10);

        assert_eq!(sup.pull().unwrap().value, 1.0);
        // First stream hits EOF; the supervisor reconnects transparently.
        assert_eq!(sup.pull().unwrap().value, 2.0);
        assert_eq!(sup.times_entered(ConnectionState::Connecting), 2);
        assert_eq!(sup.times_entered(ConnectionState::Connected), 2);
    }

    #[test]
    fn test_link_without_data_counts_as_failure() {
        // Every connection opens but closes before sending a sample.
        let script = vec![Some(""); 20];
        let (mut sup, _clock, calls) = supervisor(script, 4);

        assert!(matches!(
            sup.pull(),
            Err(AcquisitionError::ExhaustedRetries { attempts: 4 })
        ));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[test]
    fn test_stop_cancels_backoff() {
        let clock = Arc::new(SimulatedClock::new());
        let (connector, _) = ScriptedConnector::new(vec![]);
        let stop = StopToken::new();
        let mut sup = ReconnectionSupervisor::new(Box::new(connector), 10, clock.clone(), stop.clone());
        stop.request_stop();

        assert!(matches!(sup.pull(), Err(AcquisitionError::Cancelled)));
        assert_eq!(clock.now(), Duration::ZERO);
        assert_ne!(sup.state(), ConnectionState::Degraded);
    }

    #[test]
    fn test_parse_errors_survive_reconnect() {
        let (mut sup, _clock, _) =
            supervisor(vec![Some("0,1,1.0\nbad\n"), Some("4,1,2.0\n")], 10);

        sup.pull().unwrap();
        sup.pull().unwrap();
        assert_eq!(sup.take_parse_errors(), 1);
        assert_eq!(sup.take_parse_errors(), 0);
    }
}
