//! Sample source facade.
//!
//! Hides whether samples come from the device or from the synthetic
//! generator. When the supervisor gives up on hardware the facade swaps in
//! the synthetic fallback for the rest of the session.

use crate::collector::hardware::{Connector, SerialConnector};
use crate::collector::supervisor::{ConnectionState, ReconnectionSupervisor};
use crate::collector::synthetic::SyntheticSource;
use crate::collector::timing::SharedClock;
use crate::collector::types::{MockMode, Sample, SourceMode};
use crate::config::Config;
use crate::error::AcquisitionError;
use crate::session::control::StopToken;

/// Anything that can hand out samples one at a time.
pub trait SampleProvider {
    fn pull_sample(&mut self) -> Result<Sample, AcquisitionError>;

    fn mode(&self) -> SourceMode;

    /// Whether the caller has to pace pulls to real time.
    ///
    /// Hardware is paced by the device itself.
    fn is_paced(&self) -> bool {
        self.mode() == SourceMode::Mock
    }
}

impl SampleProvider for SyntheticSource {
    fn pull_sample(&mut self) -> Result<Sample, AcquisitionError> {
        Ok(self.next_sample())
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Mock
    }
}

impl SampleProvider for ReconnectionSupervisor {
    fn pull_sample(&mut self) -> Result<Sample, AcquisitionError> {
        self.pull()
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Hardware
    }
}

enum Active {
    Synthetic(SyntheticSource),
    Hardware {
        supervisor: ReconnectionSupervisor,
        fallback: SyntheticSource,
    },
    /// Hardware was abandoned; the supervisor is kept for its final state.
    Degraded {
        supervisor: ReconnectionSupervisor,
        synthetic: SyntheticSource,
    },
}

/// The single place the control loop pulls samples from.
pub struct SampleSource {
    active: Option<Active>,
}

impl SampleSource {
    /// Synthetic-only session.
    pub fn synthetic(source: SyntheticSource) -> Self {
        Self {
            active: Some(Active::Synthetic(source)),
        }
    }

    /// Hardware source with a synthetic generator held in reserve.
    pub fn hardware(supervisor: ReconnectionSupervisor, fallback: SyntheticSource) -> Self {
        Self {
            active: Some(Active::Hardware {
                supervisor,
                fallback,
            }),
        }
    }

    /// Build the source described by the configuration.
    ///
    /// Without a device path, or with `force_mock`, the session is synthetic
    /// from the start.
    pub fn from_config(config: &Config, clock: SharedClock, stop: StopToken) -> Self {
        let synthetic = SyntheticSource::new(config.sample_rate_hz, config.mock_mode);
        match (&config.device_path, config.force_mock) {
            (Some(path), false) => {
                let connector: Box<dyn Connector> = Box::new(SerialConnector::new(
                    path.to_string_lossy(),
                    config.baud_rate,
                ));
                let supervisor = ReconnectionSupervisor::new(
                    connector,
                    config.max_reconnect_attempts,
                    clock,
                    stop,
                );
                Self::hardware(supervisor, synthetic)
            }
            _ => Self::synthetic(synthetic),
        }
    }

    /// Pull the next sample.
    ///
    /// When hardware is abandoned this returns `ExhaustedRetries` exactly
    /// once; every later call is served by the synthetic fallback.
    pub fn pull_sample(&mut self) -> Result<Sample, AcquisitionError> {
        let result = match self.active.as_mut() {
            Some(Active::Synthetic(source)) => return source.pull_sample(),
            Some(Active::Degraded { synthetic, .. }) => return synthetic.pull_sample(),
            Some(Active::Hardware { supervisor, .. }) => supervisor.pull_sample(),
            None => return Err(AcquisitionError::Disconnected),
        };

        if let Err(AcquisitionError::ExhaustedRetries { .. }) = &result {
            self.degrade();
        }
        result
    }

    fn degrade(&mut self) {
        self.active = match self.active.take() {
            Some(Active::Hardware {
                supervisor,
                fallback: synthetic,
            }) => {
                tracing::info!(mode = %synthetic.mode(), "Synthetic fallback engaged");
                Some(Active::Degraded {
                    supervisor,
                    synthetic,
                })
            }
            other => other,
        };
    }

    /// Mode of the source currently serving samples.
    pub fn mode(&self) -> SourceMode {
        match &self.active {
            Some(Active::Hardware { .. }) => SourceMode::Hardware,
            _ => SourceMode::Mock,
        }
    }

    /// Whether the control loop must pace pulls with the timing controller.
    pub fn is_paced(&self) -> bool {
        match &self.active {
            Some(Active::Synthetic(s)) => s.is_paced(),
            Some(Active::Hardware { supervisor, .. }) => supervisor.is_paced(),
            Some(Active::Degraded { synthetic, .. }) => synthetic.is_paced(),
            None => false,
        }
    }

    /// Hardware connection state, if this session ever used hardware.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        match &self.active {
            Some(Active::Hardware { supervisor, .. })
            | Some(Active::Degraded { supervisor, .. }) => Some(supervisor.state()),
            _ => None,
        }
    }

    /// Malformed device lines skipped since the last call.
    pub fn take_parse_errors(&mut self) -> u64 {
        match self.active.as_mut() {
            Some(Active::Hardware { supervisor, .. })
            | Some(Active::Degraded { supervisor, .. }) => supervisor.take_parse_errors(),
            _ => 0,
        }
    }

    /// Switch the synthetic identity pattern (current or fallback generator).
    pub fn set_mock_mode(&mut self, mode: MockMode) {
        match self.active.as_mut() {
            Some(Active::Synthetic(s))
            | Some(Active::Degraded { synthetic: s, .. })
            | Some(Active::Hardware { fallback: s, .. }) => s.set_mode(mode),
            None => {}
        }
    }

    /// Identity pattern of the synthetic generator.
    pub fn mock_mode(&self) -> Option<MockMode> {
        match &self.active {
            Some(Active::Synthetic(s))
            | Some(Active::Degraded { synthetic: s, .. })
            | Some(Active::Hardware { fallback: s, .. }) => Some(s.mode()),
            None => None,
        }
    }
}
