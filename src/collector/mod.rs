//! Sample acquisition for the CortexKey agent.
//!
//! This module provides the two sample sources (the device wire protocol and
//! the synthetic generator), the reconnection supervisor that arbitrates
//! between them, and the drift-corrected pacing used for synthetic data.

pub mod hardware;
pub mod source;
pub mod supervisor;
pub mod synthetic;
pub mod timing;
pub mod types;

// Re-export commonly used types
pub use hardware::{parse_line, Connector, HardwareSource, SerialConnector, WireLine};
pub use source::{SampleProvider, SampleSource};
pub use supervisor::{ConnectionState, ReconnectionSupervisor};
pub use synthetic::SyntheticSource;
pub use timing::{Clock, JitterStats, SharedClock, SimulatedClock, SystemClock, TimingController};
pub use types::{MockMode, Sample, SourceMode};
