//! Core signal processing for the CortexKey agent.
//!
//! This module contains:
//! - Sliding-window buffering of the sample stream
//! - Notch and band-pass conditioning
//! - Welch band-power feature extraction
//! - Signal quality grading
//! - Signature encryption and output records
//! - The control loop tying them together

pub mod features;
pub mod filters;
pub mod pipeline;
pub mod quality;
pub mod record;
pub mod signature;
pub mod windowing;

// Re-export commonly used types
pub use features::{FeatureExtractor, FeatureVector};
pub use filters::{Biquad, SignalConditioner};
pub use pipeline::{Pipeline, PipelineContext, StepOutcome};
pub use quality::{QualityLabel, QualityMonitor, QualityReport};
pub use record::{
    ChannelSink, ConsoleSink, FileSink, OutputFormat, PipelineEvent, RecordSink, SignatureRecord,
};
pub use signature::{derive_key, encrypt, verify, Passphrase, Signature, SignatureCipher};
pub use windowing::{SlidingWindowBuffer, Window};
