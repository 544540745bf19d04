//! CortexKey Agent - encrypted neural signatures from a single biosignal channel.
//!
//! This library acquires a single-channel EEG-like signal, either from an
//! acquisition board speaking a simple line protocol or from a synthetic
//! generator, and turns every overlapping analysis window into an encrypted
//! band-power signature.
//!
//! # Data Handling Guarantees
//!
//! - **No plaintext features**: Feature vectors exist only in memory, between
//!   extraction and encryption
//! - **No raw storage**: Raw samples are discarded once they leave the window
//! - **Passphrase stays secret**: It is never logged and never written to disk
//! - **Fresh salt and nonce**: Every signature is sealed under its own key
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          CortexKey Agent                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐    ┌────────────┐    ┌────────────┐              │
//! │  │  Hardware  │───▶│ Reconnect  │───▶│   Sample   │◀── Timing    │
//! │  │ (serial)   │    │ Supervisor │    │   Source   │   (synthetic)│
//! │  └────────────┘    └────────────┘    └─────┬──────┘              │
//! │  ┌────────────┐   fallback ──────────────▶ │                     │
//! │  │ Synthetic  │────────────────────────────┘                     │
//! │  └────────────┘                            ▼                     │
//! │  ┌────────────┐    ┌────────────┐    ┌────────────┐              │
//! │  │  Sliding   │───▶│ Notch +    │───▶│   Welch    │              │
//! │  │  Window    │    │ Band-pass  │    │  Features  │              │
//! │  └────────────┘    └────────────┘    └─────┬──────┘              │
//! │         │                                  ▼                     │
//! │  ┌────────────┐                      ┌────────────┐              │
//! │  │  Quality   │                      │ AES-GCM    │──▶ sinks     │
//! │  │  Monitor   │                      │ Signature  │              │
//! │  └────────────┘                      └────────────┘              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cortexkey_agent::collector::{MockMode, SampleSource, SyntheticSource, SystemClock};
//! use cortexkey_agent::core::{ConsoleSink, Passphrase, Pipeline, PipelineContext};
//! use cortexkey_agent::session::{StopToken, Watchdog};
//! use cortexkey_agent::Config;
//!
//! let config = Config {
//!     passphrase: Some(Passphrase::new("correct horse battery staple")),
//!     ..Config::default()
//! };
//! let context = PipelineContext::new(&config).expect("invalid configuration");
//! let source = SampleSource::synthetic(SyntheticSource::new(256.0, MockMode::Authenticated));
//!
//! let stop = StopToken::new();
//! let _watchdog = Watchdog::spawn(std::time::Duration::from_secs(10), stop.clone());
//!
//! let mut pipeline = Pipeline::new(context, source, SystemClock::shared(), 256.0, stop);
//! pipeline.add_sink(Box::new(ConsoleSink::default()));
//! let summary = pipeline.run();
//! println!("{}", summary.summary());
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod error;
pub mod session;

// Re-export key types at crate root for convenience
pub use collector::{ConnectionState, MockMode, Sample, SampleSource, SourceMode};
pub use config::Config;
pub use crate::core::{FeatureVector, Passphrase, Pipeline, PipelineContext, Signature, SignatureCipher};
pub use error::{AcquisitionError, ConfigError, CryptoError, ProcessingError, WindowError};
pub use session::{SessionSummary, StopToken};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data-handling declaration that can be displayed to users.
pub const SECURITY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║            CORTEXKEY AGENT - DATA HANDLING DECLARATION           ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent derives encrypted signatures from brain signals.     ║
║                                                                  ║
║  ✓ WHAT LEAVES THE PROCESS:                                      ║
║    • One AES-256-GCM signature per analysis window               ║
║    • Timestamp and source mode (HARDWARE or MOCK)                ║
║    • Session counters (samples, signatures, skipped errors)      ║
║                                                                  ║
║  ✗ WHAT NEVER LEAVES THE PROCESS:                                ║
║    • Raw signal samples                                          ║
║    • Plaintext band-power features                               ║
║    • Your passphrase (not logged, not saved to config)           ║
║                                                                  ║
║  Every signature uses a fresh random salt and nonce. Only the    ║
║  passphrase holder can open a signature:                         ║
║    cortexkey verify <signature>                                  ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_declaration_contents() {
        assert!(SECURITY_DECLARATION.contains("DATA HANDLING"));
        assert!(SECURITY_DECLARATION.contains("NEVER LEAVES"));
        assert!(SECURITY_DECLARATION.contains("passphrase"));
    }
}
