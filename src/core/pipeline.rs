//! The session control loop.
//!
//! One cooperative loop, no worker threads:
//!
//! ```text
//! loop {
//!     stop requested?            -> drain, summarize, exit
//!     synthetic source?          -> wait for the next tick
//!     pull sample                -> (hardware: via supervisor, may back off)
//!     quality monitor, buffer    -> window?
//!     condition -> features -> seal -> sinks
//! }
//! ```
//!
//! Windows are processed to completion before the next sample is pulled,
//! so signatures leave in strict sample order.

use crate::collector::source::SampleSource;
use crate::collector::timing::{SharedClock, TimingController};
use crate::collector::types::Sample;
use crate::config::Config;
use crate::core::features::{FeatureExtractor, FeatureVector};
use crate::core::filters::SignalConditioner;
use crate::core::quality::{QualityLabel, QualityMonitor, QualityReport};
use crate::core::record::{RecordSink, SignatureRecord};
use crate::core::signature::{Signature, SignatureCipher};
use crate::core::windowing::{SlidingWindowBuffer, Window};
use crate::error::{AcquisitionError, ConfigError, WindowError};
use crate::session::control::StopToken;
use crate::session::report::{SessionReporter, SessionSummary};
use chrono::Utc;

/// What one sample produced.
#[derive(Debug, Default)]
pub struct StepOutcome {
    /// Set when a quality interval completed
    pub quality: Option<QualityReport>,
    /// Set when a window closed and was sealed
    pub signature: Option<Signature>,
}

/// Processing state for one session: buffer, filters, extractor, cipher
/// and counters.
pub struct PipelineContext {
    buffer: SlidingWindowBuffer,
    conditioner: SignalConditioner,
    extractor: FeatureExtractor,
    cipher: SignatureCipher,
    quality: QualityMonitor,
    reporter: SessionReporter,
}

impl PipelineContext {
    /// Validate `config` and build the processing chain.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let passphrase = config.passphrase()?.clone();

        Ok(Self {
            buffer: SlidingWindowBuffer::new(config.window_size, config.step_size),
            conditioner: SignalConditioner::new(
                config.sample_rate_hz,
                config.notch_hz,
                config.notch_q,
                config.bandpass_low_hz,
                config.bandpass_high_hz,
            ),
            extractor: FeatureExtractor::new(config.sample_rate_hz, config.window_size),
            cipher: SignatureCipher::new(passphrase),
            quality: QualityMonitor::new(config.sample_rate_hz),
            reporter: SessionReporter::new(),
        })
    }

    /// Condition a window and extract its features.
    pub fn analyze(&mut self, window: &Window) -> Result<FeatureVector, WindowError> {
        let filtered = self.conditioner.condition(window)?;
        Ok(self.extractor.extract(&filtered)?)
    }

    /// Turn one window into a signature.
    pub fn process_window(&mut self, window: &Window) -> Result<Signature, WindowError> {
        let features = self.analyze(window)?;
        Ok(self.cipher.seal(&features)?)
    }

    /// Feed one sample through the quality monitor and window buffer.
    pub fn process_sample(&mut self, sample: Sample) -> StepOutcome {
        self.reporter.record_sample();

        let quality = self.quality.observe(sample.value);
        if matches!(quality, Some(q) if q.label == QualityLabel::Poor) {
            self.reporter.record_poor_quality();
        }

        let signature = self.buffer.push(sample).and_then(|window| {
            match self.process_window(&window) {
                Ok(signature) => {
                    self.reporter.record_signature();
                    Some(signature)
                }
                Err(e) => {
                    tracing::warn!(
                        window = window.index,
                        start = window.start_time(),
                        end = window.end_time(),
                        error = %e,
                        "Dropping window"
                    );
                    self.reporter.record_window_dropped();
                    None
                }
            }
        });

        StepOutcome { quality, signature }
    }

    /// Called at session start and whenever the sample stream is discontinuous.
    pub fn restart_stream(&mut self) {
        self.buffer.reset();
        self.conditioner.reset();
    }

    /// Cipher holding the session passphrase.
    pub fn cipher(&self) -> &SignatureCipher {
        &self.cipher
    }

    /// Session counters.
    pub fn reporter(&self) -> &SessionReporter {
        &self.reporter
    }

    /// Most recent quality grade.
    pub fn last_quality(&self) -> Option<QualityReport> {
        self.quality.last()
    }
}

/// Drives a [`PipelineContext`] from a [`SampleSource`] until stopped.
pub struct Pipeline {
    context: PipelineContext,
    source: SampleSource,
    timing: TimingController,
    stop: StopToken,
    sinks: Vec<Box<dyn RecordSink>>,
}

impl Pipeline {
    pub fn new(
        context: PipelineContext,
        source: SampleSource,
        clock: SharedClock,
        sample_rate_hz: f64,
        stop: StopToken,
    ) -> Self {
        Self {
            context,
            source,
            timing: TimingController::new(sample_rate_hz, clock),
            stop,
            sinks: Vec::new(),
        }
    }

    /// Register an output; every record goes to all sinks in order.
    pub fn add_sink(&mut self, sink: Box<dyn RecordSink>) {
        self.sinks.push(sink);
    }

    /// Processing state, e.g. to open emitted signatures in tests.
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Run until the stop token is raised, then return the session summary.
    pub fn run(&mut self) -> SessionSummary {
        tracing::info!(
            session = %self.context.reporter.session_id(),
            mode = %self.source.mode(),
            window = self.context.buffer.window_size(),
            step = self.context.buffer.step_size(),
            "Session started"
        );
        self.context.restart_stream();
        self.timing.restart();

        while !self.stop.is_stop_requested() {
            if self.source.is_paced() {
                self.timing.wait_next_tick();
            }

            let sample = match self.source.pull_sample() {
                Ok(sample) => sample,
                Err(AcquisitionError::ExhaustedRetries { attempts }) => {
                    tracing::error!(attempts, "Switched to synthetic source for the rest of the session");
                    self.context.reporter.record_fallback();
                    self.context.restart_stream();
                    self.timing.restart();
                    continue;
                }
                // Silent device: go round again so a stop request is seen.
                Err(AcquisitionError::NoData) => continue,
                Err(AcquisitionError::Cancelled) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Sample source failed");
                    break;
                }
            };

            let parse_errors = self.source.take_parse_errors();
            if parse_errors > 0 {
                self.context.reporter.record_parse_errors(parse_errors);
            }

            let outcome = self.context.process_sample(sample);
            if let Some(report) = outcome.quality {
                self.publish_quality(&report);
            }
            if let Some(signature) = outcome.signature {
                self.publish_signature(&signature);
            }
        }

        let summary = self.context.reporter.finish(
            self.source.mode(),
            self.source.connection_state(),
            self.timing.jitter(),
        );
        for sink in &mut self.sinks {
            if let Err(e) = sink.summary(&summary) {
                tracing::warn!(error = %e, "Failed to publish session summary");
            }
        }
        tracing::info!(
            samples = summary.samples_processed,
            signatures = summary.signatures_generated,
            "Session finished"
        );
        summary
    }

    fn publish_quality(&mut self, report: &QualityReport) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.quality(report) {
                tracing::warn!(error = %e, "Failed to publish quality report");
                self.context.reporter.record_sink_error();
            }
        }
    }

    fn publish_signature(&mut self, signature: &Signature) {
        let record = SignatureRecord {
            timestamp: Utc::now().timestamp(),
            signature: signature.to_base64(),
            mode: self.source.mode(),
            quality: self.context.last_quality().map(|q| q.label),
        };
        tracing::debug!(mode = %record.mode, "Signature generated");
        for sink in &mut self.sinks {
            if let Err(e) = sink.signature(&record) {
                tracing::warn!(error = %e, "Failed to write signature record");
                self.context.reporter.record_sink_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::synthetic::SyntheticSource;
    use crate::collector::timing::SimulatedClock;
    use crate::collector::types::{MockMode, SourceMode};
    use crate::core::signature::Passphrase;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn config() -> Config {
        Config {
            passphrase: Some(Passphrase::new("pipeline-test")),
            ..Config::default()
        }
    }

    /// Collects records and raises the stop flag after `limit` signatures.
    struct StopAfter {
        limit: usize,
        stop: StopToken,
        records: Arc<Mutex<Vec<SignatureRecord>>>,
    }

    impl RecordSink for StopAfter {
        fn signature(&mut self, record: &SignatureRecord) -> io::Result<()> {
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            if records.len() >= self.limit {
                self.stop.request_stop();
            }
            Ok(())
        }
    }

    fn pipeline(mode: MockMode, seed: u64, stop: &StopToken) -> Pipeline {
        let config = config();
        let context = PipelineContext::new(&config).unwrap();
        let source = SampleSource::synthetic(SyntheticSource::seeded(256.0, mode, seed));
        Pipeline::new(
            context,
            source,
            Arc::new(SimulatedClock::new()),
            256.0,
            stop.clone(),
        )
    }

    #[test]
    fn test_stops_at_loop_boundary() {
        let stop = StopToken::new();
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = pipeline(MockMode::Authenticated, 3, &stop);
        pipeline.add_sink(Box::new(StopAfter {
            limit: 5,
            stop: stop.clone(),
            records: records.clone(),
        }));

        let summary = pipeline.run();

        assert_eq!(summary.signatures_generated, 5);
        assert_eq!(summary.samples_processed, 512 + 4 * 128);
        assert_eq!(summary.mode, SourceMode::Mock);
        assert_eq!(summary.errors_skipped, 0);

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 5);
        for record in records.iter() {
            let features = pipeline.context().cipher().open_base64(&record.signature).unwrap();
            assert!(features.is_finite());
            assert_eq!(record.mode, SourceMode::Mock);
        }
    }

    #[test]
    fn test_one_minute_cadence() {
        let mut context = PipelineContext::new(&config()).unwrap();
        let mut source = SyntheticSource::seeded(256.0, MockMode::Authenticated, 9);

        let signatures = (0..60 * 256)
            .filter(|_| context.process_sample(source.next_sample()).signature.is_some())
            .count();

        assert_eq!(signatures, 117);
        assert_eq!(context.reporter().samples_processed(), 15360);
        assert_eq!(context.reporter().signatures_generated(), 117);
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let config = Config {
            passphrase: None,
            ..Config::default()
        };
        assert!(matches!(
            PipelineContext::new(&config),
            Err(ConfigError::MissingPassphrase)
        ));
    }

    #[test]
    fn test_bad_window_is_dropped_not_fatal() {
        let mut context = PipelineContext::new(&Config {
            window_size: 64,
            step_size: 16,
            ..config()
        })
        .unwrap();

        // A non-finite value poisons every window that contains it.
        let mut dropped_then_recovered = false;
        for n in 0..400u64 {
            let value = if n == 10 { f64::INFINITY } else { (n as f64 * 0.3).sin() };
            let outcome = context.process_sample(Sample::new(n as f64 / 256.0, value));
            if outcome.signature.is_some() && context.reporter().errors_skipped() > 0 {
                dropped_then_recovered = true;
            }
        }

        assert!(context.reporter().errors_skipped() > 0);
        assert!(dropped_then_recovered);
    }

    #[test]
    fn test_quality_reported_every_second() {
        let stop = StopToken::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut pipeline = pipeline(MockMode::Authenticated, 5, &stop);
        pipeline.add_sink(Box::new(crate::core::record::ChannelSink::new(tx)));
        pipeline.add_sink(Box::new(StopAfter {
            limit: 9,
            stop: stop.clone(),
            records: Arc::new(Mutex::new(Vec::new())),
        }));

        let summary = pipeline.run();

        let events: Vec<_> = rx.try_iter().collect();
        let quality = events
            .iter()
            .filter(|e| matches!(e, crate::core::record::PipelineEvent::Quality(_)))
            .count() as u64;
        assert_eq!(quality, summary.samples_processed / 256);
        assert!(matches!(
            events.last(),
            Some(crate::core::record::PipelineEvent::Summary(_))
        ));
    }
}
