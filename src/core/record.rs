//! Signature records and where they go.
//!
//! Records carry only ciphertext; feature vectors never leave the pipeline
//! in plaintext.

use crate::collector::types::SourceMode;
use crate::core::quality::{QualityLabel, QualityReport};
use crate::session::report::SessionSummary;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// One emitted signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Unix time in whole seconds
    pub timestamp: i64,
    /// URL-safe base64 signature
    pub signature: String,
    /// Source that produced the window
    pub mode: SourceMode,
    /// Latest quality grade when the signature was made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityLabel>,
}

impl SignatureRecord {
    /// `timestamp,signature,MODE`
    pub fn to_csv_line(&self) -> String {
        format!("{},{},{}", self.timestamp, self.signature, self.mode)
    }
}

/// Events published to an external consumer.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A new signature
    Signature(SignatureRecord),
    /// Periodic raw-signal quality
    Quality(QualityReport),
    /// Sent once when the session ends
    Summary(SessionSummary),
}

/// Destination for pipeline output.
pub trait RecordSink {
    fn signature(&mut self, record: &SignatureRecord) -> io::Result<()>;

    fn quality(&mut self, _report: &QualityReport) -> io::Result<()> {
        Ok(())
    }

    fn summary(&mut self, _summary: &SessionSummary) -> io::Result<()> {
        Ok(())
    }
}

/// On-disk record format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `timestamp,signature,MODE`
    #[default]
    Csv,
    /// One JSON object per line
    Jsonl,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "jsonl" => Ok(OutputFormat::Jsonl),
            other => Err(format!("unknown output format '{other}', use 'csv' or 'jsonl'")),
        }
    }
}

/// Appends records to a file, one per line.
pub struct FileSink {
    writer: BufWriter<File>,
    format: OutputFormat,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: &Path, format: OutputFormat) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            format,
        })
    }
}

impl RecordSink for FileSink {
    fn signature(&mut self, record: &SignatureRecord) -> io::Result<()> {
        match self.format {
            OutputFormat::Csv => writeln!(self.writer, "{}", record.to_csv_line())?,
            OutputFormat::Jsonl => {
                let line = serde_json::to_string(record).map_err(io::Error::other)?;
                writeln!(self.writer, "{line}")?;
            }
        }
        // Records must survive an abrupt exit.
        self.writer.flush()
    }
}

/// Prints records to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    show_quality: bool,
}

impl ConsoleSink {
    /// With `show_quality`, quality reports are printed too.
    pub fn new(show_quality: bool) -> Self {
        Self { show_quality }
    }
}

impl RecordSink for ConsoleSink {
    fn signature(&mut self, record: &SignatureRecord) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "[{}] {} {}", record.timestamp, record.mode, record.signature)
    }

    fn quality(&mut self, report: &QualityReport) -> io::Result<()> {
        if !self.show_quality {
            return Ok(());
        }
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "  Signal quality: {} (RMS: {:.3}, Peak: {:.3})",
            report.label, report.rms, report.peak
        )
    }
}

/// Forwards events over a channel, e.g. to a dashboard.
///
/// A disconnected receiver is reported as an error, never a panic.
pub struct ChannelSink {
    sender: Sender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<PipelineEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: PipelineEvent) -> io::Result<()> {
        self.sender
            .send(event)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event receiver dropped"))
    }
}

impl RecordSink for ChannelSink {
    fn signature(&mut self, record: &SignatureRecord) -> io::Result<()> {
        self.send(PipelineEvent::Signature(record.clone()))
    }

    fn quality(&mut self, report: &QualityReport) -> io::Result<()> {
        self.send(PipelineEvent::Quality(*report))
    }

    fn summary(&mut self, summary: &SessionSummary) -> io::Result<()> {
        self.send(PipelineEvent::Summary(summary.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record() -> SignatureRecord {
        SignatureRecord {
            timestamp: 1_700_000_000,
            signature: "c2lnbmF0dXJl".to_string(),
            mode: SourceMode::Mock,
            quality: None,
        }
    }

    #[test]
    fn test_csv_line() {
        assert_eq!(record().to_csv_line(), "1700000000,c2lnbmF0dXJl,MOCK");
    }

    #[test]
    fn test_file_sink_appends_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.csv");

        for _ in 0..2 {
            let mut sink = FileSink::open(&path, OutputFormat::Csv).unwrap();
            sink.signature(&record()).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "1700000000,c2lnbmF0dXJl,MOCK\n1700000000,c2lnbmF0dXJl,MOCK\n"
        );
    }

    #[test]
    fn test_file_sink_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("signatures.jsonl");
        let mut sink = FileSink::open(&path, OutputFormat::Jsonl).unwrap();

        let mut with_quality = record();
        with_quality.quality = Some(QualityLabel::Fair);
        sink.signature(&record()).unwrap();
        sink.signature(&with_quality).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            r#"{"timestamp":1700000000,"signature":"c2lnbmF0dXJl","mode":"MOCK"}"#
        );
        let parsed: SignatureRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, with_quality);
    }

    #[test]
    fn test_channel_sink() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sink = ChannelSink::new(tx);
        sink.signature(&record()).unwrap();

        match rx.try_recv().unwrap() {
            PipelineEvent::Signature(r) => assert_eq!(r, record()),
            other => panic!("unexpected event {other:?}"),
        }

        drop(rx);
        assert!(sink.signature(&record()).is_err());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSONL".parse::<OutputFormat>(), Ok(OutputFormat::Jsonl));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
