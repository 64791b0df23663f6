//! Reporting sinks
//!
//! The consumer loop hands every decoded event, loss notification and
//! decode error to a [`ReportSink`], one synchronous call each.

use crate::{
    error::DecodeError,
    types::{ConnectionEvent, HEADER},
};
use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::{io::Write, str::FromStr};

/// Receiver of everything the consumer loop produces
pub trait ReportSink: Send {
    /// Called once per decoded event
    fn on_event(&mut self, event: &ConnectionEvent);

    /// Called once per loss notification with the number of dropped records
    fn on_lost(&mut self, count: u64) {
        warn!("event buffer is full, dropped {} samples", count);
    }

    /// Called once per record that failed to decode
    fn on_decode_error(&mut self, err: &DecodeError) {
        warn!("failed to parse connect event: {}", err);
    }
}

/// Output format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkType {
    /// Aligned text through the logger
    Log,
    /// One JSON object per line
    Json,
}

impl FromStr for SinkType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "log" | "text" => Ok(SinkType::Log),
            "json" | "jsonl" => Ok(SinkType::Json),
            _ => anyhow::bail!("Unsupported format: {}. Use log or json", s),
        }
    }
}

/// Text sink writing one log line per event
pub struct LogSink;

impl LogSink {
    /// Create the sink and log the column header
    pub fn new() -> Self {
        info!("{}", HEADER);
        Self
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for LogSink {
    fn on_event(&mut self, event: &ConnectionEvent) {
        info!("{}", event);
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    /// Wall-clock time the daemon saw the event (RFC 3339)
    observed_at: String,
    #[serde(flatten)]
    event: &'a ConnectionEvent,
}

/// JSON lines sink
///
/// Write failures are logged and the event is skipped; the loop keeps going.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_event(&mut self, event: &ConnectionEvent) -> Result<()> {
        let record = JsonRecord {
            observed_at: chrono::Utc::now().to_rfc3339(),
            event,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn on_event(&mut self, event: &ConnectionEvent) {
        if let Err(e) = self.write_event(event) {
            warn!("failed to write connect event: {}", e);
        }
    }
}
