//! Event consumer loop
//!
//! Drains the [`EventChannel`], decodes each record and forwards the result
//! to a [`ReportSink`]. Per-record problems are reported and skipped; the
//! loop only ends when the channel is closed.

use crate::{
    channel::{ChannelRecord, EventChannel},
    error::DecodeError,
    sink::ReportSink,
    types::ConnectionEvent,
    wire,
};
use log::debug;

/// Running totals of one consumer loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events decoded and reported
    pub events: u64,
    /// Records reported lost by the channel
    pub lost: u64,
    /// Records that failed to decode
    pub decode_errors: u64,
}

/// Decode a raw record into a validated event
pub fn decode_event(raw: &[u8]) -> Result<ConnectionEvent, DecodeError> {
    let event = wire::decode(raw)?;
    ConnectionEvent::try_from(&event)
}

/// Run until `channel` is closed
pub async fn run_consumer<S>(channel: &EventChannel, sink: &mut S) -> ConsumerStats
where
    S: ReportSink + ?Sized,
{
    let mut stats = ConsumerStats::default();

    loop {
        match channel.read().await {
            ChannelRecord::Lost(count) => {
                stats.lost += count;
                sink.on_lost(count);
            }
            ChannelRecord::Sample(raw) => match decode_event(&raw) {
                Ok(event) => {
                    stats.events += 1;
                    sink.on_event(&event);
                }
                Err(err) => {
                    stats.decode_errors += 1;
                    sink.on_decode_error(&err);
                }
            },
            ChannelRecord::Closed => {
                debug!("event channel closed, consumer exiting");
                return stats;
            }
        }
    }
}
