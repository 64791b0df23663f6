//! tcpconnect userspace library
//!
//! Provides the components for loading the connect probes, draining their
//! events and reporting them.

pub mod channel;
pub mod consumer;
pub mod error;
pub mod events;
pub mod loader;
pub mod sink;
pub mod types;
pub mod wire;

pub use channel::{ChannelRecord, EventChannel, DEFAULT_CHANNEL_CAPACITY};
pub use consumer::{decode_event, run_consumer, ConsumerStats};
pub use error::DecodeError;
pub use events::EventProcessor;
pub use loader::ProbeLoader;
pub use sink::{JsonLinesSink, LogSink, ReportSink, SinkType};
pub use types::*;
