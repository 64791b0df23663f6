//! Errors surfaced by the consumer loop
//!
//! Setup paths use `anyhow`; these are the per-record errors handed to a
//! [`ReportSink`](crate::sink::ReportSink) while the loop keeps running.

use thiserror::Error;

/// A raw record that could not be turned into a [`ConnectionEvent`]
///
/// [`ConnectionEvent`]: crate::types::ConnectionEvent
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than one fixed-size record
    #[error("record too short: {len} bytes, expected at least {expected}")]
    Truncated {
        /// Bytes received
        len: usize,
        /// Fixed record size
        expected: usize,
    },

    /// Discriminant is neither AF_INET nor AF_INET6
    #[error("unknown address family {0}")]
    UnknownFamily(i64),

    /// The other family's address fields are not zero
    #[error("address family {af} record has populated fields of the other family")]
    InconsistentFamily {
        /// Discriminant found in the record
        af: i64,
    },
}
