//! Shared types and correlation logic for the tcpconnect tracer
//!
//! This crate provides the wire record, constants, and the entry/return
//! handler logic shared between the eBPF kernel program and the userspace
//! daemon. It is `no_std` so the kernel program can link it directly.

#![cfg_attr(not(test), no_std)]

pub mod constants;
pub mod correlate;
pub mod table;
pub mod types;

// Re-export commonly used types
pub use constants::*;
pub use correlate::{handle_entry, handle_return, ContextMap, SockReader};
pub use table::ContextTable;
pub use types::{AddressFamily, ConnectEvent, SockAddrs, SockSnapshot, TaskInfo};
