//! tcpconnect - Kernel Space Program
//!
//! Traces outbound TCP connect calls by pairing a kprobe and a kretprobe on
//! `tcp_v4_connect` and `tcp_v6_connect`.
//!
//! ## Architecture
//!
//! ```text
//! tcp_vX_connect()        -> kprobe records pid_tgid -> sock in CURRSOCK
//!                            |
//!                            v
//! tcp_vX_connect() return -> kretprobe takes the CURRSOCK entry, reads the
//!                            final addresses and sends a ConnectEvent to EVENTS
//!                            |
//!                            v
//! Userspace               -> per-CPU readers, decode, report
//! ```
//!
//! ## Usage
//!
//! This program must be compiled for the bpfel-unknown-none target:
//!
//! ```bash
//! cargo +nightly build --release --target=bpfel-unknown-none -Z build-std=core
//! ```
//!
//! The compiled bytecode is then loaded by the userspace daemon.

#![no_std]
#![no_main]

mod handlers;
mod helpers;
mod maps;
mod socket_parser;

// Re-export probe functions so they're visible to the loader
pub use handlers::{tcp_v4_connect, tcp_v4_connect_ret, tcp_v6_connect, tcp_v6_connect_ret};

// Re-export maps for verification
pub use maps::{CURRSOCK, EVENTS};

#[no_mangle]
#[link_section = "license"]
pub static _license: [u8; 4] = *b"GPL\0";

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    // eBPF programs cannot panic - the verifier rejects any reachable panic
    loop {}
}
