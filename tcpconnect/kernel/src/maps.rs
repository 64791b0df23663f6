//! BPF map definitions for connect tracing
//!
//! Defines the correlation table bridging entry and return probes, and the
//! perf event array carrying events to userspace.

use aya_ebpf::{
    macros::map,
    maps::{HashMap, PerfEventArray},
};
use tcpconnect_common::{constants::MAX_CONNECTIONS, correlate::ContextMap, types::ConnectEvent};

/// Sockets of connect calls currently in flight
///
/// Key: pid_tgid of the calling thread
/// Value: address of the `struct sock` passed to tcp_vX_connect
///
/// Written by the entry probes, consumed by the return probes.
#[map]
pub static CURRSOCK: HashMap<u64, u64> = HashMap::with_max_entries(MAX_CONNECTIONS, 0);

/// Perf event array to send connect events to userspace
///
/// One ring per CPU. A full ring drops the record and the kernel reports the
/// lost count to the reader.
#[map]
pub static EVENTS: PerfEventArray<ConnectEvent> = PerfEventArray::new(0);

/// [`ContextMap`] view over [`CURRSOCK`]
pub struct CurrSock;

impl ContextMap for CurrSock {
    #[inline(always)]
    fn record(&self, ctx_id: u64, sock: u64) -> bool {
        CURRSOCK.insert(&ctx_id, &sock, 0).is_ok()
    }

    #[inline(always)]
    fn take(&self, ctx_id: u64) -> Option<u64> {
        let sock = unsafe { CURRSOCK.get(&ctx_id).copied() };
        // Remove unconditionally, a miss just fails with ENOENT
        let _ = CURRSOCK.remove(&ctx_id);
        sock
    }
}
