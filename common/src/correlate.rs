//! Entry/return correlation for the connect probes
//!
//! The entry probe only sees the socket as it exists before the kernel has
//! picked a source address, and the return probe only sees the return code.
//! The two are bridged by a table keyed on the execution context id
//! (`pid_tgid`): entry records `ctx -> sock`, return takes it back out and
//! reads the final addresses from the socket.
//!
//! Both handlers are generic over the table and the socket reader so the
//! kernel program can plug in BPF maps and `bpf_probe_read_kernel`, while
//! the daemon's tests drive the very same code with [`ContextTable`] and
//! in-memory sockets.
//!
//! [`ContextTable`]: crate::table::ContextTable

use crate::types::{AddressFamily, ConnectEvent, SockSnapshot, TaskInfo};

/// Keyed store bridging entry and return probes
///
/// Implementations must keep operations on distinct keys independent when
/// called concurrently from several CPUs.
pub trait ContextMap {
    /// Insert or overwrite the socket recorded for `ctx_id`
    ///
    /// Returns false when the entry could not be stored (table full).
    fn record(&self, ctx_id: u64, sock: u64) -> bool;

    /// Look up and delete the entry for `ctx_id` in one step
    fn take(&self, ctx_id: u64) -> Option<u64>;
}

/// Reads the final connection state out of a socket handle
pub trait SockReader {
    /// `None` when the socket cannot be read or is not of `family`
    fn snapshot(&self, sock: u64, family: AddressFamily) -> Option<SockSnapshot>;
}

/// Entry probe body: remember which socket this context is connecting
#[inline(always)]
pub fn handle_entry<M: ContextMap + ?Sized>(map: &M, ctx_id: u64, sock: u64) -> bool {
    map.record(ctx_id, sock)
}

/// Return probe body: build the event for the connect call `ctx_id` entered
///
/// The table entry is removed on every hit, even when the socket can no
/// longer be read. A miss yields `None` without side effects. `task` is only
/// evaluated for a readable hit.
#[inline(always)]
pub fn handle_return<M, R, F>(
    map: &M,
    reader: &R,
    ctx_id: u64,
    family: AddressFamily,
    task: F,
) -> Option<ConnectEvent>
where
    M: ContextMap + ?Sized,
    R: SockReader + ?Sized,
    F: FnOnce() -> TaskInfo,
{
    let sock = map.take(ctx_id)?;
    let snapshot = reader.snapshot(sock, family)?;
    Some(ConnectEvent::new(&snapshot, &task()))
}
