//! Kprobe handlers for connect tracing
//!
//! Each connect path gets an entry probe that remembers the socket and a
//! return probe that emits the event once the kernel has filled in the
//! addresses.

use aya_ebpf::{
    macros::{kprobe, kretprobe},
    programs::ProbeContext,
};
use aya_log_ebpf::warn;
use tcpconnect_common::{
    correlate::{handle_entry, handle_return},
    types::AddressFamily,
};

use crate::{
    helpers::{context_id, task_info},
    maps::{CurrSock, EVENTS},
    socket_parser::{get_sock_from_context, KernelSocks},
};

/// Attached to: tcp_v4_connect (entry)
#[kprobe]
pub fn tcp_v4_connect(ctx: ProbeContext) -> u32 {
    match try_connect_entry(&ctx) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

/// Attached to: tcp_v4_connect (return)
#[kretprobe]
pub fn tcp_v4_connect_ret(ctx: ProbeContext) -> u32 {
    match try_connect_return(&ctx, AddressFamily::Inet) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

/// Attached to: tcp_v6_connect (entry)
#[kprobe]
pub fn tcp_v6_connect(ctx: ProbeContext) -> u32 {
    match try_connect_entry(&ctx) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

/// Attached to: tcp_v6_connect (return)
#[kretprobe]
pub fn tcp_v6_connect_ret(ctx: ProbeContext) -> u32 {
    match try_connect_return(&ctx, AddressFamily::Inet6) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

#[inline(always)]
fn try_connect_entry(ctx: &ProbeContext) -> Result<u32, i64> {
    let sock = get_sock_from_context(ctx)?;

    if !handle_entry(&CurrSock, context_id(), sock as u64) {
        // Table full: this call will be missed at return time
        warn!(ctx, "CURRSOCK full, dropping connect entry");
    }

    Ok(0)
}

/// Emits regardless of the connect return code: failed attempts are
/// attempts too.
#[inline(always)]
fn try_connect_return(ctx: &ProbeContext, family: AddressFamily) -> Result<u32, i64> {
    if let Some(event) = handle_return(&CurrSock, &KernelSocks, context_id(), family, task_info) {
        EVENTS.output(ctx, &event, 0);
    }

    Ok(0)
}
