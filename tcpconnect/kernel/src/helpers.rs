//! Helper functions for eBPF programs
//!
//! Provides safe wrappers around BPF helper functions for the values
//! recorded in every event.

use aya_ebpf::helpers::{
    bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_uid_gid, bpf_ktime_get_ns,
};
use tcpconnect_common::{constants::TASK_COMM_LEN, types::TaskInfo};

/// Execution context id used to correlate entry and return probes
///
/// pid_tgid is unique per thread, and a thread is inside at most one
/// connect call at a time.
#[inline(always)]
pub fn context_id() -> u64 {
    bpf_get_current_pid_tgid()
}

/// Get current timestamp in microseconds
#[inline(always)]
pub fn get_timestamp_us() -> u64 {
    unsafe { bpf_ktime_get_ns() } / 1000
}

/// Get current process ID (tgid)
#[inline(always)]
pub fn get_pid() -> u32 {
    (bpf_get_current_pid_tgid() >> 32) as u32
}

/// Get current user ID
#[inline(always)]
pub fn get_uid() -> u32 {
    (bpf_get_current_uid_gid() & 0xFFFFFFFF) as u32
}

/// Get the current task's command name, zeroed if unavailable
#[inline(always)]
pub fn get_comm() -> [u8; TASK_COMM_LEN] {
    bpf_get_current_comm().unwrap_or([0; TASK_COMM_LEN])
}

/// Sample the calling task's identity for an event
#[inline(always)]
pub fn task_info() -> TaskInfo {
    TaskInfo {
        comm: get_comm(),
        pid: get_pid(),
        uid: get_uid(),
        ts_us: get_timestamp_us(),
    }
}
