//! Shared data structures between kernel and userspace
//!
//! [`ConnectEvent`] is the record the return probe publishes. It must stay
//! `repr(C)` with explicit padding so the eBPF program and the daemon agree
//! on every byte offset.

use crate::constants::{AF_INET, AF_INET6, EVENT_SIZE, TASK_COMM_LEN};

/// Address family of a traced connect call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// `AF_INET`, traced through `tcp_v4_connect`
    Inet,
    /// `AF_INET6`, traced through `tcp_v6_connect`
    Inet6,
}

impl AddressFamily {
    /// Discriminant as written to [`ConnectEvent::af`]
    #[inline(always)]
    pub const fn raw(self) -> i64 {
        match self {
            AddressFamily::Inet => AF_INET as i64,
            AddressFamily::Inet6 => AF_INET6 as i64,
        }
    }

    /// Parse a wire discriminant, `None` for anything but `AF_INET`/`AF_INET6`
    pub const fn from_raw(af: i64) -> Option<Self> {
        if af == AF_INET as i64 {
            Some(AddressFamily::Inet)
        } else if af == AF_INET6 as i64 {
            Some(AddressFamily::Inet6)
        } else {
            None
        }
    }
}

/// Addresses read back from a connecting socket
///
/// IPv4 addresses are kept exactly as the kernel stores them (network byte
/// order in memory), IPv6 addresses as their 16 raw octets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockAddrs {
    V4 { saddr: u32, daddr: u32 },
    V6 { saddr: [u8; 16], daddr: [u8; 16] },
}

/// Final state of a socket at connect return time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SockSnapshot {
    pub addrs: SockAddrs,
    /// Destination port in host byte order
    pub dport: u16,
}

impl SockSnapshot {
    pub fn family(&self) -> AddressFamily {
        match self.addrs {
            SockAddrs::V4 { .. } => AddressFamily::Inet,
            SockAddrs::V6 { .. } => AddressFamily::Inet6,
        }
    }
}

/// Identity of the task issuing the connect call, sampled at return time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    pub comm: [u8; TASK_COMM_LEN],
    pub pid: u32,
    pub uid: u32,
    /// Monotonic clock in microseconds
    pub ts_us: u64,
}

/// Connect event sent from kernel to userspace
///
/// Layout (little-endian, 88 bytes, no interior padding):
///
/// ```text
///  0  saddr_v4   u32       20  daddr_v4   u32       56  ts_us  u64
///  4  saddr_v6   [u8; 16]  24  daddr_v6   [u8; 16]  64  af     i64
///                          40  comm       [u8; 16]  72  pid    u32
///                                                   76  uid    u32
///                                                   80  dport  u16
///                                                   82  _padding
/// ```
///
/// Only the address fields matching `af` are populated, the other family's
/// fields are zero. `af` and `dport` are host byte order.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectEvent {
    /// Source IPv4 address (network byte order in memory)
    pub saddr_v4: u32,
    /// Source IPv6 address
    pub saddr_v6: [u8; 16],
    /// Destination IPv4 address (network byte order in memory)
    pub daddr_v4: u32,
    /// Destination IPv6 address
    pub daddr_v6: [u8; 16],
    /// Process command name, NUL padded
    pub comm: [u8; TASK_COMM_LEN],
    /// Timestamp at connect return (microseconds, monotonic)
    pub ts_us: u64,
    /// Address family (`AF_INET` or `AF_INET6`)
    pub af: i64,
    /// Process ID (tgid)
    pub pid: u32,
    /// User ID
    pub uid: u32,
    /// Destination port (host byte order)
    pub dport: u16,
    /// Padding for alignment, always zero
    pub _padding: [u8; 6],
}

impl ConnectEvent {
    /// All-zero record
    pub const fn zeroed() -> Self {
        Self {
            saddr_v4: 0,
            saddr_v6: [0; 16],
            daddr_v4: 0,
            daddr_v6: [0; 16],
            comm: [0; TASK_COMM_LEN],
            ts_us: 0,
            af: 0,
            pid: 0,
            uid: 0,
            dport: 0,
            _padding: [0; 6],
        }
    }

    /// Build the record for one completed connect call
    ///
    /// The discriminant is derived from the snapshot, so it always agrees
    /// with the populated address fields.
    #[inline(always)]
    pub fn new(sock: &SockSnapshot, task: &TaskInfo) -> Self {
        let mut event = Self::zeroed();
        match sock.addrs {
            SockAddrs::V4 { saddr, daddr } => {
                event.saddr_v4 = saddr;
                event.daddr_v4 = daddr;
            }
            SockAddrs::V6 { saddr, daddr } => {
                event.saddr_v6 = saddr;
                event.daddr_v6 = daddr;
            }
        }
        event.af = sock.family().raw();
        event.dport = sock.dport;
        event.comm = task.comm;
        event.ts_us = task.ts_us;
        event.pid = task.pid;
        event.uid = task.uid;
        event
    }

    pub fn family(&self) -> Option<AddressFamily> {
        AddressFamily::from_raw(self.af)
    }
}

// Compile-time layout checks
// These will fail to compile if the wire layout drifts
const _: () = {
    use core::mem::{align_of, offset_of, size_of};

    assert!(size_of::<ConnectEvent>() == EVENT_SIZE);
    assert!(size_of::<ConnectEvent>() % align_of::<ConnectEvent>() == 0);
    assert!(offset_of!(ConnectEvent, saddr_v6) == 4);
    assert!(offset_of!(ConnectEvent, daddr_v4) == 20);
    assert!(offset_of!(ConnectEvent, daddr_v6) == 24);
    assert!(offset_of!(ConnectEvent, comm) == 40);
    assert!(offset_of!(ConnectEvent, ts_us) == 56);
    assert!(offset_of!(ConnectEvent, af) == 64);
    assert!(offset_of!(ConnectEvent, pid) == 72);
    assert!(offset_of!(ConnectEvent, uid) == 76);
    assert!(offset_of!(ConnectEvent, dport) == 80);
};
