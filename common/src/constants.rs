//! Shared constants for the connect probes
//!
//! These constants are used by both kernel and userspace programs
//! to keep map sizes and the wire layout in agreement.

// ============================================================================
// BPF Map Sizes
// ============================================================================

/// Maximum number of connect calls in flight tracked by the correlation table
pub const MAX_CONNECTIONS: u32 = 10240;

// ============================================================================
// Address Families (from linux/socket.h)
// ============================================================================

/// IPv4 address family
pub const AF_INET: u16 = 2;

/// IPv6 address family
pub const AF_INET6: u16 = 10;

// ============================================================================
// Wire Layout
// ============================================================================

/// Length of the kernel task command name, including the trailing NUL
pub const TASK_COMM_LEN: usize = 16;

/// Size in bytes of one [`ConnectEvent`](crate::types::ConnectEvent) record
pub const EVENT_SIZE: usize = 88;

/// Names of the kernel functions the probes attach to
pub const TCP_V4_CONNECT: &str = "tcp_v4_connect";
pub const TCP_V6_CONNECT: &str = "tcp_v6_connect";
