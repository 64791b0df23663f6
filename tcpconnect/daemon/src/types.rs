//! Userspace type definitions
//!
//! ## Organization
//!
//! - **Kernel Types**: the wire record shared with the eBPF program (from
//!   tcpconnect_common)
//! - **Userspace Types**: the validated, typed view handed to report sinks

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

// ============================================================================
// Kernel Types (from eBPF programs)
// ============================================================================

pub mod kernel {
    //! Types shared between the kernel eBPF program and userspace
    //!
    //! These are re-exported from the tcpconnect-common crate and must
    //! maintain binary compatibility with the eBPF program.

    pub use tcpconnect_common::constants;
    pub use tcpconnect_common::types::{AddressFamily, ConnectEvent};
}

pub use kernel::{AddressFamily, ConnectEvent};

/// One traced connect attempt
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Process ID
    pub pid: u32,
    /// User ID
    pub uid: u32,
    /// Process command name
    pub comm: String,
    /// IP version, 4 or 6
    pub ip: u8,
    /// Source address
    pub saddr: IpAddr,
    /// Destination address
    pub daddr: IpAddr,
    /// Destination port
    pub dport: u16,
    /// Monotonic timestamp at connect return (microseconds)
    pub timestamp_us: u64,
}

impl ConnectionEvent {
    pub fn family(&self) -> AddressFamily {
        match self.ip {
            4 => AddressFamily::Inet,
            _ => AddressFamily::Inet6,
        }
    }
}

impl TryFrom<&ConnectEvent> for ConnectionEvent {
    type Error = DecodeError;

    fn try_from(raw: &ConnectEvent) -> Result<Self, Self::Error> {
        let family = raw.family().ok_or(DecodeError::UnknownFamily(raw.af))?;

        let (ip, saddr, daddr) = match family {
            AddressFamily::Inet => {
                if raw.saddr_v6 != [0; 16] || raw.daddr_v6 != [0; 16] {
                    return Err(DecodeError::InconsistentFamily { af: raw.af });
                }
                (4, ipv4_from_wire(raw.saddr_v4), ipv4_from_wire(raw.daddr_v4))
            }
            AddressFamily::Inet6 => {
                if raw.saddr_v4 != 0 || raw.daddr_v4 != 0 {
                    return Err(DecodeError::InconsistentFamily { af: raw.af });
                }
                (
                    6,
                    IpAddr::V6(Ipv6Addr::from(raw.saddr_v6)),
                    IpAddr::V6(Ipv6Addr::from(raw.daddr_v6)),
                )
            }
        };

        Ok(Self {
            pid: raw.pid,
            uid: raw.uid,
            comm: comm_to_string(&raw.comm),
            ip,
            saddr,
            daddr,
            dport: raw.dport,
            timestamp_us: raw.ts_us,
        })
    }
}

impl fmt::Display for ConnectionEvent {
    /// `PID COMM IP SADDR DADDR DPORT`, aligned with [`HEADER`]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<7} {:<16} {:<2} {:<39} {:<39} {}",
            self.pid, self.comm, self.ip, self.saddr, self.daddr, self.dport
        )
    }
}

/// Column header for the text output
pub const HEADER: &str = "PID     COMM             IP SADDR                                   DADDR                                   DPORT";

/// IPv4 addresses are stored in network byte order, so the little-endian
/// wire bytes of the field are the octets in order.
fn ipv4_from_wire(addr: u32) -> IpAddr {
    IpAddr::V4(Ipv4Addr::from(addr.to_le_bytes()))
}

/// Convert a NUL-padded kernel command name
pub fn comm_to_string(comm: &[u8]) -> String {
    let end = comm.iter().position(|&b| b == 0).unwrap_or(comm.len());
    String::from_utf8_lossy(&comm[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcpconnect_common::constants::{AF_INET, AF_INET6};

    fn raw_v4() -> ConnectEvent {
        let mut raw = ConnectEvent::zeroed();
        raw.saddr_v4 = u32::from_le_bytes([192, 168, 1, 10]);
        raw.daddr_v4 = u32::from_le_bytes([1, 1, 1, 1]);
        raw.comm[..3].copy_from_slice(b"ssh");
        raw.ts_us = 99;
        raw.af = AF_INET as i64;
        raw.pid = 1234;
        raw.uid = 1000;
        raw.dport = 22;
        raw
    }

    #[test]
    fn test_ipv4_conversion() {
        let event = ConnectionEvent::try_from(&raw_v4()).unwrap();

        assert_eq!(event.ip, 4);
        assert_eq!(event.family(), AddressFamily::Inet);
        assert_eq!(event.saddr, "192.168.1.10".parse::<IpAddr>().unwrap());
        assert_eq!(event.daddr, "1.1.1.1".parse::<IpAddr>().unwrap());
        assert_eq!(event.comm, "ssh");
        assert_eq!(event.dport, 22);
        assert_eq!(event.timestamp_us, 99);
    }

    #[test]
    fn test_ipv6_conversion() {
        let mut raw = ConnectEvent::zeroed();
        raw.af = AF_INET6 as i64;
        raw.saddr_v6 = "fe80::1".parse::<Ipv6Addr>().unwrap().octets();
        raw.daddr_v6 = "2606:4700::1111".parse::<Ipv6Addr>().unwrap().octets();
        raw.dport = 443;

        let event = ConnectionEvent::try_from(&raw).unwrap();

        assert_eq!(event.ip, 6);
        assert_eq!(event.saddr, "fe80::1".parse::<IpAddr>().unwrap());
        assert_eq!(event.daddr, "2606:4700::1111".parse::<IpAddr>().unwrap());
        assert_eq!(event.comm, "");
    }

    #[test]
    fn test_unknown_family_rejected() {
        let mut raw = raw_v4();
        raw.af = 17;

        assert_eq!(
            ConnectionEvent::try_from(&raw),
            Err(DecodeError::UnknownFamily(17))
        );
    }

    #[test]
    fn test_mixed_family_fields_rejected() {
        let mut raw = raw_v4();
        raw.daddr_v6[0] = 0x20;

        assert_eq!(
            ConnectionEvent::try_from(&raw),
            Err(DecodeError::InconsistentFamily { af: 2 })
        );
    }

    #[test]
    fn test_comm_to_string() {
        assert_eq!(comm_to_string(b"nginx\0\0\0\0\0\0\0\0\0\0\0"), "nginx");
        assert_eq!(comm_to_string(b"exactly16bytes!!"), "exactly16bytes!!");
        assert_eq!(comm_to_string(&[0; 16]), "");
    }

    #[test]
    fn test_display_columns() {
        let event = ConnectionEvent::try_from(&raw_v4()).unwrap();
        let line = event.to_string();

        assert!(line.starts_with("1234    ssh"));
        assert!(line.contains("192.168.1.10"));
        assert!(line.ends_with(" 22"));
    }
}
