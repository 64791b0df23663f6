//! Socket structure parsing
//!
//! Reads the connection addresses out of the kernel `struct sock` captured
//! by the entry probe. `struct sock` starts with `struct sock_common`, so the
//! captured pointer can be read directly as the latter.

use aya_ebpf::{cty::c_void, helpers::bpf_probe_read_kernel, programs::ProbeContext};
use tcpconnect_common::{
    correlate::SockReader,
    types::{AddressFamily, SockAddrs, SockSnapshot},
};

/// Kernel struct sock_common (prefix up to the IPv6 addresses)
///
/// Offsets follow x86_64/arm64 kernels built with CONFIG_NET_NS and
/// CONFIG_IPV6, which covers every distribution kernel the probes target.
#[repr(C)]
#[allow(non_camel_case_types)]
struct sock_common {
    skc_daddr: u32,             // Destination address (network byte order)
    skc_rcv_saddr: u32,         // Source address (network byte order)
    skc_hash: u32,
    skc_dport: u16,             // Destination port (network byte order)
    skc_num: u16,               // Source port (host byte order)
    skc_family: u16,            // Address family (AF_INET, AF_INET6)
    skc_state: u8,              // Connection state
    skc_flags: u8,              // reuse/reuseport/ipv6only bitfield
    skc_bound_dev_if: i32,
    skc_bind_node: [u64; 2],    // struct hlist_node
    skc_prot: u64,              // struct proto *
    skc_net: u64,               // possible_net_t
    skc_v6_daddr: [u8; 16],     // struct in6_addr
    skc_v6_rcv_saddr: [u8; 16], // struct in6_addr
}

/// Extract socket pointer from kprobe context
///
/// The first argument to tcp_v4_connect and tcp_v6_connect is a pointer to
/// struct sock.
#[inline(always)]
pub fn get_sock_from_context(ctx: &ProbeContext) -> Result<*const c_void, i64> {
    let sock: *const c_void = ctx.arg(0).ok_or(-1i64)?;
    if sock.is_null() {
        return Err(-1);
    }
    Ok(sock)
}

/// [`SockReader`] backed by `bpf_probe_read_kernel`
pub struct KernelSocks;

impl SockReader for KernelSocks {
    /// The family comes from the probe that fired, not from `skc_family`:
    /// an IPv4-mapped connect on an AF_INET6 socket goes through
    /// tcp_v4_connect and only carries valid IPv4 fields.
    #[inline(always)]
    fn snapshot(&self, sock: u64, family: AddressFamily) -> Option<SockSnapshot> {
        if sock == 0 {
            return None;
        }

        let sk_common =
            unsafe { bpf_probe_read_kernel(sock as *const sock_common) }.ok()?;

        let addrs = match family {
            AddressFamily::Inet => SockAddrs::V4 {
                saddr: sk_common.skc_rcv_saddr,
                daddr: sk_common.skc_daddr,
            },
            AddressFamily::Inet6 => SockAddrs::V6 {
                saddr: sk_common.skc_v6_rcv_saddr,
                daddr: sk_common.skc_v6_daddr,
            },
        };

        Some(SockSnapshot {
            addrs,
            dport: u16::from_be(sk_common.skc_dport),
        })
    }
}
