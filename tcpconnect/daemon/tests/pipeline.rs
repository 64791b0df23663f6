//! End-to-end tests of the tracing pipeline on the host
//!
//! The kernel half is driven through the same correlation handlers the eBPF
//! program uses, with a `ContextTable` in place of the BPF hash map and an
//! in-memory socket arena in place of kernel memory.

use bytes::Bytes;
use std::{collections::HashMap, net::IpAddr, sync::Arc, thread};
use tcpconnect::{
    channel::EventChannel,
    consumer::{run_consumer, ConsumerStats},
    error::DecodeError,
    sink::ReportSink,
    types::ConnectionEvent,
    wire,
};
use tcpconnect_common::{
    handle_entry, handle_return, AddressFamily, ContextTable, SockAddrs, SockReader,
    SockSnapshot, TaskInfo,
};

#[derive(Default)]
struct Recorder {
    events: Vec<ConnectionEvent>,
    lost: Vec<u64>,
    errors: Vec<DecodeError>,
}

impl ReportSink for Recorder {
    fn on_event(&mut self, event: &ConnectionEvent) {
        self.events.push(event.clone());
    }

    fn on_lost(&mut self, count: u64) {
        self.lost.push(count);
    }

    fn on_decode_error(&mut self, err: &DecodeError) {
        self.errors.push(err.clone());
    }
}

/// Sockets by handle, as the kernel would have filled them by connect return
#[derive(Default)]
struct SockArena(HashMap<u64, SockSnapshot>);

impl SockArena {
    fn v4(mut self, handle: u64, saddr: [u8; 4], daddr: [u8; 4], dport: u16) -> Self {
        self.0.insert(
            handle,
            SockSnapshot {
                addrs: SockAddrs::V4 {
                    saddr: u32::from_le_bytes(saddr),
                    daddr: u32::from_le_bytes(daddr),
                },
                dport,
            },
        );
        self
    }

    fn v6(mut self, handle: u64, saddr: &str, daddr: &str, dport: u16) -> Self {
        let saddr: std::net::Ipv6Addr = saddr.parse().unwrap();
        let daddr: std::net::Ipv6Addr = daddr.parse().unwrap();
        self.0.insert(
            handle,
            SockSnapshot {
                addrs: SockAddrs::V6 {
                    saddr: saddr.octets(),
                    daddr: daddr.octets(),
                },
                dport,
            },
        );
        self
    }
}

impl SockReader for SockArena {
    fn snapshot(&self, sock: u64, family: AddressFamily) -> Option<SockSnapshot> {
        self.0
            .get(&sock)
            .copied()
            .filter(|snapshot| snapshot.family() == family)
    }
}

/// Host stand-in for the probe side: correlation table + event publishing
struct Probes {
    table: ContextTable<64>,
    socks: SockArena,
    channel: Arc<EventChannel>,
}

impl Probes {
    fn new(socks: SockArena, channel: Arc<EventChannel>) -> Self {
        Self {
            table: ContextTable::new(),
            socks,
            channel,
        }
    }

    fn entry(&self, ctx_id: u64, sock: u64) {
        assert!(handle_entry(&self.table, ctx_id, sock));
    }

    fn ret(&self, ctx_id: u64, family: AddressFamily) -> bool {
        let event = handle_return(&self.table, &self.socks, ctx_id, family, || task(ctx_id));
        match event {
            Some(event) => {
                self.channel.publish(wire::encode(&event).freeze());
                true
            }
            None => false,
        }
    }
}

fn task(ctx_id: u64) -> TaskInfo {
    let mut comm = [0u8; 16];
    comm[..6].copy_from_slice(b"client");
    TaskInfo {
        comm,
        pid: (ctx_id >> 32) as u32,
        uid: 1000,
        ts_us: ctx_id & 0xffff,
    }
}

/// Run the consumer until everything published so far has been handled
async fn drain(channel: &EventChannel, sink: &mut Recorder) -> ConsumerStats {
    let consume = run_consumer(channel, sink);
    let close = async {
        while !channel.is_empty() || channel.lost() > 0 {
            tokio::task::yield_now().await;
        }
        channel.close();
    };
    let (stats, ()) = tokio::join!(consume, close);
    stats
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn interleaved_v4_and_v6_calls_report_in_return_order() {
    const HANDLE_A: u64 = 0xffff_8880_0000_1000;
    const HANDLE_B: u64 = 0xffff_8880_0000_2000;
    let ctx_x = (100u64 << 32) | 100;
    let ctx_y = (200u64 << 32) | 201;

    let socks = SockArena::default()
        .v4(HANDLE_A, [10, 0, 0, 2], [10, 0, 0, 1], 80)
        .v6(HANDLE_B, "fd00::2", "fd00::1", 443);
    let channel = Arc::new(EventChannel::with_capacity(16));
    let probes = Probes::new(socks, Arc::clone(&channel));

    probes.entry(ctx_x, HANDLE_A);
    probes.entry(ctx_y, HANDLE_B);
    assert!(probes.ret(ctx_y, AddressFamily::Inet6));
    assert!(probes.ret(ctx_x, AddressFamily::Inet));
    assert!(probes.table.is_empty());

    let mut sink = Recorder::default();
    let stats = drain(&channel, &mut sink).await;

    assert_eq!(stats.events, 2);
    assert_eq!(sink.events.len(), 2);

    let first = &sink.events[0];
    assert_eq!(first.ip, 6);
    assert_eq!(first.saddr, ip("fd00::2"));
    assert_eq!(first.daddr, ip("fd00::1"));
    assert_eq!(first.dport, 443);
    assert_eq!(first.pid, 200);

    let second = &sink.events[1];
    assert_eq!(second.ip, 4);
    assert_eq!(second.saddr, ip("10.0.0.2"));
    assert_eq!(second.daddr, ip("10.0.0.1"));
    assert_eq!(second.dport, 80);
    assert_eq!(second.pid, 100);
    assert_eq!(second.comm, "client");
}

#[tokio::test]
async fn return_without_entry_emits_nothing() {
    let channel = Arc::new(EventChannel::with_capacity(4));
    let probes = Probes::new(SockArena::default().v4(1, [1; 4], [2; 4], 9), Arc::clone(&channel));

    assert!(!probes.ret(42, AddressFamily::Inet));
    assert!(!probes.ret(42, AddressFamily::Inet6));

    let mut sink = Recorder::default();
    let stats = drain(&channel, &mut sink).await;

    assert_eq!(stats, ConsumerStats::default());
    assert!(sink.events.is_empty());
    assert!(sink.errors.is_empty());
    assert!(sink.lost.is_empty());
}

#[tokio::test]
async fn every_event_has_consistent_family_fields() {
    let mut socks = SockArena::default();
    for handle in 0..20u64 {
        socks = if handle % 2 == 0 {
            socks.v4(handle, [192, 168, 0, handle as u8], [8, 8, 8, 8], 53)
        } else {
            socks.v6(handle, "::1", "2001:db8::53", 53)
        };
    }
    let channel = Arc::new(EventChannel::with_capacity(64));
    let probes = Probes::new(socks, Arc::clone(&channel));

    for handle in 0..20u64 {
        let ctx = (handle << 32) | handle;
        let family = if handle % 2 == 0 {
            AddressFamily::Inet
        } else {
            AddressFamily::Inet6
        };
        probes.entry(ctx, handle);
        assert!(probes.ret(ctx, family));
    }

    // Check the raw records before they are consumed
    let mut raw = Vec::new();
    while let Some(tcpconnect::ChannelRecord::Sample(bytes)) = channel.try_read() {
        raw.push(bytes);
    }
    assert_eq!(raw.len(), 20);
    for bytes in &raw {
        let event = wire::decode(bytes).unwrap();
        match event.family().unwrap() {
            AddressFamily::Inet => {
                assert_ne!(event.daddr_v4, 0);
                assert_eq!(event.saddr_v6, [0; 16]);
                assert_eq!(event.daddr_v6, [0; 16]);
            }
            AddressFamily::Inet6 => {
                assert_eq!(event.saddr_v4, 0);
                assert_eq!(event.daddr_v4, 0);
                assert_ne!(event.daddr_v6, [0; 16]);
            }
        }
    }

    for bytes in raw {
        channel.publish(bytes);
    }
    let mut sink = Recorder::default();
    let stats = drain(&channel, &mut sink).await;
    assert_eq!(stats.events, 20);
    assert_eq!(sink.events.iter().filter(|e| e.ip == 4).count(), 10);
}

#[tokio::test]
async fn full_channel_drops_and_counts() {
    const CAPACITY: usize = 5;
    const ATTEMPTS: u64 = 12;

    let mut socks = SockArena::default();
    for handle in 0..ATTEMPTS {
        socks = socks.v4(handle, [127, 0, 0, 1], [127, 0, 0, 1], 8000 + handle as u16);
    }
    let channel = Arc::new(EventChannel::with_capacity(CAPACITY));
    let probes = Probes::new(socks, Arc::clone(&channel));

    for handle in 0..ATTEMPTS {
        probes.entry(handle, handle);
        assert!(probes.ret(handle, AddressFamily::Inet));
    }
    assert_eq!(channel.len(), CAPACITY);
    assert_eq!(channel.lost(), ATTEMPTS - CAPACITY as u64);

    let mut sink = Recorder::default();
    let stats = drain(&channel, &mut sink).await;

    assert_eq!(sink.lost, vec![ATTEMPTS - CAPACITY as u64]);
    assert_eq!(stats.events, CAPACITY as u64);
    // The oldest records are the ones retained
    let ports: Vec<u16> = sink.events.iter().map(|e| e.dport).collect();
    assert_eq!(ports, vec![8000, 8001, 8002, 8003, 8004]);
}

#[tokio::test]
async fn malformed_record_does_not_stop_the_loop() {
    let channel = Arc::new(EventChannel::with_capacity(8));
    let probes = Probes::new(
        SockArena::default().v4(7, [172, 16, 0, 9], [172, 16, 0, 1], 5432),
        Arc::clone(&channel),
    );

    channel.publish(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef, 0x00]));
    probes.entry(7, 7);
    assert!(probes.ret(7, AddressFamily::Inet));

    let mut sink = Recorder::default();
    let stats = drain(&channel, &mut sink).await;

    assert_eq!(stats.decode_errors, 1);
    assert_eq!(
        sink.errors,
        vec![DecodeError::Truncated {
            len: 5,
            expected: tcpconnect_common::EVENT_SIZE
        }]
    );
    assert_eq!(sink.events.len(), 1);
    assert_eq!(sink.events[0].daddr, ip("172.16.0.1"));
    assert_eq!(sink.events[0].dport, 5432);
}

#[test]
fn concurrent_contexts_never_cross_contaminate() {
    const THREADS: u64 = 8;
    const CALLS: u64 = 500;

    // Thread t owns handle t and connects to 10.0.0.t:(1000 + t)
    let mut socks = SockArena::default();
    for t in 0..THREADS {
        socks = socks.v4(t, [10, 0, 1, t as u8], [10, 0, 0, t as u8], 1000 + t as u16);
    }
    let channel = Arc::new(EventChannel::with_capacity((THREADS * CALLS) as usize));
    let probes = Arc::new(Probes::new(socks, Arc::clone(&channel)));

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let probes = Arc::clone(&probes);
            thread::spawn(move || {
                let ctx = (t << 32) | (t + 1);
                for _ in 0..CALLS {
                    probes.entry(ctx, t);
                    assert!(probes.ret(ctx, AddressFamily::Inet));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(probes.table.is_empty());
    assert_eq!(channel.len(), (THREADS * CALLS) as usize);

    let mut seen = 0;
    while let Some(tcpconnect::ChannelRecord::Sample(bytes)) = channel.try_read() {
        let event = tcpconnect::decode_event(&bytes).unwrap();
        let t = event.pid as u64;
        assert_eq!(event.daddr, IpAddr::from([10, 0, 0, t as u8]));
        assert_eq!(event.saddr, IpAddr::from([10, 0, 1, t as u8]));
        assert_eq!(event.dport, 1000 + t as u16);
        seen += 1;
    }
    assert_eq!(seen, THREADS * CALLS);
}
