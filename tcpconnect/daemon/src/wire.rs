//! Wire codec for [`ConnectEvent`] records
//!
//! Records are read field by field in little-endian order instead of casting
//! the perf sample, so a short or misaligned sample becomes a
//! [`DecodeError`] rather than undefined behaviour. Perf samples are padded
//! by the kernel; bytes past [`EVENT_SIZE`] are ignored.

use crate::{error::DecodeError, types::ConnectEvent};
use bytes::{Buf, BufMut, BytesMut};
use tcpconnect_common::constants::{EVENT_SIZE, TASK_COMM_LEN};

/// Decode one raw record
pub fn decode(raw: &[u8]) -> Result<ConnectEvent, DecodeError> {
    if raw.len() < EVENT_SIZE {
        return Err(DecodeError::Truncated {
            len: raw.len(),
            expected: EVENT_SIZE,
        });
    }

    let mut buf = &raw[..EVENT_SIZE];
    let mut event = ConnectEvent::zeroed();

    event.saddr_v4 = buf.get_u32_le();
    buf.copy_to_slice(&mut event.saddr_v6);
    event.daddr_v4 = buf.get_u32_le();
    buf.copy_to_slice(&mut event.daddr_v6);
    buf.copy_to_slice(&mut event.comm[..TASK_COMM_LEN]);
    event.ts_us = buf.get_u64_le();
    event.af = buf.get_i64_le();
    event.pid = buf.get_u32_le();
    event.uid = buf.get_u32_le();
    event.dport = buf.get_u16_le();
    buf.copy_to_slice(&mut event._padding);

    Ok(event)
}

/// Encode a record exactly as the eBPF program lays it out
pub fn encode(event: &ConnectEvent) -> BytesMut {
    let mut buf = BytesMut::with_capacity(EVENT_SIZE);

    buf.put_u32_le(event.saddr_v4);
    buf.put_slice(&event.saddr_v6);
    buf.put_u32_le(event.daddr_v4);
    buf.put_slice(&event.daddr_v6);
    buf.put_slice(&event.comm);
    buf.put_u64_le(event.ts_us);
    buf.put_i64_le(event.af);
    buf.put_u32_le(event.pid);
    buf.put_u32_le(event.uid);
    buf.put_u16_le(event.dport);
    buf.put_slice(&event._padding);

    buf
}
