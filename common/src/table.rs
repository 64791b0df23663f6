//! Fixed-capacity context table
//!
//! Open-addressing hash table over a fixed array of atomic slots, keyed by
//! execution context id. No allocation, no locks: each slot's key is claimed
//! and released with compare-and-swap, so operations on different keys never
//! interfere. Operations on the same key are assumed to be serialized, which
//! holds for `pid_tgid` keys because a thread cannot be inside two connect
//! calls at once.
//!
//! Deleted slots become tombstones and are reused by later inserts. Lookups
//! probe at most `N` slots.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::correlate::ContextMap;

const EMPTY: u64 = u64::MAX;
const TOMBSTONE: u64 = u64::MAX - 1;

struct Slot {
    key: AtomicU64,
    sock: AtomicU64,
}

impl Slot {
    const fn new() -> Self {
        Self {
            key: AtomicU64::new(EMPTY),
            sock: AtomicU64::new(0),
        }
    }
}

/// Lock-free `ctx_id -> sock` table with `N` slots
pub struct ContextTable<const N: usize> {
    slots: [Slot; N],
    len: AtomicUsize,
}

#[allow(clippy::declare_interior_mutable_const)]
const VACANT: Slot = Slot::new();

impl<const N: usize> ContextTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [VACANT; N],
            len: AtomicUsize::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    fn home(ctx_id: u64) -> usize {
        // Fibonacci hashing, pid_tgid values are clustered
        (ctx_id.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize % N
    }

    /// Insert or overwrite, false when the key is reserved or the table is full
    pub fn insert(&self, ctx_id: u64, sock: u64) -> bool {
        if N == 0 || ctx_id >= TOMBSTONE {
            return false;
        }
        let home = Self::home(ctx_id);

        // Overwrite an existing entry for this key first
        for i in 0..N {
            let slot = &self.slots[(home + i) % N];
            match slot.key.load(Ordering::Acquire) {
                EMPTY => break,
                k if k == ctx_id => {
                    slot.sock.store(sock, Ordering::Release);
                    return true;
                }
                _ => {}
            }
        }

        // Claim the first free slot along the probe sequence
        for i in 0..N {
            let slot = &self.slots[(home + i) % N];
            let current = slot.key.load(Ordering::Acquire);
            if current != EMPTY && current != TOMBSTONE {
                continue;
            }
            if slot
                .key
                .compare_exchange(current, ctx_id, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                slot.sock.store(sock, Ordering::Release);
                self.len.fetch_add(1, Ordering::AcqRel);
                return true;
            }
        }

        false
    }

    /// Look up without removing
    pub fn get(&self, ctx_id: u64) -> Option<u64> {
        self.find(ctx_id)
            .map(|slot| slot.sock.load(Ordering::Acquire))
    }

    /// Look up and remove
    pub fn remove(&self, ctx_id: u64) -> Option<u64> {
        let slot = self.find(ctx_id)?;
        let sock = slot.sock.load(Ordering::Acquire);
        slot.key
            .compare_exchange(ctx_id, TOMBSTONE, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(sock)
    }

    fn find(&self, ctx_id: u64) -> Option<&Slot> {
        if N == 0 || ctx_id >= TOMBSTONE {
            return None;
        }
        let home = Self::home(ctx_id);
        for i in 0..N {
            let slot = &self.slots[(home + i) % N];
            match slot.key.load(Ordering::Acquire) {
                EMPTY => return None,
                k if k == ctx_id => return Some(slot),
                _ => {}
            }
        }
        None
    }
}

impl<const N: usize> Default for ContextTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ContextMap for ContextTable<N> {
    fn record(&self, ctx_id: u64, sock: u64) -> bool {
        self.insert(ctx_id, sock)
    }

    fn take(&self, ctx_id: u64) -> Option<u64> {
        self.remove(ctx_id)
    }
}
