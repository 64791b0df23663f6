//! Bounded event channel between the per-CPU readers and the consumer
//!
//! Many producers, one consumer. Producers never wait: when the channel is
//! full the newest record is dropped and counted. The consumer sees pending
//! drops as a single [`ChannelRecord::Lost`] before the next sample.
//! [`EventChannel::close`] wakes a waiting consumer with
//! [`ChannelRecord::Closed`].

use bytes::Bytes;
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::Notify;

/// Default number of records buffered between readers and the consumer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// What one read from the channel yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRecord {
    /// One raw record
    Sample(Bytes),
    /// Records dropped since the last read
    Lost(u64),
    /// The channel was closed, no more records will follow
    Closed,
}

#[derive(Default)]
struct Ring {
    queue: VecDeque<Bytes>,
    lost: u64,
    closed: bool,
}

/// Fixed-capacity, drop-on-full record channel
pub struct EventChannel {
    capacity: usize,
    ring: Mutex<Ring>,
    notify: Notify,
}

impl EventChannel {
    /// Create a channel holding at most `capacity` records (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: Mutex::new(Ring {
                queue: VecDeque::with_capacity(capacity),
                ..Ring::default()
            }),
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ring(&self) -> MutexGuard<'_, Ring> {
        // The ring holds plain data, a panicking holder cannot break it
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a record without waiting
    ///
    /// Returns false when the record was dropped: counted as lost when the
    /// channel is full, silently discarded once the channel is closed.
    pub fn publish(&self, record: Bytes) -> bool {
        {
            let mut ring = self.ring();
            if ring.closed {
                return false;
            }
            if ring.queue.len() >= self.capacity {
                ring.lost = ring.lost.saturating_add(1);
                drop(ring);
                self.notify.notify_one();
                return false;
            }
            ring.queue.push_back(record);
        }
        self.notify.notify_one();
        true
    }

    /// Add records lost upstream (e.g. by the kernel perf ring)
    pub fn report_lost(&self, count: u64) {
        if count == 0 {
            return;
        }
        {
            let mut ring = self.ring();
            if ring.closed {
                return;
            }
            ring.lost = ring.lost.saturating_add(count);
        }
        self.notify.notify_one();
    }

    /// Take the next record if one is ready
    ///
    /// Pending losses are reported before any queued sample.
    pub fn try_read(&self) -> Option<ChannelRecord> {
        let mut ring = self.ring();
        if ring.closed {
            return Some(ChannelRecord::Closed);
        }
        if ring.lost > 0 {
            let lost = std::mem::take(&mut ring.lost);
            return Some(ChannelRecord::Lost(lost));
        }
        ring.queue.pop_front().map(ChannelRecord::Sample)
    }

    /// Wait for the next record, loss notification or close
    pub async fn read(&self) -> ChannelRecord {
        loop {
            // Register interest before checking so a publish in between
            // leaves a permit behind
            let notified = self.notify.notified();
            if let Some(record) = self.try_read() {
                return record;
            }
            notified.await;
        }
    }

    /// Close the channel and wake the consumer
    ///
    /// Queued records are discarded. Idempotent.
    pub fn close(&self) {
        {
            let mut ring = self.ring();
            ring.closed = true;
            ring.queue.clear();
            ring.lost = 0;
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.ring().closed
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.ring().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops not yet reported to the consumer
    pub fn lost(&self) -> u64 {
        self.ring().lost
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}
