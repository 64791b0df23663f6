//! Event reading from eBPF perf buffers
//!
//! One task per online CPU drains that CPU's perf ring and feeds the shared
//! [`EventChannel`]. Kernel-side drops are forwarded as loss counts.

use crate::channel::EventChannel;
use anyhow::{Context, Result};
use aya::{
    maps::{perf::AsyncPerfEventArray, MapData},
    util::online_cpus,
};
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use std::sync::Arc;
use tcpconnect_common::constants::EVENT_SIZE;
use tokio::task::JoinHandle;

/// Number of samples read from a perf ring per wakeup
const READ_BATCH: usize = 10;

/// Event processor that reads from perf buffers
pub struct EventProcessor {
    channel: Arc<EventChannel>,
    readers: Vec<JoinHandle<()>>,
}

impl EventProcessor {
    /// Create a new event processor feeding `channel`
    pub fn new(channel: Arc<EventChannel>) -> Self {
        Self {
            channel,
            readers: Vec::new(),
        }
    }

    /// Spawn per-CPU event readers
    ///
    /// Creates a task for each CPU to read events from its perf buffer.
    pub fn spawn_cpu_readers(&mut self, mut perf_array: AsyncPerfEventArray<MapData>) -> Result<()> {
        let cpus = online_cpus().context("Failed to list online CPUs")?;
        info!("Spawning event readers for {} CPUs", cpus.len());

        for cpu_id in cpus {
            let mut buf = perf_array
                .open(cpu_id, None)
                .with_context(|| format!("Failed to open perf buffer for CPU {}", cpu_id))?;
            let channel = Arc::clone(&self.channel);

            self.readers.push(tokio::spawn(async move {
                // Pre-allocate buffers for reading events
                let mut buffers = (0..READ_BATCH)
                    .map(|_| BytesMut::with_capacity(EVENT_SIZE))
                    .collect::<Vec<_>>();

                while !channel.is_closed() {
                    let events = match buf.read_events(&mut buffers).await {
                        Ok(events) => events,
                        Err(e) => {
                            warn!("Error reading events from CPU {}: {}", cpu_id, e);
                            continue;
                        }
                    };

                    if events.lost > 0 {
                        channel.report_lost(events.lost as u64);
                    }

                    for buf in buffers.iter().take(events.read) {
                        channel.publish(Bytes::copy_from_slice(buf));
                    }
                }

                debug!("Reader for CPU {} stopped", cpu_id);
            }));
        }

        Ok(())
    }

    /// Number of running reader tasks
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// Stop all reader tasks
    ///
    /// Readers may be parked inside the perf ring wait, so they are aborted
    /// rather than joined.
    pub fn shutdown(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

impl Drop for EventProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
