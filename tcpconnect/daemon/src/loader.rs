//! eBPF program loader
//!
//! Handles loading the eBPF program and attaching the connect kprobes and
//! kretprobes. Attachment is all or nothing: a failure detaches whatever was
//! already attached before the error is returned.

use anyhow::{Context, Result};
use aya::{
    maps::{perf::AsyncPerfEventArray, MapData},
    programs::{kprobe::KProbeLinkId, KProbe},
    Bpf,
};
use aya_log::BpfLogger;
use log::{info, warn};
use std::path::PathBuf;
use tcpconnect_common::constants::{TCP_V4_CONNECT, TCP_V6_CONNECT};

/// Program name in the eBPF object and the kernel function it attaches to
///
/// Entry probes come before their return probes so a return never fires
/// without its entry having been attached first.
pub const CONNECT_PROBES: [(&str, &str); 4] = [
    ("tcp_v4_connect", TCP_V4_CONNECT),
    ("tcp_v4_connect_ret", TCP_V4_CONNECT),
    ("tcp_v6_connect", TCP_V6_CONNECT),
    ("tcp_v6_connect_ret", TCP_V6_CONNECT),
];

/// eBPF program loader and manager
pub struct ProbeLoader {
    ebpf: Bpf,
    links: Vec<(&'static str, KProbeLinkId)>,
}

impl ProbeLoader {
    /// Load eBPF program from file or embedded bytecode
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to eBPF object file. If None, uses embedded bytecode.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        info!("Loading eBPF program...");

        let ebpf = if let Some(obj_path) = path {
            info!("Loading eBPF object from: {:?}", obj_path);
            let data = std::fs::read(&obj_path)
                .with_context(|| format!("Failed to read eBPF object file: {:?}", obj_path))?;
            Bpf::load(&data).context("Failed to load eBPF program")?
        } else {
            #[cfg(feature = "embedded")]
            {
                info!("Loading embedded eBPF program...");
                let data = include_bytes!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../kernel/target/bpfel-unknown-none/release/tcpconnect"
                ));
                Bpf::load(data).context("Failed to load embedded eBPF program")?
            }
            #[cfg(not(feature = "embedded"))]
            {
                anyhow::bail!(
                    "No eBPF object file provided. Use --ebpf-object or compile with 'embedded' feature"
                );
            }
        };

        info!("eBPF program loaded successfully");

        Ok(Self {
            ebpf,
            links: Vec::new(),
        })
    }

    /// Forward log records from the eBPF program
    ///
    /// Non-fatal if it fails.
    pub fn init_logger(&mut self) {
        if let Err(e) = BpfLogger::init(&mut self.ebpf) {
            warn!("eBPF logger not available, kernel-side logs will not be captured: {}", e);
        }
    }

    /// Attach the connect kprobes and kretprobes
    ///
    /// Attaches to:
    /// - tcp_v4_connect (entry + return)
    /// - tcp_v6_connect (entry + return)
    ///
    /// On failure every probe attached so far is detached again.
    pub fn attach_kprobes(&mut self) -> Result<()> {
        info!("Attaching connect probes...");

        for (program, function) in CONNECT_PROBES {
            if let Err(e) = self.attach_probe(program, function) {
                let rolled_back = self.detach_all();
                warn!("Attach failed, detached {} probe(s)", rolled_back);
                return Err(e);
            }
        }

        info!("All probes attached successfully");

        Ok(())
    }

    fn attach_probe(&mut self, name: &'static str, function: &str) -> Result<()> {
        let program: &mut KProbe = self
            .ebpf
            .program_mut(name)
            .with_context(|| format!("{} program not found in eBPF object", name))?
            .try_into()
            .with_context(|| format!("Failed to get {} as KProbe", name))?;
        program
            .load()
            .with_context(|| format!("Failed to load {}", name))?;
        let link = program
            .attach(function, 0)
            .with_context(|| format!("Failed to attach {} to {}", name, function))?;
        self.links.push((name, link));
        info!("  ✓ Attached {} to {}", name, function);

        Ok(())
    }

    /// Detach every attached probe
    ///
    /// Each link is released exactly once; calling again is a no-op. Returns
    /// the number of probes detached.
    pub fn detach_all(&mut self) -> usize {
        let links = std::mem::take(&mut self.links);
        let mut detached = 0;

        for (name, link) in links {
            let program: Option<&mut KProbe> = self
                .ebpf
                .program_mut(name)
                .and_then(|program| program.try_into().ok());
            match program.map(|program| program.detach(link)) {
                Some(Ok(())) => detached += 1,
                Some(Err(e)) => warn!("Failed to detach {}: {}", name, e),
                None => warn!("Failed to detach {}: program not found", name),
            }
        }

        detached
    }

    /// Number of currently attached probes
    pub fn attached_count(&self) -> usize {
        self.links.len()
    }

    /// Take the perf event array carrying connect events
    pub fn take_events(&mut self) -> Result<AsyncPerfEventArray<MapData>> {
        let map = self
            .ebpf
            .take_map("EVENTS")
            .context("EVENTS map not found in eBPF object")?;

        AsyncPerfEventArray::try_from(map)
            .context("Failed to create AsyncPerfEventArray from EVENTS map")
    }
}

impl Drop for ProbeLoader {
    fn drop(&mut self) {
        self.detach_all();
    }
}
