//! tcpconnect - Userspace Program
//!
//! Loads the connect tracing eBPF program, attaches the kprobes, and reports
//! one line per outbound TCP connect attempt.
//!
//! ## Usage
//!
//! ```bash
//! # Trace until Ctrl-C, text output
//! sudo ./tcpconnect --ebpf-object path/to/tcpconnect
//!
//! # JSON lines into a file for 60 seconds
//! sudo ./tcpconnect --ebpf-object path/to/tcpconnect --format json --output connects.jsonl --duration 60
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::{fs::File, io::LineWriter, path::PathBuf, sync::Arc, time::Duration};
use tcpconnect::{
    channel::{EventChannel, DEFAULT_CHANNEL_CAPACITY},
    consumer::{run_consumer, ConsumerStats},
    events::EventProcessor,
    loader::ProbeLoader,
    sink::{JsonLinesSink, LogSink, ReportSink, SinkType},
};
use tokio::{signal, time::sleep};

/// Trace outbound TCP connect attempts using eBPF
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to eBPF object file (if not embedded)
    #[clap(long)]
    ebpf_object: Option<PathBuf>,

    /// Output format (log, json)
    #[clap(short, long, default_value = "log")]
    format: String,

    /// Output file for JSON lines (stdout when absent)
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Duration to run the tracer (in seconds, 0 = until Ctrl-C)
    #[clap(short, long, default_value_t = 0)]
    duration: u64,

    /// Records buffered between the perf readers and the consumer
    #[clap(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    /// Verbose logging
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    if args.channel_capacity == 0 {
        anyhow::bail!("Channel capacity must be >= 1");
    }
    let format: SinkType = args.format.parse()?;
    let mut sink = build_sink(format, args.output.as_ref())?;

    raise_memlock_rlimit();

    let mut loader = ProbeLoader::load(args.ebpf_object.clone())?;
    loader.init_logger();

    // Detaches whatever attached before returning the error
    loader.attach_kprobes()?;

    let channel = Arc::new(EventChannel::with_capacity(args.channel_capacity));
    let mut processor = EventProcessor::new(Arc::clone(&channel));

    let started = loader
        .take_events()
        .and_then(|perf_array| processor.spawn_cpu_readers(perf_array));
    if let Err(e) = started {
        loader.detach_all();
        return Err(e);
    }

    let consumer = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { run_consumer(&channel, sink.as_mut()).await }
    });

    info!("Waiting for events...");

    if args.duration > 0 {
        tokio::select! {
            _ = sleep(Duration::from_secs(args.duration)) => {
                info!("Duration reached, shutting down...");
            }
            _ = signal::ctrl_c() => {
                info!("Interrupted, shutting down...");
            }
        }
    } else {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Interrupted, shutting down...");
    }

    // Detach first so no new events race the close
    let detached = loader.detach_all();
    info!("Detached {} probes", detached);
    channel.close();
    processor.shutdown();

    let stats = consumer.await.context("Consumer task failed")?;
    print_summary(&stats);

    Ok(())
}

fn build_sink(format: SinkType, output: Option<&PathBuf>) -> Result<Box<dyn ReportSink>> {
    Ok(match (format, output) {
        (SinkType::Log, Some(path)) => {
            warn!("--output {:?} ignored for log format", path);
            Box::new(LogSink::new())
        }
        (SinkType::Log, None) => Box::new(LogSink::new()),
        (SinkType::Json, Some(path)) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            Box::new(JsonLinesSink::new(LineWriter::new(file)))
        }
        (SinkType::Json, None) => Box::new(JsonLinesSink::new(std::io::stdout())),
    })
}

/// Lift RLIMIT_MEMLOCK so older kernels can pin the maps
///
/// Kernels with memcg-based accounting ignore the limit, so failure is only
/// a warning.
fn raise_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!("Failed to remove limit on locked memory (ret={})", ret);
    }
}

fn print_summary(stats: &ConsumerStats) {
    info!("");
    info!("  Events reported:  {}", stats.events);
    info!("  Records lost:     {}", stats.lost);
    info!("  Decode errors:    {}", stats.decode_errors);
}
