//! # Strata SEI Node
//!
//! Standalone driver for the SEI metadata injector. Runs the injector
//! against a simulated H.264 encoder, self-tests the per-frame hook, and
//! reads injected metadata back out of recorded streams.
//!
//! ## Usage
//!
//! ```bash
//! # Simulated 30 fps stream, keyframe every second, log stats
//! strata-sei-node run --fps 30 --gop 30
//!
//! # Record 300 frames of Annex B H.264 with injected metadata
//! strata-sei-node run --frames 300 --output stream.h264
//!
//! # Push one message through the fake SPS/PPS/IDR frame
//! strata-sei-node test-hook --text "hello"
//!
//! # Dump every Strata SEI payload in a recording
//! strata-sei-node inspect stream.h264
//!
//! # Custom queue limits / UUID
//! strata-sei-node --config sei.toml run
//! ```

mod synth;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use clap::{Parser, Subcommand};
use strata_sei::sei::extract_user_data;
use strata_sei::{SeiConfig, SeiPublisher};
use tracing_subscriber::EnvFilter;

use crate::synth::FrameSynth;

/// Strata SEI metadata injector node.
#[derive(Parser, Debug)]
#[command(name = "strata-sei-node", about = "Strata SEI metadata injector")]
struct Cli {
    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the injector with a simulated encoder.
    Run {
        /// Frame rate of the simulated encoder.
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Frames per GOP (one keyframe every `gop` frames).
        #[arg(long, default_value_t = 30)]
        gop: u64,

        /// Stop after this many frames.
        #[arg(long)]
        frames: Option<u64>,

        /// Write the processed Annex B stream to this file.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Interval between published messages, in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        interval_ms: u64,
    },

    /// Run one fake SPS/PPS/IDR frame through the hook.
    TestHook {
        /// Text message to enqueue first.
        #[arg(long)]
        text: Option<String>,
    },

    /// Print every injected payload found in an Annex B file.
    Inspect {
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            fps,
            gop,
            frames,
            output,
            interval_ms,
        } => run(
            config,
            RunArgs {
                fps,
                gop,
                frames,
                output,
                interval: Duration::from_millis(interval_ms.max(1)),
            },
        ),
        Command::TestHook { text } => test_hook(config, text.as_deref()),
        Command::Inspect { file } => inspect(&config, &file),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SeiConfig> {
    let Some(path) = path else {
        return Ok(SeiConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
    let config = SeiConfig::from_toml_str(&raw)?;
    tracing::info!(path = %path.display(), uuid = %config.uuid_string(), "config loaded");
    Ok(config)
}

// ─── run ────────────────────────────────────────────────────────────────────

struct RunArgs {
    fps: u32,
    gop: u64,
    frames: Option<u64>,
    output: Option<PathBuf>,
    interval: Duration,
}

fn run(config: SeiConfig, args: RunArgs) -> anyhow::Result<()> {
    let fps = args.fps.max(1);
    tracing::info!(
        fps,
        gop = args.gop,
        frames = ?args.frames,
        output = ?args.output,
        interval_ms = args.interval.as_millis() as u64,
        "strata-sei-node starting"
    );

    let publisher = Arc::new(SeiPublisher::new(config));

    // ── Graceful shutdown ───────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutting down...");
            running.store(false, Ordering::Relaxed);
        })?;
    }

    // ── Output sink ─────────────────────────────────────────────
    let mut sink: Box<dyn OutputSink + Send> = match &args.output {
        Some(path) => Box::new(FileSink::open(path)?),
        None => Box::new(NullSink::new()),
    };
    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Bytes>(64);

    let sink_thread = thread::Builder::new()
        .name("sink".into())
        .spawn(move || -> anyhow::Result<(u64, u64)> {
            let mut frames = 0u64;
            let mut bytes = 0u64;
            for frame in frame_rx {
                sink.write(&frame)?;
                frames += 1;
                bytes += frame.len() as u64;
            }
            sink.flush()?;
            Ok((frames, bytes))
        })?;

    // ── Message producer ────────────────────────────────────────
    let producer_thread = {
        let publisher = publisher.clone();
        let running = running.clone();
        let interval = args.interval;
        thread::Builder::new()
            .name("sei-publisher".into())
            .spawn(move || publish_loop(&publisher, &running, interval))?
    };

    // ── Simulated encoder ───────────────────────────────────────
    let encoder_thread = {
        let publisher = publisher.clone();
        let running = running.clone();
        let frame_interval = Duration::from_secs(1) / fps;
        let limit = args.frames;
        let mut synth = FrameSynth::new(args.gop);
        thread::Builder::new()
            .name("encoder".into())
            .spawn(move || {
                let mut next = Instant::now();
                let mut produced = 0u64;
                while running.load(Ordering::Relaxed) && limit.map_or(true, |n| produced < n) {
                    let frame = synth.next_frame();
                    let out = match publisher.process_frame(&frame) {
                        Ok(processed) => processed.data,
                        Err(e) => {
                            tracing::warn!(error = %e, "SEI hook failed, forwarding original frame");
                            Bytes::from(frame)
                        }
                    };
                    if frame_tx.send(out).is_err() {
                        tracing::error!("sink closed, stopping encoder");
                        break;
                    }
                    produced += 1;

                    next += frame_interval;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                produced
            })?
    };

    // ── Main loop: stats ────────────────────────────────────────
    let stats_interval = Duration::from_secs(5);
    let mut last_stats_log = Instant::now();
    while running.load(Ordering::Relaxed) && !encoder_thread.is_finished() {
        thread::sleep(Duration::from_millis(100));
        if last_stats_log.elapsed() >= stats_interval {
            log_stats(&publisher);
            last_stats_log = Instant::now();
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────
    running.store(false, Ordering::Relaxed);
    let produced = encoder_thread
        .join()
        .map_err(|_| anyhow::anyhow!("encoder thread panicked"))?;
    producer_thread
        .join()
        .map_err(|_| anyhow::anyhow!("publisher thread panicked"))?;
    let (frames, bytes) = sink_thread
        .join()
        .map_err(|_| anyhow::anyhow!("sink thread panicked"))??;

    log_stats(&publisher);
    publisher.shutdown();
    tracing::info!(produced, frames, bytes, "strata-sei-node stopped");
    Ok(())
}

/// Rotate through the three envelope kinds until `running` clears.
fn publish_loop(publisher: &SeiPublisher, running: &AtomicBool, interval: Duration) {
    let started = Instant::now();
    let mut next = Instant::now() + interval;
    let mut seq = 0u64;

    while running.load(Ordering::Relaxed) {
        if Instant::now() < next {
            thread::sleep(Duration::from_millis(50).min(interval));
            continue;
        }
        next += interval;

        let result = match seq % 3 {
            0 => publisher.enqueue_text(&format!("strata-sei-node heartbeat #{}", seq)),
            1 => publisher.enqueue_structured("node", &format!("periodic update #{}", seq)),
            _ => publisher.enqueue_status("uptime_s", started.elapsed().as_secs() as i64),
        };
        match result {
            Ok(()) => tracing::debug!(seq, "published SEI message"),
            Err(e) => tracing::warn!(seq, error = %e, "failed to publish SEI message"),
        }
        seq += 1;
    }
}

fn log_stats(publisher: &SeiPublisher) {
    match (publisher.stats(), publisher.queue_size()) {
        (Ok(stats), Ok(queued)) => tracing::info!(
            frames = stats.frames_processed,
            sei_units = stats.sei_units_inserted,
            sei_bytes = stats.total_sei_bytes,
            bytes_per_unit = stats.bytes_per_unit(),
            queued,
            capacity = publisher.store().capacity(),
            "SEI stats"
        ),
        (Err(e), _) | (_, Err(e)) => tracing::warn!(error = %e, "SEI stats unavailable"),
    }
}

// ─── test-hook ──────────────────────────────────────────────────────────────

fn test_hook(config: SeiConfig, text: Option<&str>) -> anyhow::Result<()> {
    let publisher = SeiPublisher::new(config);
    if let Some(text) = text {
        publisher.enqueue_text(text)?;
    }

    let frame = synth::test_keyframe();
    let out = publisher.process_frame(&frame)?;
    println!("input:  {} bytes", frame.len());
    println!(
        "output: {} bytes (+{}), {} message(s) inserted",
        out.len(),
        out.len().saturating_sub(frame.len()),
        out.messages_inserted
    );
    for (i, payload) in extract_user_data(&out.data, &publisher.config().uuid).iter().enumerate() {
        println!("  sei[{}]: {}", i, String::from_utf8_lossy(payload));
    }

    let stats = publisher.stats()?;
    println!(
        "stats: frames={} sei_units={} sei_bytes={}",
        stats.frames_processed, stats.sei_units_inserted, stats.total_sei_bytes
    );
    publisher.shutdown();
    Ok(())
}

// ─── inspect ────────────────────────────────────────────────────────────────

fn inspect(config: &SeiConfig, file: &Path) -> anyhow::Result<()> {
    let data = std::fs::read(file)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", file.display(), e))?;
    let payloads = extract_user_data(&data, &config.uuid);
    tracing::info!(
        file = %file.display(),
        bytes = data.len(),
        uuid = %config.uuid_string(),
        found = payloads.len(),
        "inspected stream"
    );

    let mut stdout = std::io::stdout().lock();
    for payload in &payloads {
        writeln!(stdout, "{}", String::from_utf8_lossy(payload))?;
    }
    Ok(())
}

// ─── Output Sinks ───────────────────────────────────────────────────────────

trait OutputSink {
    fn write(&mut self, data: &[u8]) -> anyhow::Result<()>;

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Discards output, just logs stats (monitor mode).
struct NullSink;

impl NullSink {
    fn new() -> Self {
        tracing::info!("output: monitor mode (set --output to capture)");
        NullSink
    }
}

impl OutputSink for NullSink {
    fn write(&mut self, _data: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes the raw Annex B stream to a file.
struct FileSink {
    file: std::io::BufWriter<std::fs::File>,
}

impl FileSink {
    fn open(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::create(path)?;
        tracing::info!(path = %path.display(), "output: writing H.264 Annex B to file");
        Ok(FileSink {
            file: std::io::BufWriter::new(file),
        })
    }
}

impl OutputSink for FileSink {
    fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
