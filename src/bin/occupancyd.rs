//! occupancyd - zone occupancy and object lifecycle daemon
//!
//! Reads the configured streams, detects and tracks objects, and publishes
//! entry/exit/dwell events plus throttled aggregates to the configured sink.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use zone_analytics::render::TextFont;
use zone_analytics::{
    build_pipelines, open_sink, open_writer, AppConfig, DetectorRegistry, DeviceCapabilities,
    LogStreamSink, ResultsRecorder, Runtime, StopSignal, StreamCompositor, SystemClock, ZoneList,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (JSON, or TOML by extension).
    #[arg(long, env = "ZONE_ANALYTICS_CONFIG")]
    config: Option<PathBuf>,
    /// Stop after this many composite frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Print the registered model ids and exit.
    #[arg(long)]
    list_models: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let registry = DetectorRegistry::with_builtin();
    if args.list_models {
        for model in registry.list() {
            println!("{model}");
        }
        return Ok(());
    }

    let cfg = match &args.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::load()?,
    };

    let first_size = cfg.streams[0].frame_size;
    let zones = match &cfg.zones_path {
        Some(path) => ZoneList::from_file(path)?,
        None => ZoneList::empty(first_size.0, first_size.1),
    };
    log::info!(
        "{} zone(s): {}",
        zones.len(),
        zones
            .zones()
            .iter()
            .map(|z| z.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let caps = DeviceCapabilities::from_host();
    let pipelines = build_pipelines(&cfg, &zones, &registry, caps)?;
    let mut compositor = StreamCompositor::new(pipelines)?;
    match &cfg.output.font_path {
        Some(path) => {
            compositor = compositor.with_font(TextFont::load(path, cfg.output.font_size)?);
            log::info!("drawing text with font {}", path.display());
        }
        None => log::info!("no output font configured; text is kept as overlay records"),
    }

    let recorder = cfg
        .output
        .results_path
        .as_deref()
        .map(ResultsRecorder::create)
        .transpose()?;
    if let Some(path) = &cfg.output.results_path {
        log::info!("recording tracking results to {}", path.display());
    }

    let stop = StopSignal::new();
    stop.install_ctrlc()?;

    let runtime = Runtime {
        compositor,
        writer: open_writer(&cfg.output)?,
        stream_sink: Box::new(LogStreamSink::default()),
        events: open_sink(&cfg.events)?,
        recorder,
        clock: Arc::new(SystemClock),
        stop,
        max_ticks: args.max_frames,
    };

    log::info!(
        "occupancyd running: {} stream(s), events -> {:?}, throttle {:?}",
        cfg.streams.len(),
        cfg.events.sink,
        cfg.events.throttle
    );
    let stats = runtime.run()?;
    log::info!("processed {} frames", stats.frames());
    Ok(())
}
