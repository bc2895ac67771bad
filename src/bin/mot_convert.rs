//! mot_convert - tracking results (JSON lines) to MOT text

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use zone_analytics::mot::{self, MotRecord};
use zone_analytics::read_results;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Results file written by occupancyd (`output.results_path`).
    #[arg(long)]
    results_path: PathBuf,
    /// MOT text file to write.
    #[arg(long, default_value = "tracking-results.txt")]
    output_path: PathBuf,
    /// Only convert this stream.
    #[arg(long)]
    stream: Option<String>,
    /// Added to each zero-based frame index (MOT frames start at 1).
    #[arg(long, default_value_t = 0)]
    frame_offset: u64,
    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui);

    let frames = {
        let _stage = ui.stage("Read tracking results");
        read_results(&args.results_path, args.stream.as_deref())?
    };
    if frames.is_empty() {
        return Err(anyhow!(
            "no frames in {}{}",
            args.results_path.display(),
            args.stream
                .as_deref()
                .map(|s| format!(" for stream '{}'", s))
                .unwrap_or_default()
        ));
    }

    let records: Vec<MotRecord> = frames
        .iter()
        .flat_map(|frame| {
            frame
                .objects
                .iter()
                .map(|object| MotRecord::from_tracked(frame.frame_index + args.frame_offset, object))
        })
        .collect();
    {
        let _stage = ui.stage("Write MOT file");
        mot::write_file(&args.output_path, &records)?;
    }
    log::info!(
        "wrote {} records from {} frames to {}",
        records.len(),
        frames.len(),
        args.output_path.display()
    );
    Ok(())
}
