//! analyze_ids - track identifier changes and swaps against MOT ground truth

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use zone_analytics::analysis::id_consistency::DEFAULT_MAX_DISTANCE;
use zone_analytics::analysis::IdAnalyzer;
use zone_analytics::mot;
use zone_analytics::track::TrackedObject;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// MOT ground-truth file.
    #[arg(long)]
    ground_truth_path: PathBuf,
    /// Class labels, indexed by the ground-truth class column.
    #[arg(long, num_args = 1.., default_value = "person")]
    labels: Vec<String>,
    /// Tracking results: occupancyd JSON lines, or MOT text.
    #[arg(long)]
    results_path: PathBuf,
    /// Only analyze this stream of a JSON-lines results file.
    #[arg(long)]
    stream: Option<String>,
    /// Directory for id_changes.csv and id_swaps.csv.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Maximum centroid distance in pixels for a track to match ground truth.
    #[arg(long, default_value_t = DEFAULT_MAX_DISTANCE)]
    max_distance: f32,
    /// Added to JSON-lines frame indices to reach ground-truth frame numbers.
    #[arg(long, default_value_t = 1)]
    frame_offset: u64,
    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.max_distance.is_nan() || args.max_distance <= 0.0 {
        return Err(anyhow!("--max-distance must be positive"));
    }
    let ui = ui::Ui::new(args.ui);

    let ground_truth = {
        let _stage = ui.stage("Read ground truth");
        mot::group_by_frame(mot::read_file(&args.ground_truth_path)?)
    };
    let results = {
        let _stage = ui.stage("Read tracking results");
        mot::load_results(&args.results_path, args.stream.as_deref(), args.frame_offset)?
    };

    let mut analyzer = IdAnalyzer::new(ground_truth, args.labels.clone(), args.max_distance);
    {
        let stage = ui.frames("Match tracks", results.len() as u64);
        for (frame, records) in &results {
            let tracks: Vec<TrackedObject> =
                records.iter().map(|r| r.to_tracked(&args.labels)).collect();
            analyzer.update(*frame, &tracks);
            stage.inc();
        }
    }

    let report = analyzer.into_report();
    let (changes_path, swaps_path) = report.write_to_dir(&args.output_dir)?;
    log::info!(
        "{} frames, {} matches, {} id changes, {} id swaps",
        report.frames,
        report.matches,
        report.changes.len(),
        report.swaps.len()
    );
    log::info!("wrote {} and {}", changes_path.display(), swaps_path.display());
    Ok(())
}
