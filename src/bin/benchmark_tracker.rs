//! benchmark_tracker - HOTA, CLEAR and Identity tracking metrics as a JSON report

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use zone_analytics::analysis::{evaluate, MetricFamily};
use zone_analytics::mot;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// MOT ground-truth file.
    #[arg(long)]
    ground_truth_path: PathBuf,
    /// Tracking results: occupancyd JSON lines, or MOT text.
    #[arg(long)]
    results_path: PathBuf,
    /// Only evaluate this stream of a JSON-lines results file.
    #[arg(long)]
    stream: Option<String>,
    /// Metric families (HOTA, CLEAR, Identity). VACE is not supported.
    #[arg(long, num_args = 1.., default_values = ["HOTA", "CLEAR", "Identity"])]
    metrics: Vec<String>,
    #[arg(long, default_value = "tracker-benchmark.json")]
    output_path: PathBuf,
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
    let families = args
        .metrics
        .iter()
        .map(|m| MetricFamily::parse(m))
        .collect::<Result<Vec<_>>>()?;
    let ui = ui::Ui::new(args.ui);

    let ground_truth = {
        let _stage = ui.stage("Read ground truth");
        mot::group_by_frame(mot::read_file(&args.ground_truth_path)?)
    };
    let results = {
        let _stage = ui.stage("Read tracking results");
        mot::load_results(&args.results_path, args.stream.as_deref(), args.frame_offset)?
    };

    let report = {
        let _stage = ui.stage("Evaluate");
        evaluate(&ground_truth, &results, &families)
    };
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.output_path, format!("{json}\n"))
        .map_err(|e| anyhow!("failed to write {}: {}", args.output_path.display(), e))?;

    if let Some(hota) = &report.hota {
        log::info!(
            "HOTA={:.3} DetA={:.3} AssA={:.3} LocA={:.3}",
            hota.hota,
            hota.det_a,
            hota.ass_a,
            hota.loc_a
        );
    }
    if let Some(clear) = &report.clear {
        log::info!(
            "MOTA={:.3} MOTP={:.3} FP={} FN={} IDSW={}",
            clear.mota,
            clear.motp,
            clear.fp,
            clear.fn_,
            clear.idsw
        );
    }
    if let Some(identity) = &report.identity {
        log::info!(
            "IDF1={:.3} IDTP={} IDFP={} IDFN={}",
            identity.idf1,
            identity.idtp,
            identity.idfp,
            identity.idfn
        );
    }
    log::info!("wrote {}", args.output_path.display());
    Ok(())
}
