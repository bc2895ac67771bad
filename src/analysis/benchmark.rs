//! HOTA, CLEAR MOT and Identity metrics over a ground-truth / results pair.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::hungarian;
use crate::mot::MotRecord;

/// Minimum IoU for a result box to count as a detection of a ground-truth box
/// in CLEAR and Identity.
pub const IOU_THRESHOLD: f32 = 0.5;

/// HOTA is averaged over localisation thresholds 0.05, 0.10, ..., 0.95.
const HOTA_ALPHAS: usize = 19;

fn hota_alpha(index: usize) -> f64 {
    (index + 1) as f64 * 0.05
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetricFamily {
    Hota,
    Clear,
    Identity,
}

impl MetricFamily {
    /// Case-insensitive. VACE is recognised but not implemented.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "HOTA" => Ok(Self::Hota),
            "CLEAR" => Ok(Self::Clear),
            "IDENTITY" => Ok(Self::Identity),
            "VACE" => Err(anyhow!("metric family {} is not supported", name)),
            _ => Err(anyhow!(
                "invalid metric: got '{}', expected one of [HOTA, CLEAR, Identity]",
                name
            )),
        }
    }
}

/// Higher Order Tracking Accuracy, each score the mean over the
/// localisation thresholds. `HOTA(0)` and `LocA(0)` are taken at the
/// loosest threshold.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HotaMetrics {
    #[serde(rename = "HOTA")]
    pub hota: f64,
    #[serde(rename = "DetA")]
    pub det_a: f64,
    #[serde(rename = "AssA")]
    pub ass_a: f64,
    #[serde(rename = "DetRe")]
    pub det_re: f64,
    #[serde(rename = "DetPr")]
    pub det_pr: f64,
    #[serde(rename = "AssRe")]
    pub ass_re: f64,
    #[serde(rename = "AssPr")]
    pub ass_pr: f64,
    #[serde(rename = "LocA")]
    pub loc_a: f64,
    #[serde(rename = "HOTA(0)")]
    pub hota_0: f64,
    #[serde(rename = "LocA(0)")]
    pub loc_a_0: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ClearMetrics {
    #[serde(rename = "MOTA")]
    pub mota: f64,
    #[serde(rename = "MOTP")]
    pub motp: f64,
    #[serde(rename = "TP")]
    pub tp: u64,
    #[serde(rename = "FP")]
    pub fp: u64,
    #[serde(rename = "FN")]
    pub fn_: u64,
    #[serde(rename = "IDSW")]
    pub idsw: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IdentityMetrics {
    #[serde(rename = "IDF1")]
    pub idf1: f64,
    #[serde(rename = "IDP")]
    pub idp: f64,
    #[serde(rename = "IDR")]
    pub idr: f64,
    #[serde(rename = "IDTP")]
    pub idtp: u64,
    #[serde(rename = "IDFP")]
    pub idfp: u64,
    #[serde(rename = "IDFN")]
    pub idfn: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub frames: u64,
    pub gt_detections: u64,
    pub tracker_detections: u64,
    pub gt_ids: usize,
    pub tracker_ids: usize,
    #[serde(rename = "HOTA", skip_serializing_if = "Option::is_none")]
    pub hota: Option<HotaMetrics>,
    #[serde(rename = "CLEAR", skip_serializing_if = "Option::is_none")]
    pub clear: Option<ClearMetrics>,
    #[serde(rename = "Identity", skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityMetrics>,
}

type Frames = BTreeMap<u64, Vec<MotRecord>>;

/// Evaluate `results` against `ground_truth`. Both are keyed by ground-truth
/// frame number.
pub fn evaluate(ground_truth: &Frames, results: &Frames, families: &[MetricFamily]) -> BenchmarkReport {
    let frames: BTreeSet<u64> = ground_truth.keys().chain(results.keys()).copied().collect();
    let count = |f: &Frames| f.values().map(|v| v.len() as u64).sum::<u64>();
    let ids = |f: &Frames| {
        f.values()
            .flatten()
            .map(|r| r.id)
            .collect::<BTreeSet<i64>>()
            .len()
    };
    let mut report = BenchmarkReport {
        frames: frames.len() as u64,
        gt_detections: count(ground_truth),
        tracker_detections: count(results),
        gt_ids: ids(ground_truth),
        tracker_ids: ids(results),
        ..Default::default()
    };
    if families.contains(&MetricFamily::Hota) {
        report.hota = Some(hota(
            ground_truth,
            results,
            &frames,
            report.gt_detections,
            report.tracker_detections,
        ));
    }
    if families.contains(&MetricFamily::Clear) {
        report.clear = Some(clear(ground_truth, results, &frames, report.gt_detections));
    }
    if families.contains(&MetricFamily::Identity) {
        report.identity = Some(identity(
            ground_truth,
            results,
            &frames,
            report.gt_detections,
            report.tracker_detections,
        ));
    }
    report
}

fn iou_matrix(gt: &[MotRecord], tr: &[MotRecord]) -> Vec<Vec<f32>> {
    gt.iter()
        .map(|g| tr.iter().map(|t| g.bbox.iou(&t.bbox)).collect())
        .collect()
}

/// Dense indices for the ids appearing in `frames`, in id order.
fn id_index(frames: &Frames) -> HashMap<i64, usize> {
    frames
        .values()
        .flatten()
        .map(|r| r.id)
        .collect::<BTreeSet<i64>>()
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect()
}

fn hota(
    gt_frames: &Frames,
    tr_frames: &Frames,
    frames: &BTreeSet<u64>,
    gt_total: u64,
    tr_total: u64,
) -> HotaMetrics {
    if gt_total == 0 || tr_total == 0 {
        return HotaMetrics {
            loc_a: 1.0,
            loc_a_0: 1.0,
            ..Default::default()
        };
    }
    let empty = Vec::new();
    let gt_index = id_index(gt_frames);
    let tr_index = id_index(tr_frames);
    let (n_gt, n_tr) = (gt_index.len(), tr_index.len());
    let similarity = |gt: &[MotRecord], tr: &[MotRecord]| -> Vec<Vec<f64>> {
        iou_matrix(gt, tr)
            .into_iter()
            .map(|row| row.into_iter().map(f64::from).collect())
            .collect()
    };

    // Global alignment between every ground-truth and tracker identity.
    let mut potential = vec![vec![0.0_f64; n_tr]; n_gt];
    let mut gt_count = vec![0.0_f64; n_gt];
    let mut tr_count = vec![0.0_f64; n_tr];
    for frame in frames {
        let gt = gt_frames.get(frame).unwrap_or(&empty);
        let tr = tr_frames.get(frame).unwrap_or(&empty);
        for g in gt {
            gt_count[gt_index[&g.id]] += 1.0;
        }
        for t in tr {
            tr_count[tr_index[&t.id]] += 1.0;
        }
        if gt.is_empty() || tr.is_empty() {
            continue;
        }
        let sim = similarity(gt.as_slice(), tr.as_slice());
        let row_sums: Vec<f64> = sim.iter().map(|row| row.iter().sum()).collect();
        let col_sums: Vec<f64> = (0..tr.len()).map(|ti| sim.iter().map(|row| row[ti]).sum()).collect();
        for (gi, g) in gt.iter().enumerate() {
            for (ti, t) in tr.iter().enumerate() {
                let denom = row_sums[gi] + col_sums[ti] - sim[gi][ti];
                if denom > f64::EPSILON {
                    potential[gt_index[&g.id]][tr_index[&t.id]] += sim[gi][ti] / denom;
                }
            }
        }
    }
    let alignment: Vec<Vec<f64>> = potential
        .iter()
        .enumerate()
        .map(|(g, row)| {
            row.iter()
                .enumerate()
                .map(|(t, &p)| {
                    let denom = gt_count[g] + tr_count[t] - p;
                    if denom > 0.0 {
                        p / denom
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();

    // One matching per frame, thresholded at every alpha.
    let mut tp = [0.0_f64; HOTA_ALPHAS];
    let mut fn_ = [0.0_f64; HOTA_ALPHAS];
    let mut fp = [0.0_f64; HOTA_ALPHAS];
    let mut loc = [0.0_f64; HOTA_ALPHAS];
    let mut matches = vec![vec![vec![0.0_f64; n_tr]; n_gt]; HOTA_ALPHAS];
    for frame in frames {
        let gt = gt_frames.get(frame).unwrap_or(&empty);
        let tr = tr_frames.get(frame).unwrap_or(&empty);
        if gt.is_empty() || tr.is_empty() {
            for a in 0..HOTA_ALPHAS {
                fn_[a] += gt.len() as f64;
                fp[a] += tr.len() as f64;
            }
            continue;
        }
        let sim = similarity(gt.as_slice(), tr.as_slice());
        let costs: Vec<Vec<f64>> = gt
            .iter()
            .enumerate()
            .map(|(gi, g)| {
                tr.iter()
                    .enumerate()
                    .map(|(ti, t)| -(alignment[gt_index[&g.id]][tr_index[&t.id]] * sim[gi][ti]))
                    .collect()
            })
            .collect();
        let pairs = hungarian::assign(&costs);
        for a in 0..HOTA_ALPHAS {
            let threshold = hota_alpha(a) - f64::EPSILON;
            let mut matched = 0.0;
            for &(gi, ti) in pairs.iter().filter(|&&(gi, ti)| sim[gi][ti] >= threshold) {
                matched += 1.0;
                loc[a] += sim[gi][ti];
                matches[a][gt_index[&gt[gi].id]][tr_index[&tr[ti].id]] += 1.0;
            }
            tp[a] += matched;
            fn_[a] += gt.len() as f64 - matched;
            fp[a] += tr.len() as f64 - matched;
        }
    }

    let mut per_alpha = Vec::with_capacity(HOTA_ALPHAS);
    for a in 0..HOTA_ALPHAS {
        let (mut ass_a, mut ass_re, mut ass_pr) = (0.0, 0.0, 0.0);
        for (g, row) in matches[a].iter().enumerate() {
            for (t, &m) in row.iter().enumerate() {
                if m == 0.0 {
                    continue;
                }
                ass_a += m * m / (gt_count[g] + tr_count[t] - m).max(1.0);
                ass_re += m * m / gt_count[g].max(1.0);
                ass_pr += m * m / tr_count[t].max(1.0);
            }
        }
        let tp_norm = tp[a].max(1.0);
        let det_a = tp[a] / (tp[a] + fn_[a] + fp[a]).max(1.0);
        let ass_a = ass_a / tp_norm;
        per_alpha.push(HotaMetrics {
            hota: (det_a * ass_a).sqrt(),
            det_a,
            ass_a,
            det_re: tp[a] / (tp[a] + fn_[a]).max(1.0),
            det_pr: tp[a] / (tp[a] + fp[a]).max(1.0),
            ass_re: ass_re / tp_norm,
            ass_pr: ass_pr / tp_norm,
            loc_a: loc[a].max(1e-10) / tp[a].max(1e-10),
            hota_0: 0.0,
            loc_a_0: 0.0,
        });
    }

    let mean = |f: fn(&HotaMetrics) -> f64| per_alpha.iter().map(f).sum::<f64>() / HOTA_ALPHAS as f64;
    HotaMetrics {
        hota: mean(|m| m.hota),
        det_a: mean(|m| m.det_a),
        ass_a: mean(|m| m.ass_a),
        det_re: mean(|m| m.det_re),
        det_pr: mean(|m| m.det_pr),
        ass_re: mean(|m| m.ass_re),
        ass_pr: mean(|m| m.ass_pr),
        loc_a: mean(|m| m.loc_a),
        hota_0: per_alpha[0].hota,
        loc_a_0: per_alpha[0].loc_a,
    }
}

fn clear(gt_frames: &Frames, tr_frames: &Frames, frames: &BTreeSet<u64>, gt_total: u64) -> ClearMetrics {
    let empty = Vec::new();
    // Last tracker id matched to each ground-truth id.
    let mut last_match: HashMap<i64, i64> = HashMap::new();
    let mut metrics = ClearMetrics::default();
    let mut iou_sum = 0.0_f64;

    for frame in frames {
        let gt = gt_frames.get(frame).unwrap_or(&empty);
        let tr = tr_frames.get(frame).unwrap_or(&empty);
        let ious = iou_matrix(gt, tr);

        // Prefer continuing the previous pairing, then maximise overlap.
        let costs: Vec<Vec<f64>> = gt
            .iter()
            .enumerate()
            .map(|(gi, g)| {
                tr.iter()
                    .enumerate()
                    .map(|(ti, t)| {
                        let iou = ious[gi][ti];
                        if iou < IOU_THRESHOLD {
                            return f64::INFINITY;
                        }
                        let continuing = last_match.get(&g.id) == Some(&t.id);
                        -(iou as f64) - if continuing { 1000.0 } else { 0.0 }
                    })
                    .collect()
            })
            .collect();
        let pairs = hungarian::assign(&costs);

        for &(gi, ti) in &pairs {
            let gt_id = gt[gi].id;
            let tr_id = tr[ti].id;
            if let Some(previous) = last_match.insert(gt_id, tr_id) {
                if previous != tr_id {
                    metrics.idsw += 1;
                }
            }
            iou_sum += ious[gi][ti] as f64;
        }
        let matched = pairs.len() as u64;
        metrics.tp += matched;
        metrics.fn_ += gt.len() as u64 - matched;
        metrics.fp += tr.len() as u64 - matched;
    }

    metrics.motp = if metrics.tp > 0 {
        iou_sum / metrics.tp as f64
    } else {
        0.0
    };
    metrics.mota = if gt_total > 0 {
        1.0 - (metrics.fn_ + metrics.fp + metrics.idsw) as f64 / gt_total as f64
    } else {
        0.0
    };
    metrics
}

fn identity(
    gt_frames: &Frames,
    tr_frames: &Frames,
    frames: &BTreeSet<u64>,
    gt_total: u64,
    tr_total: u64,
) -> IdentityMetrics {
    let empty = Vec::new();
    // Frames in which each (gt id, tracker id) pair overlaps enough to match.
    let mut overlaps: HashMap<(i64, i64), u64> = HashMap::new();
    for frame in frames {
        let gt = gt_frames.get(frame).unwrap_or(&empty);
        let tr = tr_frames.get(frame).unwrap_or(&empty);
        for g in gt {
            for t in tr {
                if g.bbox.iou(&t.bbox) >= IOU_THRESHOLD {
                    *overlaps.entry((g.id, t.id)).or_default() += 1;
                }
            }
        }
    }

    let gt_ids: Vec<i64> = overlaps.keys().map(|k| k.0).collect::<BTreeSet<_>>().into_iter().collect();
    let tr_ids: Vec<i64> = overlaps.keys().map(|k| k.1).collect::<BTreeSet<_>>().into_iter().collect();
    let costs: Vec<Vec<f64>> = gt_ids
        .iter()
        .map(|g| {
            tr_ids
                .iter()
                .map(|t| match overlaps.get(&(*g, *t)) {
                    Some(n) => -(*n as f64),
                    None => f64::INFINITY,
                })
                .collect()
        })
        .collect();
    let idtp: u64 = hungarian::assign(&costs)
        .into_iter()
        .filter_map(|(gi, ti)| overlaps.get(&(gt_ids[gi], tr_ids[ti])))
        .sum();

    let idfn = gt_total.saturating_sub(idtp);
    let idfp = tr_total.saturating_sub(idtp);
    let ratio = |num: u64, den: u64| if den > 0 { num as f64 / den as f64 } else { 0.0 };
    IdentityMetrics {
        idf1: ratio(2 * idtp, 2 * idtp + idfp + idfn),
        idp: ratio(idtp, idtp + idfp),
        idr: ratio(idtp, idtp + idfn),
        idtp,
        idfp,
        idfn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mot::group_by_frame;

    fn frames(lines: &[&str]) -> Frames {
        group_by_frame(lines.iter().map(|l| MotRecord::parse(l).unwrap()).collect())
    }

    #[test]
    fn perfect_tracking_scores_one() {
        let gt = frames(&["1,1,0,0,10,10", "2,1,1,0,10,10", "1,2,50,0,10,10", "2,2,51,0,10,10"]);
        let tr = frames(&["1,7,0,0,10,10", "2,7,1,0,10,10", "1,8,50,0,10,10", "2,8,51,0,10,10"]);
        let report = evaluate(&gt, &tr, &[MetricFamily::Clear, MetricFamily::Identity]);
        let clear = report.clear.unwrap();
        assert_eq!((clear.tp, clear.fp, clear.fn_, clear.idsw), (4, 0, 0, 0));
        assert!((clear.mota - 1.0).abs() < 1e-9);
        let identity = report.identity.unwrap();
        assert_eq!(identity.idtp, 4);
        assert!((identity.idf1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn id_switch_and_misses_are_counted() {
        let gt = frames(&["1,1,0,0,10,10", "2,1,0,0,10,10", "3,1,0,0,10,10", "4,1,0,0,10,10"]);
        // Track 5 for two frames, track 6 for one, frame 4 missed, one stray box.
        let tr = frames(&["1,5,0,0,10,10", "2,5,0,0,10,10", "3,6,0,0,10,10", "3,9,80,80,10,10"]);
        let report = evaluate(&gt, &tr, &[MetricFamily::Clear, MetricFamily::Identity]);
        let clear = report.clear.unwrap();
        assert_eq!(clear.tp, 3);
        assert_eq!(clear.fn_, 1);
        assert_eq!(clear.fp, 1);
        assert_eq!(clear.idsw, 1);
        assert!((clear.mota - 0.25).abs() < 1e-9);

        let identity = report.identity.unwrap();
        assert_eq!(identity.idtp, 2);
        assert_eq!(identity.idfn, 2);
        assert_eq!(identity.idfp, 2);
        assert!((identity.idf1 - 0.5).abs() < 1e-9);
        assert!(report.frames == 4 && report.gt_ids == 1 && report.tracker_ids == 3);
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn hota_of_perfect_tracking_is_one() {
        let gt = frames(&["1,1,0,0,10,10", "2,1,1,0,10,10", "1,2,50,0,10,10", "2,2,51,0,10,10"]);
        let tr = frames(&["1,7,0,0,10,10", "2,7,1,0,10,10", "1,8,50,0,10,10", "2,8,51,0,10,10"]);
        let hota = evaluate(&gt, &tr, &[MetricFamily::Hota]).hota.unwrap();
        assert!(close(hota.hota, 1.0) && close(hota.det_a, 1.0) && close(hota.ass_a, 1.0));
        assert!(close(hota.loc_a, 1.0));
    }

    #[test]
    fn hota_splits_association_on_an_id_switch() {
        // One object for four frames, tracked as 5 then as 6.
        let gt = frames(&["1,1,0,0,10,10", "2,1,0,0,10,10", "3,1,0,0,10,10", "4,1,0,0,10,10"]);
        let tr = frames(&["1,5,0,0,10,10", "2,5,0,0,10,10", "3,6,0,0,10,10", "4,6,0,0,10,10"]);
        let hota = evaluate(&gt, &tr, &[MetricFamily::Hota]).hota.unwrap();
        // Each pairing covers 2 of 4 frames: 2 / (4 + 2 - 2) = 0.5.
        assert!(close(hota.det_a, 1.0));
        assert!(close(hota.ass_a, 0.5));
        assert!(close(hota.ass_re, 0.5));
        assert!(close(hota.ass_pr, 1.0));
        assert!(close(hota.hota, 0.5_f64.sqrt()));
    }

    #[test]
    fn hota_averages_over_localisation_thresholds() {
        // IoU 0.5: matched for alpha 0.05..=0.50 (10 of 19 thresholds).
        let gt = frames(&["1,1,0,0,10,10"]);
        let tr = frames(&["1,3,0,0,10,5"]);
        let hota = evaluate(&gt, &tr, &[MetricFamily::Hota]).hota.unwrap();
        assert!(close(hota.det_a, 10.0 / 19.0));
        assert!(close(hota.ass_a, 10.0 / 19.0));
        assert!(close(hota.hota, 10.0 / 19.0));
        // 0.5 where matched, 1 by convention where nothing matched.
        assert!(close(hota.loc_a, 14.0 / 19.0));
        assert!(close(hota.hota_0, 1.0));
        assert!(close(hota.loc_a_0, 0.5));

        let none = evaluate(&gt, &Frames::new(), &[MetricFamily::Hota]).hota.unwrap();
        assert_eq!(none.hota, 0.0);
    }

    #[test]
    fn metric_families_parse() {
        assert_eq!(MetricFamily::parse("identity").unwrap(), MetricFamily::Identity);
        assert_eq!(MetricFamily::parse("hota").unwrap(), MetricFamily::Hota);
        assert!(MetricFamily::parse("VACE").unwrap_err().to_string().contains("not supported"));
        assert!(MetricFamily::parse("XYZ").is_err());
    }

    #[test]
    fn only_requested_families_are_reported() {
        let gt = frames(&["1,1,0,0,10,10"]);
        let report = evaluate(&gt, &gt, &[MetricFamily::Identity]);
        assert!(report.clear.is_none());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("Identity").is_some());
        assert!(json.get("CLEAR").is_none());
        assert!(json.get("HOTA").is_none());
    }
}
