//! Identifier stability of a tracker against ground truth.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::hungarian;
use crate::mot::MotRecord;
use crate::track::{ObjectId, TrackedObject};

pub const DEFAULT_MAX_DISTANCE: f32 = 100.0;

const CHANGES_HEADER: [&str; 5] = ["frame", "gt_id", "label", "previous_track_id", "new_track_id"];
const SWAPS_HEADER: [&str; 5] = ["frame", "gt_id_a", "gt_id_b", "track_id_a", "track_id_b"];

/// A ground-truth object picked up a different track id than before.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IdChange {
    pub frame: u64,
    pub gt_id: i64,
    pub label: String,
    pub previous_track_id: ObjectId,
    pub new_track_id: ObjectId,
}

/// Two ground-truth objects exchanged track ids in the same frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IdSwap {
    pub frame: u64,
    pub gt_id_a: i64,
    pub gt_id_b: i64,
    /// Track held by `gt_id_a` before the swap (now held by `gt_id_b`).
    pub track_id_a: ObjectId,
    /// Track held by `gt_id_b` before the swap (now held by `gt_id_a`).
    pub track_id_b: ObjectId,
}

#[derive(Debug, Default)]
pub struct IdReport {
    pub frames: u64,
    pub matches: u64,
    pub changes: Vec<IdChange>,
    pub swaps: Vec<IdSwap>,
}

/// Matches tracks to ground truth per frame by centroid distance and records
/// identifier changes and swaps.
pub struct IdAnalyzer {
    ground_truth: BTreeMap<u64, Vec<MotRecord>>,
    labels: Vec<String>,
    max_distance: f32,
    last_track: HashMap<i64, ObjectId>,
    report: IdReport,
}

impl IdAnalyzer {
    pub fn new(ground_truth: BTreeMap<u64, Vec<MotRecord>>, labels: Vec<String>, max_distance: f32) -> Self {
        Self {
            ground_truth,
            labels,
            max_distance,
            last_track: HashMap::new(),
            report: IdReport::default(),
        }
    }

    /// Compare one frame of tracking output with ground-truth frame `gt_frame`.
    pub fn update(&mut self, gt_frame: u64, tracks: &[TrackedObject]) {
        self.report.frames += 1;
        let gt = self.ground_truth.get(&gt_frame).cloned().unwrap_or_default();
        let pairs = match_by_distance(&gt, tracks, self.max_distance);
        self.report.matches += pairs.len() as u64;

        let mut changed: Vec<(i64, ObjectId, ObjectId)> = Vec::new();
        for (gi, ti) in pairs {
            let gt_id = gt[gi].id;
            let track_id = tracks[ti].id;
            if let Some(previous) = self.last_track.insert(gt_id, track_id) {
                if previous != track_id {
                    self.report.changes.push(IdChange {
                        frame: gt_frame,
                        gt_id,
                        label: gt[gi].label(&self.labels).to_string(),
                        previous_track_id: previous,
                        new_track_id: track_id,
                    });
                    changed.push((gt_id, previous, track_id));
                }
            }
        }

        for (i, a) in changed.iter().enumerate() {
            for b in &changed[i + 1..] {
                if a.1 == b.2 && a.2 == b.1 {
                    self.report.swaps.push(IdSwap {
                        frame: gt_frame,
                        gt_id_a: a.0,
                        gt_id_b: b.0,
                        track_id_a: a.1,
                        track_id_b: b.1,
                    });
                }
            }
        }
    }

    pub fn report(&self) -> &IdReport {
        &self.report
    }

    pub fn into_report(self) -> IdReport {
        self.report
    }
}

fn match_by_distance(gt: &[MotRecord], tracks: &[TrackedObject], max_distance: f32) -> Vec<(usize, usize)> {
    let costs: Vec<Vec<f64>> = gt
        .iter()
        .map(|g| {
            tracks
                .iter()
                .map(|t| {
                    let d = g.bbox.center_distance(&t.bbox);
                    if d <= max_distance {
                        d as f64
                    } else {
                        f64::INFINITY
                    }
                })
                .collect()
        })
        .collect();
    hungarian::assign(&costs)
}

impl IdReport {
    /// Write `id_changes.csv` and `id_swaps.csv` into `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("failed to create {}: {}", dir.display(), e))?;

        let changes_path = dir.join("id_changes.csv");
        write_csv(&changes_path, &CHANGES_HEADER, &self.changes)?;
        let swaps_path = dir.join("id_swaps.csv");
        write_csv(&swaps_path, &SWAPS_HEADER, &self.swaps)?;
        Ok((changes_path, swaps_path))
    }
}

/// The header is written even when there are no rows.
fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::mot::group_by_frame;

    fn track(id: ObjectId, cx: f32) -> TrackedObject {
        TrackedObject {
            id,
            bbox: BoundingBox::centered(cx, 50.0, 10.0, 10.0),
            label: "person".to_string(),
            class_index: 0,
            confidence: 0.9,
        }
    }

    fn ground_truth() -> BTreeMap<u64, Vec<MotRecord>> {
        let lines = [
            "1,1,15,45,10,10",
            "1,2,195,45,10,10",
            "2,1,15,45,10,10",
            "2,2,195,45,10,10",
            "3,1,15,45,10,10",
            "3,2,195,45,10,10",
        ];
        group_by_frame(lines.iter().map(|l| MotRecord::parse(l).unwrap()).collect())
    }

    #[test]
    fn detects_changes_and_swaps() {
        let mut analyzer = IdAnalyzer::new(ground_truth(), vec!["person".to_string()], 100.0);
        analyzer.update(1, &[track(10, 20.0), track(11, 200.0)]);
        analyzer.update(2, &[track(10, 20.0), track(11, 200.0)]);
        analyzer.update(3, &[track(11, 20.0), track(10, 200.0)]);
        let report = analyzer.into_report();
        assert_eq!(report.frames, 3);
        assert_eq!(report.changes.len(), 2);
        assert_eq!(report.changes[0].previous_track_id, 10);
        assert_eq!(report.changes[0].new_track_id, 11);
        assert_eq!(
            report.swaps,
            vec![IdSwap {
                frame: 3,
                gt_id_a: 1,
                gt_id_b: 2,
                track_id_a: 10,
                track_id_b: 11
            }]
        );
    }

    #[test]
    fn distant_tracks_are_not_matched() {
        let mut analyzer = IdAnalyzer::new(ground_truth(), Vec::new(), 30.0);
        analyzer.update(1, &[track(10, 400.0)]);
        assert_eq!(analyzer.report().matches, 0);
    }

    #[test]
    fn writes_csv_reports() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut analyzer = IdAnalyzer::new(ground_truth(), vec!["person".to_string()], 100.0);
        analyzer.update(1, &[track(10, 20.0)]);
        analyzer.update(2, &[track(12, 20.0)]);
        let (changes, swaps) = analyzer.report().write_to_dir(dir.path())?;
        let changes = std::fs::read_to_string(changes)?;
        assert_eq!(changes.lines().next(), Some("frame,gt_id,label,previous_track_id,new_track_id"));
        assert_eq!(changes.lines().nth(1), Some("2,1,person,10,12"));
        assert_eq!(
            std::fs::read_to_string(swaps)?.trim_end(),
            "frame,gt_id_a,gt_id_b,track_id_a,track_id_b"
        );
        Ok(())
    }

    #[test]
    fn labels_with_delimiters_stay_in_one_column() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut analyzer = IdAnalyzer::new(ground_truth(), vec!["person, adult".to_string()], 100.0);
        analyzer.update(1, &[track(10, 20.0)]);
        analyzer.update(2, &[track(12, 20.0)]);
        let (changes, _) = analyzer.report().write_to_dir(dir.path())?;

        let mut reader = csv::Reader::from_path(changes)?;
        let rows: Vec<csv::StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 5);
        assert_eq!(&rows[0][2], "person, adult");
        Ok(())
    }
}
