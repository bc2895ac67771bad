//! MOT-challenge text format.
//!
//! One object per line:
//! `frame,id,x,y,width,height,confidence,class,visibility,placeholder`.
//! Ground-truth files number frames from 1; tracking results written by this
//! crate keep the pipeline's zero-based frame index.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::detect::BoundingBox;
use crate::output::read_results;
use crate::track::{ObjectId, TrackedObject};

/// Column layout as read. Only the first six columns are required.
#[derive(Debug, Deserialize)]
struct MotRow {
    frame: f64,
    id: f64,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    class: Option<f64>,
    #[serde(default)]
    visibility: Option<f32>,
    #[serde(default)]
    _placeholder: Option<f64>,
}

fn mot_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(input)
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotRecord {
    pub frame: u64,
    pub id: i64,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_index: i64,
    pub visibility: f32,
}

impl MotRecord {
    pub fn from_tracked(frame: u64, object: &TrackedObject) -> Self {
        Self {
            frame,
            id: object.id as i64,
            bbox: object.bbox,
            confidence: object.confidence,
            class_index: object.class_index as i64,
            visibility: 1.0,
        }
    }

    /// Tracking-result columns. Visibility is always written as `1.0` and
    /// the last column as `-1`.
    pub fn fields(&self) -> [String; 10] {
        [
            self.frame.to_string(),
            self.id.to_string(),
            self.bbox.x.to_string(),
            self.bbox.y.to_string(),
            self.bbox.width.to_string(),
            self.bbox.height.to_string(),
            format!("{:.6}", self.confidence),
            self.class_index.to_string(),
            "1.0".to_string(),
            "-1".to_string(),
        ]
    }

    pub fn to_line(&self) -> String {
        self.fields().join(",")
    }

    /// Parse one line. Confidence and visibility default to 1.0 and class
    /// to -1.
    pub fn parse(line: &str) -> Result<Self> {
        let mut rows = mot_reader(line.as_bytes()).into_deserialize::<MotRow>();
        let row = rows.next().ok_or_else(|| anyhow!("empty MOT line"))??;
        Self::from_row(row)
    }

    fn from_row(row: MotRow) -> Result<Self> {
        if row.frame.is_nan() || row.frame < 0.0 {
            return Err(anyhow!("invalid frame: {}", row.frame));
        }
        Ok(Self {
            frame: row.frame as u64,
            id: row.id as i64,
            bbox: BoundingBox::new(row.x, row.y, row.width, row.height),
            confidence: row.confidence.unwrap_or(1.0),
            class_index: row.class.map_or(-1, |c| c as i64),
            visibility: row.visibility.unwrap_or(1.0),
        })
    }

    /// Label for this record's class, falling back to the first label when
    /// the class is unset or outside `labels`.
    pub fn label<'a>(&self, labels: &'a [String]) -> &'a str {
        usize::try_from(self.class_index)
            .ok()
            .and_then(|i| labels.get(i))
            .or_else(|| labels.first())
            .map(String::as_str)
            .unwrap_or("object")
    }

    pub fn to_tracked(&self, labels: &[String]) -> TrackedObject {
        TrackedObject {
            id: self.id.max(0) as ObjectId,
            bbox: self.bbox,
            label: self.label(labels).to_string(),
            class_index: usize::try_from(self.class_index).unwrap_or(0),
            confidence: self.confidence,
        }
    }
}

pub fn read_file(path: &Path) -> Result<Vec<MotRecord>> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow!("failed to open MOT file {}: {}", path.display(), e))?;
    let mut records = Vec::new();
    for row in mot_reader(file).into_deserialize::<MotRow>() {
        let row = row.with_context(|| format!("reading {}", path.display()))?;
        records.push(MotRecord::from_row(row).with_context(|| path.display().to_string())?);
    }
    Ok(records)
}

pub fn write_file(path: &Path, records: &[MotRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for record in records {
        wtr.write_record(record.fields())?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn group_by_frame(records: Vec<MotRecord>) -> BTreeMap<u64, Vec<MotRecord>> {
    let mut frames: BTreeMap<u64, Vec<MotRecord>> = BTreeMap::new();
    for record in records {
        frames.entry(record.frame).or_default().push(record);
    }
    frames
}

/// Load tracking output keyed by ground-truth frame number.
///
/// A `.jsonl` / `.json` path is read as a results file and its zero-based
/// frame indices are shifted by `frame_offset`; anything else is read as MOT
/// text whose frame numbers are used unchanged.
pub fn load_results(
    path: &Path,
    stream: Option<&str>,
    frame_offset: u64,
) -> Result<BTreeMap<u64, Vec<MotRecord>>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl") || e.eq_ignore_ascii_case("json"));
    if !is_json {
        return Ok(group_by_frame(read_file(path)?));
    }
    let records = read_results(path, stream)?
        .iter()
        .flat_map(|frame| {
            frame
                .objects
                .iter()
                .map(move |object| MotRecord::from_tracked(frame.frame_index + frame_offset, object))
        })
        .collect();
    Ok(group_by_frame(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_fixed_visibility_and_placeholder() {
        let object = TrackedObject {
            id: 4,
            bbox: BoundingBox::new(10.0, 20.5, 30.0, 40.0),
            label: "person".to_string(),
            class_index: 0,
            confidence: 0.87,
        };
        assert_eq!(
            MotRecord::from_tracked(2, &object).to_line(),
            "2,4,10,20.5,30,40,0.870000,0,1.0,-1"
        );
    }

    #[test]
    fn parses_ground_truth_with_defaults() -> Result<()> {
        let full = MotRecord::parse("1, 3, 794.2, 47.5, 71.2, 174.8, 0, 7, 0.25")?;
        assert_eq!(full.frame, 1);
        assert_eq!(full.class_index, 7);
        assert_eq!(full.confidence, 0.0);

        let short = MotRecord::parse("5,1,0,0,10,10")?;
        assert_eq!(short.class_index, -1);
        assert_eq!(short.visibility, 1.0);

        assert!(MotRecord::parse("1,2,3").is_err());
        assert!(MotRecord::parse("a,2,3,4,5,6").is_err());
        assert!(MotRecord::parse("-1,2,3,4,5,6").is_err());

        let empty_conf = MotRecord::parse("3,1,0,0,10,10,,2")?;
        assert_eq!(empty_conf.confidence, 1.0);
        assert_eq!(empty_conf.class_index, 2);
        Ok(())
    }

    #[test]
    fn label_falls_back_to_first() {
        let labels = vec!["person".to_string(), "car".to_string()];
        let mut record = MotRecord::parse("1,1,0,0,1,1,1,1").unwrap();
        assert_eq!(record.label(&labels), "car");
        record.class_index = 9;
        assert_eq!(record.label(&labels), "person");
    }

    #[test]
    fn file_round_trip_groups_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gt.txt");
        std::fs::write(&path, "# header\n1,1,0,0,5,5\n\n1,2,9,9,5,5\n2,1,1,0,5,5\n")?;
        let frames = group_by_frame(read_file(&path)?);
        assert_eq!(frames[&1].len(), 2);
        assert_eq!(frames[&2].len(), 1);

        let out = dir.path().join("results.txt");
        write_file(&out, &frames[&1])?;
        assert_eq!(
            std::fs::read_to_string(&out)?,
            "1,1,0,0,5,5,1.000000,-1,1.0,-1\n1,2,9,9,5,5,1.000000,-1,1.0,-1\n"
        );
        assert_eq!(read_file(&out)?.len(), 2);
        Ok(())
    }

    #[test]
    fn bad_rows_name_the_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gt.txt");
        std::fs::write(&path, "1,1,0,0,5,5\n2,x,0,0,5,5\n")?;
        let err = format!("{:#}", read_file(&path).unwrap_err());
        assert!(err.contains("gt.txt"), "{err}");
        Ok(())
    }

    #[test]
    fn results_jsonl_is_shifted_to_ground_truth_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"frame_index":0,"stream":"a","objects":[{"id":3,"box":{"x":1.0,"y":2.0,"width":3.0,"height":4.0},"label":"person","class_index":0,"confidence":0.5}]}"#,
                "\n",
                r#"{"frame_index":0,"stream":"b","objects":[]}"#,
                "\n"
            ),
        )?;
        let frames = load_results(&path, Some("a"), 1)?;
        assert_eq!(frames.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(frames[&1][0].id, 3);
        assert_eq!(frames[&1][0].to_tracked(&[]).label, "object");
        Ok(())
    }
}
