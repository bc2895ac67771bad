use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::track::{TrackedObject, TrackedObjects};

/// Tracking output for one frame of one stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingFrame {
    pub frame_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    pub objects: Vec<TrackedObject>,
}

/// Appends one `TrackingFrame` JSON line per processed frame.
pub struct ResultsRecorder {
    out: BufWriter<File>,
}

impl ResultsRecorder {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow!("failed to create {}: {}", parent.display(), e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| anyhow!("failed to open results file {}: {}", path.display(), e))?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, stream: &str, frame_index: u64, objects: &TrackedObjects) -> Result<()> {
        let frame = TrackingFrame {
            frame_index,
            stream: Some(stream.to_string()),
            objects: objects.values().cloned().collect(),
        };
        serde_json::to_writer(&mut self.out, &frame)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("flush results file")
    }
}

impl Drop for ResultsRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            log::warn!("results file flush failed: {}", e);
        }
    }
}

/// Read a results file. When `stream` is given, only that stream's frames are
/// returned.
pub fn read_results(path: &Path, stream: Option<&str>) -> Result<Vec<TrackingFrame>> {
    let file = File::open(path)
        .map_err(|e| anyhow!("failed to open results file {}: {}", path.display(), e))?;
    let mut frames = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: TrackingFrame = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", path.display(), line_no + 1))?;
        if stream.map_or(true, |s| frame.stream.as_deref() == Some(s)) {
            frames.push(frame);
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn recorded_frames_read_back_per_stream() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.jsonl");
        let objects: TrackedObjects = [(
            1,
            TrackedObject {
                id: 1,
                bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
                label: "person".to_string(),
                class_index: 0,
                confidence: 0.5,
            },
        )]
        .into_iter()
        .collect();
        {
            let mut recorder = ResultsRecorder::create(&path)?;
            recorder.record("a", 0, &objects)?;
            recorder.record("b", 0, &TrackedObjects::new())?;
            recorder.record("a", 1, &objects)?;
        }
        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.lines().next().unwrap_or("").contains("\"box\""));

        let a = read_results(&path, Some("a"))?;
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].frame_index, 1);
        assert_eq!(a[0].objects[0].id, 1);
        assert_eq!(read_results(&path, None)?.len(), 3);
        Ok(())
    }
}
