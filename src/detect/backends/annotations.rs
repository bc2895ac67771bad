use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use crate::detect::backend::{Detector, Engine};
use crate::detect::result::{non_max_suppression, DetectionResult, Prediction};
use crate::frame::Frame;
use crate::mot::{self, MotRecord};

/// Replays a MOT annotation file as detections.
///
/// Frame `n` of the stream (zero-based) reads annotation frame
/// `n + frame_offset`; MOT ground truth numbers frames from 1.
pub struct AnnotationDetector {
    name: String,
    labels: Vec<String>,
    frames: BTreeMap<u64, Vec<MotRecord>>,
    frame_offset: u64,
    engine: Option<Engine>,
}

impl AnnotationDetector {
    pub fn from_records(name: &str, records: Vec<MotRecord>, labels: Vec<String>, frame_offset: u64) -> Self {
        Self {
            name: name.to_string(),
            labels,
            frames: mot::group_by_frame(records),
            frame_offset,
            engine: None,
        }
    }

    pub fn from_file(path: &Path, labels: Vec<String>, frame_offset: u64) -> Result<Self> {
        let records = mot::read_file(path)?;
        log::info!(
            "loaded {} annotations from {}",
            records.len(),
            path.display()
        );
        Ok(Self::from_records(
            &format!("annotations:{}", path.display()),
            records,
            labels,
            frame_offset,
        ))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Detector for AnnotationDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, engine: Engine) -> bool {
        engine == Engine::Cpu
    }

    fn load(&mut self, engine: Engine) -> Result<()> {
        if engine != Engine::Cpu {
            return Err(anyhow!("annotation replay only runs on {}", Engine::Cpu));
        }
        self.engine = Some(engine);
        Ok(())
    }

    fn engine(&self) -> Option<Engine> {
        self.engine
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame, confidence: f32, overlap: f32) -> Result<DetectionResult> {
        let started = Instant::now();
        let key = frame.index + self.frame_offset;
        let predictions = self
            .frames
            .get(&key)
            .map(|records| {
                records
                    .iter()
                    .map(|r| Prediction {
                        bbox: r.bbox,
                        confidence: r.confidence,
                        label: r.label(&self.labels).to_string(),
                        class_index: usize::try_from(r.class_index).unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(DetectionResult {
            predictions: non_max_suppression(predictions, confidence, overlap),
            duration: started.elapsed(),
        })
    }
}
