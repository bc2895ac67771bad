use anyhow::{anyhow, Result};
use std::time::Instant;

use crate::detect::backend::{Detector, Engine};
use crate::detect::result::{non_max_suppression, BoundingBox, DetectionResult, Prediction};
use crate::frame::Frame;

/// Deterministic detector for `stub://` streams and demos.
///
/// Produces `walkers` people crossing the frame left to right, each on its
/// own row and at its own speed. Positions depend only on the frame index and
/// size, so the same frame always yields the same predictions. A walker that
/// leaves the right edge re-enters on the left, which the tracker sees as an
/// exit followed by a new object.
pub struct SyntheticDetector {
    walkers: u32,
    labels: Vec<String>,
    engine: Option<Engine>,
}

impl SyntheticDetector {
    pub const MODEL_ID: &'static str = "synthetic/walkers";

    pub fn new(walkers: u32) -> Self {
        Self {
            walkers,
            labels: vec!["person".to_string()],
            engine: None,
        }
    }

    fn walker_box(&self, walker: u32, frame: &Frame) -> BoundingBox {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let box_w = (w / 16.0).max(4.0);
        let box_h = (h / 6.0).max(8.0);
        let speed = 4.0 + 3.0 * walker as f32;
        let track_len = w + box_w;
        let start = track_len * walker as f32 / self.walkers.max(1) as f32;
        let x = (start + speed * frame.index as f32) % track_len - box_w;
        let cy = h * (walker + 1) as f32 / (self.walkers + 1) as f32;
        BoundingBox::new(x.max(0.0), cy - box_h / 2.0, box_w, box_h)
    }
}

impl Default for SyntheticDetector {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Detector for SyntheticDetector {
    fn name(&self) -> &str {
        Self::MODEL_ID
    }

    fn supports(&self, engine: Engine) -> bool {
        matches!(engine, Engine::Dnn | Engine::Cpu)
    }

    fn load(&mut self, engine: Engine) -> Result<()> {
        if !self.supports(engine) {
            return Err(anyhow!("{} cannot run on {}", Self::MODEL_ID, engine));
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
        if self.engine.is_none() {
            return Err(anyhow!("{} used before load", Self::MODEL_ID));
        }
        let started = Instant::now();
        let predictions = (0..self.walkers)
            .map(|walker| Prediction {
                bbox: self.walker_box(walker, frame),
                confidence: (0.55 + 0.1 * walker as f32).min(0.95),
                label: self.labels[0].clone(),
                class_index: 0,
            })
            .collect();
        Ok(DetectionResult {
            predictions: non_max_suppression(predictions, confidence, overlap),
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BLACK;

    fn frame(index: u64) -> Frame {
        let mut frame = Frame::blank(640, 480, BLACK);
        frame.index = index;
        frame
    }

    #[test]
    fn output_is_deterministic_per_frame() -> Result<()> {
        let mut detector = SyntheticDetector::new(2);
        detector.load(Engine::Cpu)?;
        let a = detector.detect(&frame(7), 0.0, 0.5)?;
        let b = detector.detect(&frame(7), 0.0, 0.5)?;
        assert_eq!(a.predictions, b.predictions);
        assert_eq!(a.predictions.len(), 2);
        Ok(())
    }

    #[test]
    fn confidence_threshold_drops_weak_walkers() -> Result<()> {
        let mut detector = SyntheticDetector::new(3);
        detector.load(Engine::Dnn)?;
        let result = detector.detect(&frame(0), 0.6, 0.5)?;
        assert_eq!(result.predictions.len(), 2);
        Ok(())
    }

    #[test]
    fn refuses_detection_before_load() {
        let mut detector = SyntheticDetector::default();
        assert!(detector.detect(&frame(0), 0.5, 0.5).is_err());
        assert!(detector.load(Engine::TensorRt).is_err());
    }
}
