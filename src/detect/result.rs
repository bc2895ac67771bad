use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Axis-aligned box in pixel coordinates of the processed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box of the given size centered on (`cx`, `cy`).
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn end_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn end_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.end_x().min(other.end_x()) - self.x.max(other.x)).max(0.0);
        let iy = (self.end_y().min(other.end_y()) - self.y.max(other.y)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub label: String,
    pub class_index: usize,
}

/// Output of one detector call.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    pub predictions: Vec<Prediction>,
    /// Time spent in inference.
    pub duration: Duration,
}

/// Drop predictions below `confidence`, then suppress overlapping boxes of the
/// same class whose IoU with a stronger box exceeds `overlap_threshold`.
pub fn non_max_suppression(
    predictions: Vec<Prediction>,
    confidence: f32,
    overlap_threshold: f32,
) -> Vec<Prediction> {
    let mut candidates: Vec<Prediction> = predictions
        .into_iter()
        .filter(|p| p.confidence >= confidence)
        .collect();
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Prediction> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_index == candidate.class_index
                && k.bbox.iou(&candidate.bbox) > overlap_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Keep predictions whose label is in `labels`. An empty list keeps everything.
pub fn filter_by_label(predictions: Vec<Prediction>, labels: &[String]) -> Vec<Prediction> {
    if labels.is_empty() {
        return predictions;
    }
    predictions
        .into_iter()
        .filter(|p| labels.iter().any(|l| l.eq_ignore_ascii_case(&p.label)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(x: f32, confidence: f32, label: &str, class_index: usize) -> Prediction {
        Prediction {
            bbox: BoundingBox::new(x, 0.0, 100.0, 100.0),
            confidence,
            label: label.to_string(),
            class_index,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
        let half = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_strongest_of_overlapping_same_class() {
        let kept = non_max_suppression(
            vec![
                pred(0.0, 0.6, "person", 0),
                pred(5.0, 0.9, "person", 0),
                pred(5.0, 0.8, "car", 1),
                pred(400.0, 0.2, "person", 0),
            ],
            0.5,
            0.3,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].label, "car");
    }

    #[test]
    fn label_filter_is_case_insensitive_and_optional() {
        let preds = vec![pred(0.0, 0.9, "Person", 0), pred(0.0, 0.9, "car", 1)];
        assert_eq!(filter_by_label(preds.clone(), &[]).len(), 2);
        let only_people = filter_by_label(preds, &["person".to_string()]);
        assert_eq!(only_people.len(), 1);
        assert_eq!(only_people[0].label, "Person");
    }
}
