//! Annotation of frames with zones, tracked objects and status text.

use std::path::Path;
use std::time::Duration;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};

use crate::frame::{Frame, Rgb, ZONE_FILL_ALPHA};
use crate::track::TrackedObjects;
use crate::zone::ZoneList;

/// Per-class box colors, indexed by class index modulo the palette length.
const CLASS_COLORS: [Rgb; 6] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
];

/// TrueType/OpenType font used to burn text overlays into frames.
pub struct TextFont {
    font: FontVec,
    scale: PxScale,
}

impl TextFont {
    pub fn load(path: &Path, size: f32) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font file {}", path.display()))?;
        Self::from_bytes(bytes, size).with_context(|| format!("font file {}", path.display()))
    }

    pub fn from_bytes(bytes: Vec<u8>, size: f32) -> Result<Self> {
        if !(size.is_finite() && size > 0.0) {
            return Err(anyhow!("font size must be positive, got {}", size));
        }
        let font = FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font data: {}", e))?;
        Ok(Self {
            font,
            scale: PxScale::from(size),
        })
    }

    /// Rasterize every overlay recorded on `frame`.
    pub fn draw(&self, frame: &mut Frame) {
        frame.rasterize_text(&self.font, self.scale);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ZoneMarkup {
    pub show_labels: bool,
    pub show_boundaries: bool,
    pub fill_zones: bool,
}

impl Default for ZoneMarkup {
    fn default() -> Self {
        Self {
            show_labels: true,
            show_boundaries: true,
            fill_zones: true,
        }
    }
}

/// Draw every zone onto `frame`. The zone list must already be scaled to the
/// frame size.
pub fn markup_zones(frame: &mut Frame, zones: &ZoneList, opts: ZoneMarkup) {
    for zone in zones.zones() {
        let polygon: Vec<(f32, f32)> = zone.boundary().iter().map(|p| (p.x, p.y)).collect();
        if opts.fill_zones {
            frame.fill_polygon(&polygon, zone.color(), ZONE_FILL_ALPHA);
        }
        if opts.show_boundaries {
            for (i, from) in polygon.iter().enumerate() {
                let to = polygon[(i + 1) % polygon.len()];
                frame.draw_line(*from, to, zone.color());
            }
        }
        if opts.show_labels {
            if let Some(anchor) = zone.boundary().first() {
                frame.add_overlay(zone.name(), anchor.x as i32 + 4, anchor.y as i32 + 14, zone.color());
            }
        }
    }
}

/// Draw a box and `"<id>: <label>"` caption for each tracked object.
pub fn markup_predictions(frame: &mut Frame, objects: &TrackedObjects) {
    for object in objects.values() {
        let color = CLASS_COLORS[object.class_index % CLASS_COLORS.len()];
        let b = &object.bbox;
        frame.draw_rect(b.x, b.y, b.end_x(), b.end_y(), color, 2);
        frame.add_overlay(object.display_label(), b.x as i32, b.y as i32 - 4, color);
    }
}

/// Status lines handed to the stream sink with each frame.
pub fn status_text(
    model: &str,
    labels: &[String],
    engine: &str,
    inference: Duration,
    objects: &TrackedObjects,
) -> Vec<String> {
    let mut text = vec![
        format!("Model: {}", model),
        format!("Labels: {}", labels.join(", ")),
        format!("Loaded to {}", engine),
        format!("Inference time: {:1.3} s", inference.as_secs_f64()),
        "Objects:".to_string(),
    ];
    text.extend(objects.values().map(|o| o.display_label()));
    text
}
