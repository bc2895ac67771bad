//! Decoded RGB frames and the pixel operations the pipeline needs.
//!
//! A frame wraps an `image::RgbImage`. Text is recorded as `TextOverlay`
//! records; `rasterize_text` burns them into the pixels once a font is
//! available, and the raw writer persists them in its sidecar either way.

use ab_glyph::{Font, PxScale};
use anyhow::{anyhow, Result};
use image::{imageops, Rgb as RgbPixel, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut, draw_text_mut};
use imageproc::pixelops::interpolate;
use imageproc::point::Point;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

pub type Rgb = [u8; 3];

pub const BLACK: Rgb = [0, 0, 0];
pub const WHITE: Rgb = [255, 255, 255];

/// Opacity used when filling zone polygons.
pub const ZONE_FILL_ALPHA: f32 = 0.3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    /// Left edge of the text.
    pub x: i32,
    /// Baseline of the text.
    pub y: i32,
    pub color: Rgb,
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,
    /// Zero-based position in the source stream.
    pub index: u64,
    overlays: Vec<TextOverlay>,
}

impl Frame {
    /// Wrap a packed row-major rgb24 buffer.
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} rgb24",
                data.len(),
                expected,
                width,
                height
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", width, height))?;
        Ok(Self::from_image(image, index))
    }

    pub fn from_image(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            overlays: Vec::new(),
        }
    }

    pub fn blank(width: u32, height: u32, color: Rgb) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, RgbPixel(color)), 0)
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.image.into_raw()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb) {
        if let Some(p) = self.image.get_pixel_mut_checked(x, y) {
            *p = RgbPixel(color);
        }
    }

    pub fn overlays(&self) -> &[TextOverlay] {
        &self.overlays
    }

    pub fn add_overlay(&mut self, text: impl Into<String>, x: i32, y: i32, color: Rgb) {
        self.overlays.push(TextOverlay {
            text: text.into(),
            x,
            y,
            color,
        });
    }

    // ------------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------------

    /// Rectangle outline of the given thickness, growing inwards.
    pub fn draw_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgb, thickness: u32) {
        let left = x0.min(x1).round() as i32;
        let top = y0.min(y1).round() as i32;
        let right = x0.max(x1).round() as i32;
        let bottom = y0.max(y1).round() as i32;
        for inset in 0..thickness.max(1) as i32 {
            let width = right - left + 1 - 2 * inset;
            let height = bottom - top + 1 - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(left + inset, top + inset).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(&mut self.image, rect, RgbPixel(color));
        }
    }

    pub fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb) {
        draw_line_segment_mut(&mut self.image, from, to, RgbPixel(color));
    }

    /// Alpha-blend `color` over the area of `polygon`.
    pub fn fill_polygon(&mut self, polygon: &[(f32, f32)], color: Rgb, alpha: f32) {
        let mut points: Vec<Point<i32>> = polygon
            .iter()
            .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
            .collect();
        points.dedup();
        // draw_polygon_mut rejects an explicitly closed ring.
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            return;
        }
        let alpha = alpha.clamp(0.0, 1.0);
        let mut layer = self.image.clone();
        draw_polygon_mut(&mut layer, &points, RgbPixel(color));
        for (dst, src) in self.image.pixels_mut().zip(layer.pixels()) {
            if dst != src {
                *dst = interpolate(*src, *dst, alpha);
            }
        }
    }

    /// Draw every text overlay into the pixels. The records are kept.
    pub fn rasterize_text(&mut self, font: &impl Font, scale: PxScale) {
        let ascent = scale.y.round() as i32;
        for overlay in &self.overlays {
            draw_text_mut(
                &mut self.image,
                RgbPixel(overlay.color),
                overlay.x,
                overlay.y - ascent,
                scale,
                font,
                &overlay.text,
            );
        }
    }

    // ------------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------------

    /// Resize to exactly `width` x `height`.
    pub fn resize(&self, width: u32, height: u32) -> Frame {
        if (width, height) == self.size() || self.width() == 0 || self.height() == 0 {
            return self.clone();
        }
        let image = imageops::resize(&self.image, width, height, imageops::FilterType::Triangle);
        Frame {
            image,
            index: self.index,
            overlays: self.scaled_overlays(width, height),
        }
    }

    /// Resize so that the frame fits in `max_width` x `max_height`, keeping
    /// the aspect ratio.
    pub fn resize_keep_scale(&self, max_width: u32, max_height: u32) -> Frame {
        if self.width() == 0 || self.height() == 0 {
            return self.clone();
        }
        let scale = (max_width as f32 / self.width() as f32).min(max_height as f32 / self.height() as f32);
        let width = ((self.width() as f32 * scale).round() as u32).max(1);
        let height = ((self.height() as f32 * scale).round() as u32).max(1);
        self.resize(width, height)
    }

    /// Letterbox vertically to `height`, centering the content on black.
    /// Frames already at least `height` tall are returned unchanged.
    pub fn pad_to_height(&self, height: u32) -> Frame {
        if self.height() >= height {
            return self.clone();
        }
        let top = (height - self.height()) / 2;
        let mut image = RgbImage::from_pixel(self.width(), height, RgbPixel(BLACK));
        imageops::replace(&mut image, &self.image, 0, i64::from(top));
        let overlays = self
            .overlays
            .iter()
            .cloned()
            .map(|mut o| {
                o.y += top as i32;
                o
            })
            .collect();
        Frame {
            image,
            index: self.index,
            overlays,
        }
    }

    fn scaled_overlays(&self, width: u32, height: u32) -> Vec<TextOverlay> {
        let sx = width as f32 / self.width().max(1) as f32;
        let sy = height as f32 / self.height().max(1) as f32;
        self.overlays
            .iter()
            .cloned()
            .map(|mut o| {
                o.x = (o.x as f32 * sx).round() as i32;
                o.y = (o.y as f32 * sy).round() as i32;
                o
            })
            .collect()
    }
}

/// Place frames side by side. All frames must share one height.
pub fn hconcat(frames: &[Frame]) -> Result<Frame> {
    let Some(first) = frames.first() else {
        return Err(anyhow!("cannot concatenate an empty frame list"));
    };
    let height = first.height();
    if let Some(bad) = frames.iter().find(|f| f.height() != height) {
        return Err(anyhow!(
            "frame heights differ: {} vs {}",
            height,
            bad.height()
        ));
    }
    let width: u32 = frames.iter().map(Frame::width).sum();
    let mut out = Frame::blank(width, height, BLACK);
    let mut x_offset = 0u32;
    for frame in frames {
        imageops::replace(&mut out.image, &frame.image, i64::from(x_offset), 0);
        out.overlays.extend(frame.overlays.iter().cloned().map(|mut o| {
            o.x += x_offset as i32;
            o
        }));
        x_offset += frame.width();
    }
    out.index = first.index;
    Ok(out)
}
