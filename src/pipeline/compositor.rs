use anyhow::{anyhow, Result};

use crate::clock::Clock;
use crate::event::EventSink;
use crate::frame::{hconcat, Frame, WHITE};
use crate::render::TextFont;
use crate::track::TrackedObjects;

use super::stream::StreamPipeline;

/// Per-stream part of a composite tick.
#[derive(Debug)]
pub struct StreamResult {
    pub stream: String,
    pub frame_index: u64,
    pub objects: TrackedObjects,
}

#[derive(Debug)]
pub struct CompositeOutput {
    pub tick: u64,
    pub frame: Frame,
    pub text: Vec<String>,
    pub streams: Vec<StreamResult>,
}

/// Advances every stream once per tick, in configuration order, and merges
/// their rendered frames side by side.
///
/// Streams are polled sequentially: a stream that blocks stalls the tick, and
/// a stream that ends ends the run.
pub struct StreamCompositor {
    pipelines: Vec<StreamPipeline>,
    tick: u64,
    /// When set, overlays are burned into the composite frame.
    font: Option<TextFont>,
}

impl StreamCompositor {
    pub fn new(pipelines: Vec<StreamPipeline>) -> Result<Self> {
        if pipelines.is_empty() {
            return Err(anyhow!("compositor needs at least one stream"));
        }
        Ok(Self {
            pipelines,
            tick: 0,
            font: None,
        })
    }

    pub fn with_font(mut self, font: TextFont) -> Self {
        self.font = Some(font);
        self
    }

    pub fn pipelines(&self) -> &[StreamPipeline] {
        &self.pipelines
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn connect(&mut self) -> Result<()> {
        for pipeline in &mut self.pipelines {
            pipeline.connect()?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        for pipeline in &mut self.pipelines {
            pipeline.close();
        }
    }

    /// Run one synchronized tick. `Ok(None)` once any stream has ended.
    pub fn tick(&mut self, sink: &mut dyn EventSink, clock: &dyn Clock) -> Result<Option<CompositeOutput>> {
        let multi = self.pipelines.len() > 1;
        let mut frames = Vec::with_capacity(self.pipelines.len());
        let mut text = Vec::new();
        let mut streams = Vec::with_capacity(self.pipelines.len());

        for pipeline in &mut self.pipelines {
            let Some(out) = pipeline.tick(sink, clock)? else {
                log::info!("stream '{}' ended", pipeline.name());
                return Ok(None);
            };
            if multi {
                text.push(format!("[{}]", pipeline.name()));
            }
            text.extend(out.text);
            streams.push(StreamResult {
                stream: pipeline.name().to_string(),
                frame_index: out.frame.index,
                objects: out.objects,
            });
            frames.push(out.frame);
        }

        let tick = self.tick;
        self.tick += 1;
        let mut frame = compose(frames, tick)?;
        if let Some(font) = &self.font {
            font.draw(&mut frame);
        }
        Ok(Some(CompositeOutput {
            tick,
            frame,
            text,
            streams,
        }))
    }
}

/// Letterbox frames to the tallest height, place them left to right and draw
/// the tick counter once.
pub fn compose(frames: Vec<Frame>, tick: u64) -> Result<Frame> {
    let height = frames
        .iter()
        .map(Frame::height)
        .max()
        .ok_or_else(|| anyhow!("nothing to compose"))?;
    let padded: Vec<Frame> = frames
        .into_iter()
        .map(|f| if f.height() == height { f } else { f.pad_to_height(height) })
        .collect();
    let mut composite = hconcat(&padded)?;
    composite.index = tick;
    composite.add_overlay(format!("Frame: {}", tick), 10, 20, WHITE);
    Ok(composite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BLACK;

    #[test]
    fn two_vga_streams_compose_side_by_side_with_one_counter() -> Result<()> {
        let composite = compose(
            vec![Frame::blank(640, 480, BLACK), Frame::blank(640, 480, BLACK)],
            7,
        )?;
        assert_eq!(composite.size(), (1280, 480));
        let counters: Vec<_> = composite
            .overlays()
            .iter()
            .filter(|o| o.text.starts_with("Frame: "))
            .collect();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].text, "Frame: 7");
        Ok(())
    }

    #[test]
    fn shorter_streams_are_letterboxed() -> Result<()> {
        let composite = compose(
            vec![Frame::blank(640, 480, WHITE), Frame::blank(320, 240, WHITE)],
            0,
        )?;
        assert_eq!(composite.size(), (960, 480));
        assert_eq!(composite.pixel(700, 10), Some(BLACK));
        assert_eq!(composite.pixel(700, 240), Some(WHITE));
        Ok(())
    }

    #[test]
    fn empty_compositor_is_rejected() {
        assert!(StreamCompositor::new(Vec::new()).is_err());
    }
}
