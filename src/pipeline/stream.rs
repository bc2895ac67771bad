use anyhow::{Context, Result};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::AggregateMode;
use crate::detect::{filter_by_label, Detector};
use crate::event::{EventSink, TaggedSink};
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceStats};
use crate::lifecycle::{EventLifecycleListener, LifecycleStore};
use crate::render::{self, ZoneMarkup};
use crate::throttle::AggregateEmitter;
use crate::track::{Tracker, TrackedObjects};
use crate::zone::ZoneList;

/// Per-stream processing parameters.
#[derive(Clone, Debug)]
pub struct StreamSettings {
    pub frame_size: (u32, u32),
    pub confidence: f32,
    pub overlap_threshold: f32,
    pub labels: Vec<String>,
    pub throttle: Duration,
    pub aggregates: AggregateMode,
    pub object_label: String,
}

/// Result of one stream tick.
#[derive(Debug)]
pub struct StreamOutput {
    pub frame: Frame,
    pub text: Vec<String>,
    pub objects: TrackedObjects,
}

/// One video stream with its own tracker, lifecycle scope and throttle.
///
/// Identifiers are local to the stream; events leave tagged with the stream
/// name.
pub struct StreamPipeline {
    name: String,
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    store: LifecycleStore,
    zones: ZoneList,
    frame_zones: ZoneList,
    emitter: AggregateEmitter,
    settings: StreamSettings,
}

impl StreamPipeline {
    pub fn new(
        name: &str,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        tracker: Box<dyn Tracker>,
        zones: ZoneList,
        settings: StreamSettings,
    ) -> Self {
        let emitter = AggregateEmitter::new(settings.throttle, settings.aggregates, &settings.object_label);
        Self {
            name: name.to_string(),
            source,
            detector,
            tracker,
            store: LifecycleStore::new(),
            frame_zones: zones.clone(),
            zones,
            emitter,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &LifecycleStore {
        &self.store
    }

    pub fn source_stats(&self) -> SourceStats {
        self.source.stats()
    }

    pub fn is_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    pub fn connect(&mut self) -> Result<()> {
        self.source
            .connect()
            .with_context(|| format!("stream '{}'", self.name))
    }

    pub fn close(&mut self) {
        self.source.close();
    }

    /// Acquire, detect, track, evaluate zones, emit aggregates and render one
    /// frame. `Ok(None)` when the source has ended.
    pub fn tick(&mut self, sink: &mut dyn EventSink, clock: &dyn Clock) -> Result<Option<StreamOutput>> {
        let Some(frame) = self
            .source
            .next_frame()
            .with_context(|| format!("stream '{}': frame acquisition", self.name))?
        else {
            return Ok(None);
        };
        let (max_w, max_h) = self.settings.frame_size;
        let mut frame = if frame.size() == (max_w, max_h) {
            frame
        } else {
            frame.resize_keep_scale(max_w, max_h)
        };
        if self.frame_zones.image_size() != frame.size() {
            self.frame_zones = self.zones.scaled_to(frame.width(), frame.height());
        }

        let result = self
            .detector
            .detect(&frame, self.settings.confidence, self.settings.overlap_threshold)
            .with_context(|| format!("stream '{}': detection", self.name))?;
        let predictions = filter_by_label(result.predictions, &self.settings.labels);

        let mut sink = TaggedSink::new(sink, &self.name);
        let objects = {
            let mut listener =
                EventLifecycleListener::new(&self.frame_zones, &mut self.store, &mut sink, clock);
            self.tracker.update(&predictions, &mut listener)
        };

        let transitions = self.frame_zones.transitions(&objects, &self.store);
        if !transitions.is_empty() {
            let mut listener =
                EventLifecycleListener::new(&self.frame_zones, &mut self.store, &mut sink, clock);
            listener.apply_transitions(&transitions, &objects);
        }

        self.emitter
            .emit_if_due(&objects, &self.frame_zones, &mut sink, clock);

        render::markup_zones(&mut frame, &self.frame_zones, ZoneMarkup::default());
        render::markup_predictions(&mut frame, &objects);
        let engine = self
            .detector
            .engine()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unloaded".to_string());
        let text = render::status_text(
            self.detector.name(),
            self.detector.labels(),
            &engine,
            result.duration,
            &objects,
        );

        Ok(Some(StreamOutput {
            frame,
            text,
            objects,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::detect::{Engine, SyntheticDetector};
    use crate::event::{Event, MemorySink, LABEL_ENTRY, LABEL_TOTAL_DETECTED};
    use crate::ingest::SyntheticSource;
    use crate::track::{CentroidTracker, TrackerSettings};
    use crate::zone::Zone;

    fn settings() -> StreamSettings {
        StreamSettings {
            frame_size: (320, 240),
            confidence: 0.5,
            overlap_threshold: 0.3,
            labels: vec!["person".to_string()],
            throttle: Duration::from_secs(2),
            aggregates: AggregateMode::Both,
            object_label: "person".to_string(),
        }
    }

    fn pipeline(frames: u32) -> Result<StreamPipeline> {
        let source = SyntheticSource::from_arg(&format!("stub://lobby?frames={}", frames), 640, 480)?;
        let mut detector = SyntheticDetector::new(2);
        detector.load(Engine::Cpu)?;
        let tracker = CentroidTracker::new(TrackerSettings {
            max_distance: 60.0,
            deregister_frames: 3,
            min_inertia: 1,
        });
        let zones = ZoneList::new(
            vec![Zone::rect("left", 0.0, 0.0, 320.0, 480.0, [0, 255, 0])?],
            640,
            480,
        )?;
        Ok(StreamPipeline::new(
            "lobby",
            Box::new(source),
            Box::new(detector),
            Box::new(tracker),
            zones,
            settings(),
        ))
    }

    #[test]
    fn tick_resizes_tracks_and_tags_events() -> Result<()> {
        let mut pipeline = pipeline(3)?;
        pipeline.connect()?;
        let clock = ManualClock::at_epoch_secs(1_000);
        let mut sink = MemorySink::new();

        let out = pipeline.tick(&mut sink, &clock)?.expect("frame");
        assert_eq!(out.frame.size(), (320, 240));
        assert_eq!(out.objects.len(), 2);
        assert_eq!(pipeline.store().len(), 2);
        assert!(out.text.iter().any(|line| line == "0: person"));

        let starts: Vec<&Event> = sink.with_label(LABEL_ENTRY).collect();
        assert_eq!(starts.len(), 2);
        assert!(starts.iter().all(|e| e.header().stream.as_deref() == Some("lobby")));
        assert_eq!(sink.with_label(LABEL_TOTAL_DETECTED).count(), 1);

        pipeline.tick(&mut sink, &clock)?;
        pipeline.tick(&mut sink, &clock)?;
        assert!(pipeline.tick(&mut sink, &clock)?.is_none());
        Ok(())
    }
}
