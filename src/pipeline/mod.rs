//! Per-stream pipelines and the compositor that ticks them together.

mod compositor;
mod stream;

use anyhow::{Context, Result};

use crate::config::{AppConfig, InferenceMode};
use crate::detect::{select_engine, AnnotationDetector, Detector, DetectorRegistry, DeviceCapabilities};
use crate::ingest::open_source;
use crate::track::CentroidTracker;
use crate::zone::ZoneList;

pub use compositor::{compose, CompositeOutput, StreamCompositor, StreamResult};
pub use stream::{StreamOutput, StreamPipeline, StreamSettings};

/// Build one pipeline per configured stream, in configuration order.
pub fn build_pipelines(
    cfg: &AppConfig,
    zones: &ZoneList,
    registry: &DetectorRegistry,
    caps: DeviceCapabilities,
) -> Result<Vec<StreamPipeline>> {
    let mut pipelines = Vec::with_capacity(cfg.streams.len());
    for (index, stream) in cfg.streams.iter().enumerate() {
        let source = open_source(stream)?;
        let detector = build_detector(cfg, index, registry, caps)
            .with_context(|| format!("stream '{}'", stream.name))?;
        let settings = StreamSettings {
            frame_size: stream.frame_size,
            confidence: cfg.inference.confidence,
            overlap_threshold: cfg.inference.overlap_threshold,
            labels: cfg.inference.labels.clone(),
            throttle: cfg.events.throttle,
            aggregates: cfg.events.aggregates,
            object_label: cfg.events.object_label.clone(),
        };
        log::info!(
            "stream '{}': {:?} {} with {}",
            stream.name,
            stream.mode,
            stream.arg,
            detector.name()
        );
        pipelines.push(StreamPipeline::new(
            &stream.name,
            source,
            detector,
            Box::new(CentroidTracker::new(cfg.tracker)),
            zones.clone(),
            settings,
        ));
    }
    Ok(pipelines)
}

fn build_detector(
    cfg: &AppConfig,
    index: usize,
    registry: &DetectorRegistry,
    caps: DeviceCapabilities,
) -> Result<Box<dyn Detector>> {
    match cfg.inference.mode {
        InferenceMode::Inference => registry.load(&cfg.inference.models, caps),
        InferenceMode::Annotations => {
            let path = cfg
                .inference
                .annotation_paths
                .get(index)
                .with_context(|| format!("no annotation path for stream {}", index))?;
            let labels = if cfg.inference.labels.is_empty() {
                vec![cfg.events.object_label.clone()]
            } else {
                cfg.inference.labels.clone()
            };
            let mut detector =
                AnnotationDetector::from_file(path, labels, cfg.inference.annotation_frame_offset)?;
            let engine = select_engine(&detector, caps)?;
            detector.load(engine)?;
            Ok(Box::new(detector))
        }
    }
}
