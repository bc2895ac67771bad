use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::track::TrackerSettings;

const DEFAULT_CONFIG_PATH: &str = "app.json";
const DEFAULT_FRAME_SIZE: (u32, u32) = (640, 480);
const DEFAULT_OUTPUT_PATH: &str = "output";
const DEFAULT_OUTPUT_FPS: f32 = 30.0;
const DEFAULT_FONT_SIZE: f32 = 16.0;
const DEFAULT_THROTTLE_SECS: f64 = 2.0;
const DEFAULT_OBJECT_LABEL: &str = "person";
const DEFAULT_MQTT_TOPIC_PREFIX: &str = "zone-analytics";
const DEFAULT_ANNOTATION_FRAME_OFFSET: u64 = 1;

// ----------------------------------------------------------------------------
// Enumerated settings
// ----------------------------------------------------------------------------

/// Closed set of accepted spellings for one config field.
trait ConfigEnum: Sized + Copy + 'static {
    const FIELD: &'static str;
    const VARIANTS: &'static [(&'static str, Self)];
}

/// Case-insensitive lookup. Missing values and unknown spellings are errors
/// naming the field and, for unknown spellings, the accepted set.
fn parse_enum<T: ConfigEnum>(value: Option<&str>) -> Result<T> {
    let raw = value.ok_or_else(|| anyhow!("{} not found in config", T::FIELD))?;
    T::VARIANTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw.trim()))
        .map(|(_, v)| *v)
        .ok_or_else(|| {
            let accepted: Vec<&str> = T::VARIANTS.iter().map(|(name, _)| *name).collect();
            anyhow!(
                "invalid {}: got '{}', expected one of [{}]",
                T::FIELD,
                raw,
                accepted.join(", ")
            )
        })
}

fn parse_enum_or<T: ConfigEnum>(value: Option<&str>, default: T) -> Result<T> {
    match value {
        Some(raw) => parse_enum(Some(raw)),
        None => Ok(default),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    File,
    Ip,
    Usb,
}

impl ConfigEnum for StreamMode {
    const FIELD: &'static str = "stream mode";
    const VARIANTS: &'static [(&'static str, Self)] =
        &[("FILE", Self::File), ("IP", Self::Ip), ("USB", Self::Usb)];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InferenceMode {
    Inference,
    Annotations,
}

impl ConfigEnum for InferenceMode {
    const FIELD: &'static str = "inference mode";
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("INFERENCE", Self::Inference),
        ("ANNOTATIONS", Self::Annotations),
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Raw,
    Mjpeg,
}

impl ConfigEnum for Codec {
    const FIELD: &'static str = "output codec";
    const VARIANTS: &'static [(&'static str, Self)] = &[("RAW", Self::Raw), ("MJPEG", Self::Mjpeg)];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    Log,
    Jsonl,
    Mqtt,
}

impl ConfigEnum for SinkKind {
    const FIELD: &'static str = "event sink";
    const VARIANTS: &'static [(&'static str, Self)] =
        &[("LOG", Self::Log), ("JSONL", Self::Jsonl), ("MQTT", Self::Mqtt)];
}

/// Which aggregates the throttled emitter publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateMode {
    Totals,
    Occupancy,
    Both,
}

impl AggregateMode {
    pub fn includes_totals(self) -> bool {
        matches!(self, Self::Totals | Self::Both)
    }

    pub fn includes_occupancy(self) -> bool {
        matches!(self, Self::Occupancy | Self::Both)
    }
}

impl ConfigEnum for AggregateMode {
    const FIELD: &'static str = "aggregate mode";
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("TOTALS", Self::Totals),
        ("OCCUPANCY", Self::Occupancy),
        ("BOTH", Self::Both),
    ];
}

// ----------------------------------------------------------------------------
// File layout
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    /// Deployments that keep settings under an `app_configurations` key.
    app_configurations: Option<Box<AppConfigFile>>,
    streams: Option<Vec<StreamConfigFile>>,
    /// Single-stream shorthand.
    video_stream: Option<StreamConfigFile>,
    inference: Option<InferenceConfigFile>,
    tracker: Option<TrackerConfigFile>,
    output: Option<OutputConfigFile>,
    zones: Option<PathBuf>,
    events: Option<EventsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    name: Option<String>,
    mode: Option<String>,
    arg: Option<StreamArg>,
    #[serde(alias = "app_frame_size")]
    frame_size: Option<[u32; 2]>,
}

/// USB devices are commonly given as a bare index.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamArg {
    Text(String),
    Index(i64),
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    mode: Option<String>,
    models: Option<Vec<String>>,
    confidence: Option<f32>,
    overlap_threshold: Option<f32>,
    labels: Option<Vec<String>>,
    annotation_paths: Option<Vec<PathBuf>>,
    annotation_frame_offset: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    max_distance: Option<f32>,
    deregister_frames: Option<u32>,
    min_inertia: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    enabled: Option<bool>,
    path: Option<PathBuf>,
    fps: Option<f32>,
    codec: Option<String>,
    chunk_duration: Option<f32>,
    results_path: Option<PathBuf>,
    font_path: Option<PathBuf>,
    font_size: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct EventsConfigFile {
    sink: Option<String>,
    path: Option<PathBuf>,
    mqtt: Option<MqttConfigFile>,
    throttle_secs: Option<f64>,
    aggregates: Option<String>,
    object_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker: Option<String>,
    topic_prefix: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

// ----------------------------------------------------------------------------
// Validated settings
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub streams: Vec<StreamConfig>,
    pub inference: InferenceConfig,
    pub tracker: TrackerSettings,
    pub output: OutputConfig,
    pub zones_path: Option<PathBuf>,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub name: String,
    pub mode: StreamMode,
    pub arg: String,
    /// Frames are resized to fit this size, keeping aspect ratio.
    pub frame_size: (u32, u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub mode: InferenceMode,
    pub models: Vec<String>,
    pub confidence: f32,
    pub overlap_threshold: f32,
    /// Allow-list; empty keeps every label.
    pub labels: Vec<String>,
    /// One MOT file per stream in ANNOTATIONS mode.
    pub annotation_paths: Vec<PathBuf>,
    pub annotation_frame_offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub fps: f32,
    pub codec: Codec,
    pub chunk_duration: Option<Duration>,
    pub results_path: Option<PathBuf>,
    /// Font for burning text into output frames; without one text stays as
    /// overlay records.
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventsConfig {
    pub sink: SinkKind,
    pub path: Option<PathBuf>,
    pub mqtt: Option<MqttSettings>,
    pub throttle: Duration,
    pub aggregates: AggregateMode,
    pub object_label: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            path: None,
            mqtt: None,
            throttle: Duration::from_secs_f64(DEFAULT_THROTTLE_SECS),
            aggregates: AggregateMode::Both,
            object_label: DEFAULT_OBJECT_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    /// `host:port`
    pub broker: String,
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AppConfig {
    /// Load from the file named by `ZONE_ANALYTICS_CONFIG` (default
    /// `app.json`), apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let path = std::env::var("ZONE_ANALYTICS_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::from_path(Path::new(&path))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = read_config_file(path)?;
        Self::finish(file)
    }

    /// Parse JSON text, apply environment overrides and validate.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: AppConfigFile =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        Self::finish(file)
    }

    fn finish(file: AppConfigFile) -> Result<Self> {
        let mut cfg = Self::from_file(file)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let file = match file.app_configurations {
            Some(nested) => *nested,
            None => file,
        };

        let mut stream_files = file.streams.unwrap_or_default();
        if let Some(single) = file.video_stream {
            stream_files.insert(0, single);
        }
        let streams = stream_files
            .into_iter()
            .enumerate()
            .map(|(i, s)| stream_from_file(i, s))
            .collect::<Result<Vec<_>>>()?;
        if streams.is_empty() {
            return Err(anyhow!("streams not found in config"));
        }

        let inference_file = required(file.inference, "inference")?;
        let mode = parse_enum_or(inference_file.mode.as_deref(), InferenceMode::Inference)?;
        let models = match mode {
            InferenceMode::Inference => required(inference_file.models, "inference models")?,
            InferenceMode::Annotations => inference_file.models.unwrap_or_default(),
        };
        let inference = InferenceConfig {
            mode,
            models,
            confidence: required(inference_file.confidence, "inference confidence")?,
            overlap_threshold: required(
                inference_file.overlap_threshold,
                "inference overlap_threshold",
            )?,
            labels: required(inference_file.labels, "inference labels")?,
            annotation_paths: inference_file.annotation_paths.unwrap_or_default(),
            annotation_frame_offset: inference_file
                .annotation_frame_offset
                .unwrap_or(DEFAULT_ANNOTATION_FRAME_OFFSET),
        };

        let tracker_file = required(file.tracker, "tracker")?;
        let tracker = TrackerSettings {
            max_distance: required(tracker_file.max_distance, "tracker max_distance")?,
            deregister_frames: required(tracker_file.deregister_frames, "tracker deregister_frames")?,
            min_inertia: required(tracker_file.min_inertia, "tracker min_inertia")?,
        };

        let output_file = file.output.unwrap_or_default();
        let output = OutputConfig {
            enabled: output_file.enabled.unwrap_or(false),
            path: output_file
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            fps: output_file.fps.unwrap_or(DEFAULT_OUTPUT_FPS),
            codec: parse_enum_or(output_file.codec.as_deref(), Codec::Raw)?,
            chunk_duration: match output_file.chunk_duration {
                Some(secs) if secs <= 0.0 || !secs.is_finite() => {
                    return Err(anyhow!(
                        "output chunk_duration must be a positive number of seconds, got {}",
                        secs
                    ))
                }
                Some(secs) => Some(Duration::try_from_secs_f32(secs).map_err(|_| {
                    anyhow!(
                        "output chunk_duration is out of range, got {} seconds",
                        secs
                    )
                })?),
                None => None,
            },
            results_path: output_file.results_path,
            font_path: output_file.font_path,
            font_size: output_file.font_size.unwrap_or(DEFAULT_FONT_SIZE),
        };

        let events_file = file.events.unwrap_or_default();
        let defaults = EventsConfig::default();
        let events = EventsConfig {
            sink: parse_enum_or(events_file.sink.as_deref(), defaults.sink)?,
            path: events_file.path,
            mqtt: events_file.mqtt.map(|m| MqttSettings {
                broker: m.broker.unwrap_or_default(),
                topic_prefix: m
                    .topic_prefix
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),
                username: m.username,
                password: m.password,
            }),
            throttle: throttle_from_secs(events_file.throttle_secs.unwrap_or(DEFAULT_THROTTLE_SECS))?,
            aggregates: parse_enum_or(events_file.aggregates.as_deref(), defaults.aggregates)?,
            object_label: events_file.object_label.unwrap_or(defaults.object_label),
        };

        Ok(Self {
            streams,
            inference,
            tracker,
            output,
            zones_path: file.zones,
            events,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(confidence) = std::env::var("ZONE_ANALYTICS_CONFIDENCE") {
            self.inference.confidence = confidence.trim().parse().map_err(|_| {
                anyhow!(
                    "ZONE_ANALYTICS_CONFIDENCE must be a number, got '{}'",
                    confidence
                )
            })?;
        }
        if let Ok(arg) = std::env::var("ZONE_ANALYTICS_STREAM_ARG") {
            if !arg.trim().is_empty() {
                match self.streams.first_mut() {
                    Some(stream) => stream.arg = arg,
                    None => log::warn!("ZONE_ANALYTICS_STREAM_ARG set but no stream is configured"),
                }
            }
        }
        if let Ok(path) = std::env::var("ZONE_ANALYTICS_ZONES") {
            if !path.trim().is_empty() {
                self.zones_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(secs) = std::env::var("ZONE_ANALYTICS_THROTTLE_SECS") {
            let secs: f64 = secs.trim().parse().map_err(|_| {
                anyhow!(
                    "ZONE_ANALYTICS_THROTTLE_SECS must be a number of seconds, got '{}'",
                    secs
                )
            })?;
            self.events.throttle = throttle_from_secs(secs)?;
        }
        if let Ok(enabled) = std::env::var("ZONE_ANALYTICS_OUTPUT_ENABLED") {
            self.output.enabled = parse_bool(&enabled).ok_or_else(|| {
                anyhow!(
                    "ZONE_ANALYTICS_OUTPUT_ENABLED must be true or false, got '{}'",
                    enabled
                )
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for stream in &self.streams {
            if stream.arg.trim().is_empty() {
                return Err(anyhow!("stream '{}' has an empty arg", stream.name));
            }
            if stream.frame_size.0 == 0 || stream.frame_size.1 == 0 {
                return Err(anyhow!(
                    "stream '{}' frame_size must be non-zero, got {}x{}",
                    stream.name,
                    stream.frame_size.0,
                    stream.frame_size.1
                ));
            }
        }
        let mut names: Vec<&str> = self.streams.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(anyhow!("duplicate stream name '{}'", pair[0]));
        }

        let inference = &self.inference;
        check_unit_range("inference confidence", inference.confidence)?;
        check_unit_range("inference overlap_threshold", inference.overlap_threshold)?;
        match inference.mode {
            InferenceMode::Inference => {
                if inference.models.is_empty() {
                    return Err(anyhow!("No models in model ID list"));
                }
            }
            InferenceMode::Annotations => {
                if inference.annotation_paths.len() != self.streams.len() {
                    return Err(anyhow!(
                        "ANNOTATIONS mode needs one annotation path per stream: {} streams, {} paths",
                        self.streams.len(),
                        inference.annotation_paths.len()
                    ));
                }
            }
        }

        if !(self.tracker.max_distance > 0.0) {
            return Err(anyhow!(
                "tracker max_distance must be positive, got {}",
                self.tracker.max_distance
            ));
        }

        if !(self.output.fps > 0.0 && self.output.fps.is_finite()) {
            return Err(anyhow!("output fps must be positive, got {}", self.output.fps));
        }
        if !(self.output.font_size > 0.0 && self.output.font_size.is_finite()) {
            return Err(anyhow!(
                "output font_size must be positive, got {}",
                self.output.font_size
            ));
        }

        match self.events.sink {
            SinkKind::Jsonl if self.events.path.is_none() => {
                return Err(anyhow!("events path not found in config (required for JSONL sink)"))
            }
            SinkKind::Mqtt => {
                let broker = self.events.mqtt.as_ref().map(|m| m.broker.trim()).unwrap_or("");
                if broker.is_empty() {
                    return Err(anyhow!("events mqtt broker not found in config"));
                }
            }
            _ => {}
        }
        if self.events.object_label.trim().is_empty() {
            return Err(anyhow!("events object_label must not be empty"));
        }
        Ok(())
    }
}

fn stream_from_file(index: usize, file: StreamConfigFile) -> Result<StreamConfig> {
    let mode = parse_enum(file.mode.as_deref())?;
    let arg = match file.arg {
        Some(StreamArg::Text(text)) => text,
        Some(StreamArg::Index(i)) => i.to_string(),
        None => return Err(anyhow!("stream arg not found in config")),
    };
    let frame_size = file
        .frame_size
        .map(|[w, h]| (w, h))
        .unwrap_or(DEFAULT_FRAME_SIZE);
    Ok(StreamConfig {
        name: file.name.unwrap_or_else(|| format!("stream{}", index)),
        mode,
        arg,
        frame_size,
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("{} not found in config", field))
}

/// Rejects negative, non-finite and out-of-range values.
fn throttle_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        anyhow!(
            "events throttle_secs must be a non-negative number of seconds within range, got {}",
            secs
        )
    })
}

fn check_unit_range(field: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within 0..=1, got {}", field, value));
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_parsing_is_case_insensitive() {
        assert_eq!(parse_enum::<StreamMode>(Some("usb")).unwrap(), StreamMode::Usb);
        assert_eq!(parse_enum::<Codec>(Some(" Mjpeg ")).unwrap(), Codec::Mjpeg);
    }

    #[test]
    fn unknown_enum_value_names_field_value_and_accepted_set() {
        let err = parse_enum::<StreamMode>(Some("RTSP")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid stream mode: got 'RTSP', expected one of [FILE, IP, USB]"
        );
        let err = parse_enum::<StreamMode>(None).unwrap_err();
        assert_eq!(err.to_string(), "stream mode not found in config");
    }

    #[test]
    fn aggregate_mode_selection() {
        assert!(AggregateMode::Both.includes_totals());
        assert!(AggregateMode::Both.includes_occupancy());
        assert!(!AggregateMode::Totals.includes_occupancy());
        assert!(!AggregateMode::Occupancy.includes_totals());
    }

    #[test]
    fn stream_arg_accepts_device_index_and_legacy_keys() -> Result<()> {
        let file: StreamConfigFile =
            serde_json::from_str(r#"{"mode": "USB", "arg": 0, "app_frame_size": [1280, 720]}"#)?;
        let stream = stream_from_file(2, file)?;
        assert_eq!(stream.arg, "0");
        assert_eq!(stream.frame_size, (1280, 720));
        assert_eq!(stream.name, "stream2");
        Ok(())
    }

    #[test]
    fn throttle_window_bounds() {
        assert_eq!(throttle_from_secs(0.0).unwrap(), Duration::ZERO);
        assert_eq!(throttle_from_secs(2.5).unwrap(), Duration::from_millis(2500));
        for bad in [-1.0, f64::NAN, f64::INFINITY, 1e300] {
            let err = throttle_from_secs(bad).unwrap_err();
            assert!(err.to_string().contains("events throttle_secs"), "{err}");
        }
    }

    #[test]
    fn bool_spellings() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
