//! Zone occupancy and object lifecycle analytics
//!
//! This crate turns tracked objects from one or more video streams into
//! events: objects entering and leaving view, moving between named polygon
//! zones, how long they stayed, and periodic aggregate counts.
//!
//! # Architecture
//!
//! Each tick of a stream runs ingest, detect, track, zone and emit in order:
//!
//! 1. A `FrameSource` yields the next frame, resized to the configured size.
//! 2. A `Detector` produces predictions, filtered by confidence and label.
//! 3. A `Tracker` assigns stable ids and reports enter/exit to a
//!    `LifecycleListener`, which records lifecycle state and publishes
//!    `entry_event` / `exit_event` / `dwell_time`.
//! 4. The `ZoneList` computes zone transitions (`zone_entry` occurrences)
//!    from the lifecycle store's last-known zones.
//! 5. The `AggregateEmitter` publishes `total_detected`, `active_objects` and
//!    `zone_occupancy` no more often than the throttle window.
//!
//! The `StreamCompositor` ticks every stream and joins their annotated frames
//! side by side; the `Runtime` drives it and guarantees teardown.
//!
//! # Module Structure
//!
//! - `lifecycle`: per-object lifecycle store and listeners
//! - `zone`: polygons, membership, occupancy and transitions
//! - `throttle`: throttle gate and aggregate emitter
//! - `event`: event values and sinks (log, JSON lines, MQTT)
//! - `pipeline`: per-stream pipeline and compositor
//! - `config`: application configuration
//! - `analysis`, `mot`: offline evaluation against MOT ground truth

pub mod analysis;
pub mod clock;
pub mod config;
pub mod detect;
pub mod event;
pub mod frame;
pub mod ingest;
pub mod lifecycle;
pub mod mot;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod runtime;
pub mod throttle;
pub mod track;
pub mod zone;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AggregateMode, AppConfig, EventsConfig, StreamConfig};
pub use detect::{DetectorRegistry, DeviceCapabilities, Engine};
pub use event::{open_sink, CorrelationId, Event, EventHeader, EventSink, MemorySink};
pub use frame::Frame;
pub use lifecycle::{EventLifecycleListener, LifecycleListener, LifecycleStore};
pub use output::{open_writer, read_results, LogStreamSink, ResultsRecorder};
pub use pipeline::{build_pipelines, StreamCompositor, StreamPipeline, StreamSettings};
pub use runtime::{RunStats, Runtime, StopSignal};
pub use throttle::{AggregateEmitter, Throttle};
pub use track::{ObjectId, TrackedObject, TrackedObjects, Tracker};
pub use zone::{Zone, ZoneList, ZoneTransition};
