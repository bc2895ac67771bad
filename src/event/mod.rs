//! Analytics events.
//!
//! Four immutable kinds, all stamped with epoch seconds and an object label:
//!
//! - `Occurrence`: a single instantaneous fact (zone entry).
//! - `StartTimed` / `EndTimed`: a pair sharing a `CorrelationId`.
//! - `Value`: a scalar measurement (dwell seconds, counts).
//!
//! Events are handed to an `EventSink` and forgotten; nothing in the engine
//! waits on delivery.

mod sink;

#[cfg(feature = "sink-mqtt")]
pub mod mqtt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::clock::epoch_secs;
use crate::track::ObjectId;

pub use sink::{open_sink, EventSink, FanoutSink, JsonLinesSink, LogSink, MemorySink, TaggedSink};

pub const LABEL_ZONE_ENTRY: &str = "zone_entry";
pub const LABEL_ENTRY: &str = "entry_event";
pub const LABEL_EXIT: &str = "exit_event";
pub const LABEL_DWELL: &str = "dwell_time";
pub const LABEL_TOTAL_DETECTED: &str = "total_detected";
pub const LABEL_ACTIVE_OBJECTS: &str = "active_objects";
pub const LABEL_ZONE_OCCUPANCY: &str = "zone_occupancy";

/// Zone label used when an object sits outside every zone.
pub const NO_ZONE: &str = "None";

/// Links a `StartTimed` event to its `EndTimed` counterpart.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// 128 random bits, hex encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields shared by every event kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    pub event_label: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub object_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_label: Option<String>,
    /// Name of the stream that produced the event (multi-stream deployments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
}

impl EventHeader {
    pub fn new(event_label: &str, at: SystemTime, object_label: &str) -> Self {
        Self {
            event_label: event_label.to_string(),
            timestamp: epoch_secs(at),
            object_label: object_label.to_string(),
            object_id: None,
            zone_label: None,
            stream: None,
        }
    }

    pub fn with_object(mut self, id: ObjectId) -> Self {
        self.object_id = Some(id);
        self
    }

    pub fn with_zone(mut self, zone: &str) -> Self {
        self.zone_label = Some(zone.to_string());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Occurrence {
        #[serde(flatten)]
        header: EventHeader,
    },
    StartTimed {
        #[serde(flatten)]
        header: EventHeader,
        event_id: CorrelationId,
    },
    EndTimed {
        #[serde(flatten)]
        header: EventHeader,
        event_id: CorrelationId,
    },
    Value {
        #[serde(flatten)]
        header: EventHeader,
        value: f64,
    },
}

impl Event {
    pub fn occurrence(header: EventHeader) -> Self {
        Event::Occurrence { header }
    }

    /// Start a timed pair with a freshly generated correlation id.
    pub fn start_timed(header: EventHeader) -> Self {
        Event::StartTimed {
            header,
            event_id: CorrelationId::generate(),
        }
    }

    /// Close a timed pair. `event_id` must come from an earlier `start_timed`.
    pub fn end_timed(header: EventHeader, event_id: CorrelationId) -> Self {
        Event::EndTimed { header, event_id }
    }

    pub fn value(header: EventHeader, value: f64) -> Self {
        Event::Value { header, value }
    }

    pub fn header(&self) -> &EventHeader {
        match self {
            Event::Occurrence { header }
            | Event::StartTimed { header, .. }
            | Event::EndTimed { header, .. }
            | Event::Value { header, .. } => header,
        }
    }

    fn header_mut(&mut self) -> &mut EventHeader {
        match self {
            Event::Occurrence { header }
            | Event::StartTimed { header, .. }
            | Event::EndTimed { header, .. }
            | Event::Value { header, .. } => header,
        }
    }

    pub fn label(&self) -> &str {
        &self.header().event_label
    }

    pub fn timestamp(&self) -> f64 {
        self.header().timestamp
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            Event::StartTimed { event_id, .. } | Event::EndTimed { event_id, .. } => Some(event_id),
            _ => None,
        }
    }

    pub fn value_of(&self) -> Option<f64> {
        match self {
            Event::Value { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Copy of this event attributed to `stream`.
    pub fn tagged(&self, stream: &str) -> Self {
        let mut tagged = self.clone();
        tagged.header_mut().stream = Some(stream.to_string());
        tagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn correlation_ids_are_unique_hex() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let at = UNIX_EPOCH + Duration::from_secs(1_704_067_200);
        let header = EventHeader::new(LABEL_DWELL, at, "person").with_object(4);
        let json = serde_json::to_value(Event::value(header, 5.0)).unwrap();
        assert_eq!(json["type"], "value");
        assert_eq!(json["event_label"], "dwell_time");
        assert_eq!(json["object_id"], 4);
        assert_eq!(json["value"], 5.0);
        assert!(json.get("zone_label").is_none());
    }

    #[test]
    fn tagged_sets_stream_without_touching_original() {
        let header = EventHeader::new(LABEL_ZONE_ENTRY, UNIX_EPOCH, "person").with_zone("lobby");
        let event = Event::occurrence(header);
        let tagged = event.tagged("cam-1");
        assert_eq!(tagged.header().stream.as_deref(), Some("cam-1"));
        assert!(event.header().stream.is_none());
    }
}
