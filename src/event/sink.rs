use anyhow::{anyhow, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::Event;
use crate::config::{EventsConfig, SinkKind};

/// Fire-and-forget event destination.
///
/// `publish` never fails the caller. Delivery problems are logged by the sink
/// and the event is dropped.
pub trait EventSink {
    fn publish(&mut self, event: &Event);

    /// Flush buffered events. Called once at teardown.
    fn flush(&mut self) {}
}

/// Logs each event as a JSON line at info level.
#[derive(Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&mut self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(json) => log::info!("event {}", json),
            Err(e) => log::warn!("event {} not serializable: {}", event.label(), e),
        }
    }
}

/// Keeps every published event in memory.
#[derive(Default, Debug)]
pub struct MemorySink {
    events: Vec<Event>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn with_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.label() == label)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for MemorySink {
    fn publish(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

/// Appends events as JSON lines to a local file.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
    failures: u64,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow!("failed to open event file {}: {}", path.display(), e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            failures: 0,
        })
    }

    fn write_event(&mut self, event: &Event) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl EventSink for JsonLinesSink {
    fn publish(&mut self, event: &Event) {
        if let Err(e) = self.write_event(event) {
            self.failures += 1;
            log::warn!(
                "dropping event {} for {} ({} failures): {}",
                event.label(),
                self.path.display(),
                self.failures,
                e
            );
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::warn!("failed to flush {}: {}", self.path.display(), e);
        }
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Publishes every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for FanoutSink {
    fn publish(&mut self, event: &Event) {
        for sink in &mut self.sinks {
            sink.publish(event);
        }
    }

    fn flush(&mut self) {
        for sink in &mut self.sinks {
            sink.flush();
        }
    }
}

/// Attributes events to one stream before forwarding them.
pub struct TaggedSink<'a> {
    inner: &'a mut dyn EventSink,
    stream: &'a str,
}

impl<'a> TaggedSink<'a> {
    pub fn new(inner: &'a mut dyn EventSink, stream: &'a str) -> Self {
        Self { inner, stream }
    }
}

impl EventSink for TaggedSink<'_> {
    fn publish(&mut self, event: &Event) {
        self.inner.publish(&event.tagged(self.stream));
    }

    fn flush(&mut self) {
        self.inner.flush();
    }
}

/// Build the sink selected by configuration.
pub fn open_sink(cfg: &EventsConfig) -> Result<Box<dyn EventSink>> {
    match cfg.sink {
        SinkKind::Log => Ok(Box::new(LogSink)),
        SinkKind::Jsonl => {
            let path = cfg
                .path
                .as_deref()
                .ok_or_else(|| anyhow!("events.path is required for the JSONL sink"))?;
            Ok(Box::new(JsonLinesSink::open(path)?))
        }
        SinkKind::Mqtt => {
            #[cfg(feature = "sink-mqtt")]
            {
                let mqtt = cfg
                    .mqtt
                    .as_ref()
                    .ok_or_else(|| anyhow!("events.mqtt is required for the MQTT sink"))?;
                Ok(Box::new(super::mqtt::MqttSink::connect(mqtt)?))
            }
            #[cfg(not(feature = "sink-mqtt"))]
            {
                Err(anyhow!("the MQTT event sink requires the sink-mqtt feature"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventHeader, LABEL_ZONE_ENTRY};
    use std::time::UNIX_EPOCH;

    fn entry(zone: &str) -> Event {
        Event::occurrence(EventHeader::new(LABEL_ZONE_ENTRY, UNIX_EPOCH, "person").with_zone(zone))
    }

    #[test]
    fn json_lines_sink_appends_one_line_per_event() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("events.jsonl");
        {
            let mut sink = JsonLinesSink::open(&path)?;
            sink.publish(&entry("lobby"));
            sink.publish(&entry("exit"));
            sink.flush();
        }
        let raw = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Event = serde_json::from_str(lines[1])?;
        assert_eq!(parsed.header().zone_label.as_deref(), Some("exit"));
        Ok(())
    }

    #[test]
    fn tagged_sink_forwards_with_stream_name() {
        let mut memory = MemorySink::new();
        {
            let mut tagged = TaggedSink::new(&mut memory, "cam-2");
            tagged.publish(&entry("lobby"));
        }
        assert_eq!(memory.events()[0].header().stream.as_deref(), Some("cam-2"));
    }
}
