//! MQTT event sink (feature: sink-mqtt).
//!
//! Events are queued with `try_publish` so a slow or absent broker never
//! blocks a processing tick. The connection is driven on a background thread.

use anyhow::{anyhow, Result};
use rumqttc::{Client, MqttOptions, QoS};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{Event, EventSink};
use crate::config::MqttSettings;

const CLIENT_ID: &str = "zone-analytics";
const QUEUE_CAPACITY: usize = 64;

pub struct MqttSink {
    client: Client,
    topic_prefix: String,
    dropped: u64,
    _worker: JoinHandle<()>,
}

impl MqttSink {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let (host, port) = split_host_port(&settings.broker)?;
        let mut options = MqttOptions::new(CLIENT_ID, host, port);
        options.set_keep_alive(Duration::from_secs(60));
        if let Some(user) = &settings.username {
            options.set_credentials(user, settings.password.clone().unwrap_or_default());
        }
        let (client, mut connection) = Client::new(options, QUEUE_CAPACITY);
        let worker = std::thread::spawn(move || {
            for notification in connection.iter() {
                if let Err(e) = notification {
                    log::warn!("mqtt connection error: {}", e);
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        });
        log::info!("mqtt sink publishing to {}", settings.broker);
        Ok(Self {
            client,
            topic_prefix: settings.topic_prefix.trim_end_matches('/').to_string(),
            dropped: 0,
            _worker: worker,
        })
    }

    fn topic_for(&self, event: &Event) -> String {
        format!("{}/{}", self.topic_prefix, event.label())
    }
}

impl EventSink for MqttSink {
    fn publish(&mut self, event: &Event) {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("event {} not serializable: {}", event.label(), e);
                return;
            }
        };
        let topic = self.topic_for(event);
        if let Err(e) = self
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
        {
            self.dropped += 1;
            log::warn!("mqtt publish dropped ({} total): {}", self.dropped, e);
        }
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        // The connection worker is detached and ends with the process.
        let _ = self.client.try_disconnect();
    }
}

fn split_host_port(broker: &str) -> Result<(String, u16)> {
    let (host, port) = broker
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("mqtt broker must be host:port, got '{}'", broker))?;
    let port = port
        .parse()
        .map_err(|_| anyhow!("mqtt broker port must be numeric, got '{}'", port))?;
    Ok((host.to_string(), port))
}
