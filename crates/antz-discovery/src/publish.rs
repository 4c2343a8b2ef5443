//! Publishing decoded events.
//!
//! Events are wrapped in an [`EventRecord`] (timestamp, channel, profile,
//! device) and serialized to JSON. A [`PublishSink`] receives the record on
//! a topic derived from the device, e.g. `ant/asset/586`.

use std::io::Write;

use antz_protocol::{DeviceIdentity, Profile};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::decoder::DecodedEvent;
use crate::error::PublishError;

/// Default topic prefix.
pub const DEFAULT_TOPIC_PREFIX: &str = "ant";

/// Receives serialized events.
pub trait PublishSink {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

/// A decoded event with its context.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub channel: u8,
    pub profile: Profile,
    pub device: Option<DeviceIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i8>,
    #[serde(flatten)]
    pub event: &'a DecodedEvent,
}

impl EventRecord<'_> {
    /// Topic for this record under `prefix`.
    pub fn topic(&self, prefix: &str) -> String {
        topic_for(prefix, self.profile, self.device, self.channel)
    }

    pub fn to_json(&self) -> Result<String, PublishError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `<prefix>/<profile>/<device number>`, or `<prefix>/<profile>/ch<channel>`
/// when the device is not known.
pub fn topic_for(prefix: &str, profile: Profile, device: Option<DeviceIdentity>, channel: u8) -> String {
    match device {
        Some(identity) => format!("{}/{}/{}", prefix, profile.short_name(), identity.number),
        None => format!("{}/{}/ch{}", prefix, profile.short_name(), channel),
    }
}

/// Output style of [`WriterSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One JSON record per line.
    #[default]
    Json,
    /// `topic payload` per line.
    Text,
}

/// Writes records to any writer, one per line.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }
}

impl<W: Write> PublishSink for WriterSink<W> {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        match self.format {
            OutputFormat::Json => writeln!(self.writer, "{}", payload)?,
            OutputFormat::Text => writeln!(self.writer, "{} {}", topic, payload)?,
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every published record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<(String, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads parsed back into JSON values.
    pub fn values(&self) -> Vec<serde_json::Value> {
        self.records
            .iter()
            .filter_map(|(_, payload)| serde_json::from_str(payload).ok())
            .collect()
    }
}

impl PublishSink for MemorySink {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.records.push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: &DecodedEvent) -> EventRecord<'_> {
        EventRecord {
            timestamp: Utc::now(),
            channel: 1,
            profile: Profile::AssetTracker,
            device: Some(DeviceIdentity::new(586, 0x29, 0xD5)),
            rssi: Some(-60),
            event,
        }
    }

    #[test]
    fn test_topics() {
        assert_eq!(
            topic_for("ant", Profile::AssetTracker, Some(DeviceIdentity::new(586, 0x29, 0xD5)), 1),
            "ant/asset/586"
        );
        assert_eq!(topic_for("ant", Profile::Unknown, None, 3), "ant/unknown/ch3");
    }

    #[test]
    fn test_record_json() {
        let event = DecodedEvent::NoAssets;
        let value: serde_json::Value = serde_json::from_str(&record(&event).to_json().unwrap()).unwrap();

        assert_eq!(value["event"], "no_assets");
        assert_eq!(value["profile"], "asset_tracker");
        assert_eq!(value["device"]["number"], 586);
        assert_eq!(value["rssi"], -60);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_record_flattens_event_fields() {
        let event = DecodedEvent::AssetLocation {
            index: 2,
            latitude: None,
            longitude: 10.5,
        };
        let value: serde_json::Value = serde_json::from_str(&record(&event).to_json().unwrap()).unwrap();

        assert_eq!(value["event"], "asset_location");
        assert_eq!(value["index"], 2);
        assert!(value["latitude"].is_null());
        assert_eq!(value["longitude"], 10.5);
    }

    #[test]
    fn test_writer_sink_formats() {
        let mut json = Vec::new();
        WriterSink::new(&mut json, OutputFormat::Json).publish("ant/hrm/1", "{}").unwrap();
        assert_eq!(json, b"{}\n");

        let mut text = Vec::new();
        WriterSink::new(&mut text, OutputFormat::Text).publish("ant/hrm/1", "{}").unwrap();
        assert_eq!(text, b"ant/hrm/1 {}\n");
    }
}
