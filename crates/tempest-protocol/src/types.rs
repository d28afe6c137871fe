//! Common types used across the station protocol

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message kinds broadcast by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "evt_precip")]
    PrecipEvent,
    #[serde(rename = "evt_strike")]
    StrikeEvent,
    #[serde(rename = "rapid_wind")]
    RapidWind,
    #[serde(rename = "obs_air")]
    ObsAir,
    #[serde(rename = "obs_sky")]
    ObsSky,
    #[serde(rename = "obs_st")]
    ObsSt,
    #[serde(rename = "device_status")]
    DeviceStatus,
    #[serde(rename = "hub_status")]
    HubStatus,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        Self::PrecipEvent,
        Self::StrikeEvent,
        Self::RapidWind,
        Self::ObsAir,
        Self::ObsSky,
        Self::ObsSt,
        Self::DeviceStatus,
        Self::HubStatus,
    ];

    /// Wire discriminator, also used as the measurement name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrecipEvent => "evt_precip",
            Self::StrikeEvent => "evt_strike",
            Self::RapidWind => "rapid_wind",
            Self::ObsAir => "obs_air",
            Self::ObsSky => "obs_sky",
            Self::ObsSt => "obs_st",
            Self::DeviceStatus => "device_status",
            Self::HubStatus => "hub_status",
        }
    }

    pub fn from_discriminator(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Status/heartbeat kinds carry no sample array
    pub fn is_status(&self) -> bool {
        matches!(self, Self::DeviceStatus | Self::HubStatus)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A converted field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Canonical decoded observation.
///
/// Field order is the layout's declared order and keys are unique. A
/// timestamp of zero means the message carried no usable data.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    kind: MessageKind,
    timestamp: u64,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    bucket_override: Option<String>,
}

impl ObservationRecord {
    pub fn builder(kind: MessageKind) -> RecordBuilder {
        RecordBuilder {
            record: ObservationRecord {
                kind,
                timestamp: 0,
                tags: Vec::new(),
                fields: Vec::new(),
                bucket_override: None,
            },
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn measurement(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp != 0
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn bucket_override(&self) -> Option<&str> {
        self.bucket_override.as_deref()
    }
}

/// Builds an [`ObservationRecord`]; the record is immutable once built.
#[derive(Debug)]
pub struct RecordBuilder {
    record: ObservationRecord,
}

impl RecordBuilder {
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.tags.push((key.into(), value.into()));
        self
    }

    /// Insert a field. A repeated name replaces the earlier value in place.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.record.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.record.fields.push((name, value)),
        }
        self
    }

    pub fn bucket_override(mut self, bucket: impl Into<String>) -> Self {
        self.record.bucket_override = Some(bucket.into());
        self
    }

    pub fn build(self) -> ObservationRecord {
        self.record
    }
}
