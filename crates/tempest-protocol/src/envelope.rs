//! Envelope parsing and message classification

use serde_json::{Map, Value};

use crate::errors::DecodeError;
use crate::types::MessageKind;
use crate::DISCRIMINATOR_KEY;

/// One parsed broadcast datagram
#[derive(Debug, Clone)]
pub struct RawEnvelope {
    discriminator: String,
    body: Map<String, Value>,
}

impl RawEnvelope {
    /// Parse a datagram payload. Trailing NUL padding is ignored.
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let end = payload
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |i| i + 1);

        let value: Value = serde_json::from_slice(&payload[..end])
            .map_err(|e| DecodeError::MalformedEnvelope(format!("not a JSON document: {}", e)))?;

        let Value::Object(body) = value else {
            return Err(DecodeError::MalformedEnvelope(format!(
                "expected a JSON object, got {}",
                json_type_name(&value)
            )));
        };

        let discriminator = match body.get(DISCRIMINATOR_KEY) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::String(_)) => {
                return Err(DecodeError::MalformedEnvelope(
                    "empty `type` discriminator".to_string(),
                ))
            }
            Some(other) => {
                return Err(DecodeError::MalformedEnvelope(format!(
                    "`type` discriminator must be a string, got {}",
                    json_type_name(other)
                )))
            }
            None => {
                return Err(DecodeError::MalformedEnvelope(
                    "missing `type` discriminator".to_string(),
                ))
            }
        };

        Ok(Self {
            discriminator,
            body,
        })
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Serial number of the sending device
    pub fn serial_number(&self) -> Option<&str> {
        self.non_empty_str("serial_number")
    }

    /// Serial number of the relaying hub
    pub fn hub_serial(&self) -> Option<&str> {
        self.non_empty_str("hub_sn")
    }

    fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.body
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Outcome of classifying an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Known(MessageKind),
    Unknown(String),
}

/// Identify the message kind named by the envelope's discriminator
pub fn classify(envelope: &RawEnvelope) -> Classification {
    match MessageKind::from_discriminator(envelope.discriminator()) {
        Some(kind) => Classification::Known(kind),
        None => Classification::Unknown(envelope.discriminator().to_string()),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(payload: &[u8]) -> String {
        match RawEnvelope::parse(payload) {
            Err(DecodeError::MalformedEnvelope(reason)) => reason,
            other => panic!("expected MalformedEnvelope, got {:?}", other),
        }
    }

    #[test]
    fn test_classifies_known_kind() {
        let env = RawEnvelope::parse(
            br#"{"serial_number":"SK-00008453","type":"rapid_wind","hub_sn":"HB-00000001","ob":[1493322445,2.3,128]}"#,
        )
        .unwrap();

        assert_eq!(classify(&env), Classification::Known(MessageKind::RapidWind));
        assert_eq!(env.serial_number(), Some("SK-00008453"));
        assert_eq!(env.hub_serial(), Some("HB-00000001"));
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let env = RawEnvelope::parse(br#"{"type":"light_debug","ob":[1,2]}"#).unwrap();
        assert_eq!(classify(&env), Classification::Unknown("light_debug".to_string()));
    }

    #[test]
    fn test_discriminator_shape_is_enforced() {
        assert!(malformed(br#"{"ob":[1]}"#).contains("missing"));
        assert!(malformed(br#"{"type":""}"#).contains("empty"));
        assert!(malformed(br#"{"type":42}"#).contains("number"));
        assert!(malformed(br#"["rapid_wind"]"#).contains("array"));
        assert!(malformed(b"\xff\xfe not json").contains("JSON"));
    }

    #[test]
    fn test_trailing_nul_padding_ignored() {
        let mut payload = br#"{"type":"evt_precip","evt":[1493322445]}"#.to_vec();
        payload.extend_from_slice(&[0u8; 16]);

        let env = RawEnvelope::parse(&payload).unwrap();
        assert_eq!(env.discriminator(), "evt_precip");
    }

    #[test]
    fn test_blank_serial_is_absent() {
        let env = RawEnvelope::parse(br#"{"type":"hub_status","serial_number":""}"#).unwrap();
        assert_eq!(env.serial_number(), None);
    }
}
