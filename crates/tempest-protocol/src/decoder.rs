//! Field layout decoder
//!
//! Applies a [`Layout`] to a classified envelope. Per-field problems are
//! collected as `TypeMismatch` errors and the offending field is left out;
//! only envelope-level problems fail the decode.

use serde_json::Value;

use crate::envelope::{json_type_name, RawEnvelope};
use crate::errors::DecodeError;
use crate::layout::{Conversion, FieldSpec, Layout, LayoutTable, SampleSource, ValueType};
use crate::types::{FieldValue, MessageKind, ObservationRecord};

/// A decoded record plus the fields that were dropped on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub record: ObservationRecord,
    pub mismatches: Vec<DecodeError>,
}

/// Decode an envelope already classified as `kind`
pub fn decode(
    envelope: &RawEnvelope,
    kind: MessageKind,
    table: &LayoutTable,
) -> Result<Decoded, DecodeError> {
    let layout = table
        .get(kind)
        .ok_or_else(|| DecodeError::UnsupportedLayout(kind.to_string()))?;
    decode_with_layout(envelope, layout)
}

/// Decode an envelope against an explicit layout
pub fn decode_with_layout(envelope: &RawEnvelope, layout: &Layout) -> Result<Decoded, DecodeError> {
    let samples = Samples::extract(envelope, layout)?;

    let mut builder = ObservationRecord::builder(layout.kind);
    if let Some(station) = envelope.serial_number() {
        builder = builder.tag("station", station);
    }
    if let Some(hub) = envelope.hub_serial() {
        builder = builder.tag("hub", hub);
    }

    let mut mismatches = Vec::new();
    for (index, spec) in layout.fields.iter().enumerate() {
        match read_field(spec, samples.get(index, spec)) {
            Ok(Some(Reading::Timestamp(ts))) => builder = builder.timestamp(ts),
            Ok(Some(Reading::Value(value))) => builder = builder.field(spec.name.as_str(), value),
            Ok(None) => {}
            Err(e) => mismatches.push(e),
        }
    }

    if let Some(marker) = &layout.marker {
        builder = builder.field(marker.as_str(), true);
    }

    Ok(Decoded {
        record: builder.build(),
        mismatches,
    })
}

#[derive(Clone, Copy)]
enum Samples<'a> {
    Positional(&'a [Value]),
    Keyed(&'a RawEnvelope),
}

impl<'a> Samples<'a> {
    fn extract(envelope: &'a RawEnvelope, layout: &Layout) -> Result<Self, DecodeError> {
        let values = match &layout.samples {
            SampleSource::Keyed => return Ok(Self::Keyed(envelope)),
            SampleSource::Flat(key) => array_at(envelope, key)?,
            SampleSource::FirstRow(key) => {
                let rows = array_at(envelope, key)?;
                match rows.first() {
                    Some(Value::Array(row)) => row.as_slice(),
                    Some(other) => {
                        return Err(DecodeError::MalformedEnvelope(format!(
                            "`{}` rows must be arrays, got {}",
                            key,
                            json_type_name(other)
                        )))
                    }
                    None => &[],
                }
            }
        };

        // Extra trailing samples are tolerated for forward compatibility
        if values.len() < layout.arity() {
            return Err(DecodeError::ArityMismatch {
                kind: layout.kind,
                expected: layout.arity(),
                actual: values.len(),
            });
        }
        Ok(Self::Positional(values))
    }

    fn get(self, index: usize, spec: &FieldSpec) -> Option<&'a Value> {
        match self {
            Self::Positional(values) => values.get(index),
            Self::Keyed(envelope) => envelope.get(&spec.name),
        }
    }
}

fn array_at<'a>(envelope: &'a RawEnvelope, key: &str) -> Result<&'a [Value], DecodeError> {
    match envelope.get(key) {
        Some(Value::Array(values)) => Ok(values.as_slice()),
        Some(other) => Err(DecodeError::MalformedEnvelope(format!(
            "`{}` must be an array, got {}",
            key,
            json_type_name(other)
        ))),
        None => Err(DecodeError::MalformedEnvelope(format!(
            "missing sample array `{}`",
            key
        ))),
    }
}

enum Reading {
    Timestamp(u64),
    Value(FieldValue),
}

fn read_field(spec: &FieldSpec, raw: Option<&Value>) -> Result<Option<Reading>, DecodeError> {
    let raw = match raw {
        None | Some(Value::Null) if spec.null.allows_null() => return Ok(None),
        None => return Err(DecodeError::mismatch(&spec.name, "value missing")),
        Some(Value::Null) => return Err(DecodeError::mismatch(&spec.name, "null in required field")),
        Some(value) => value,
    };

    if let Some(n) = raw.as_f64() {
        if spec.null.is_sentinel(n) {
            return Ok(None);
        }
    }

    let reading = match spec.value_type {
        ValueType::Timestamp => Reading::Timestamp(read_timestamp(spec, raw)?),
        ValueType::Float => Reading::Value(FieldValue::Float(read_number(spec, raw)?)),
        ValueType::Integer => {
            let n = read_number(spec, raw)?;
            Reading::Value(FieldValue::Integer(whole(spec, n)?))
        }
        ValueType::Boolean => Reading::Value(FieldValue::Boolean(read_bool(spec, raw)?)),
        ValueType::String => Reading::Value(FieldValue::String(read_string(spec, raw)?)),
    };
    Ok(Some(reading))
}

fn read_timestamp(spec: &FieldSpec, raw: &Value) -> Result<u64, DecodeError> {
    if let Some(ts) = raw.as_u64() {
        return Ok(ts);
    }
    match raw.as_f64() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 => Ok(n as u64),
        _ => Err(DecodeError::mismatch(
            &spec.name,
            format!("expected epoch seconds, got {}", raw),
        )),
    }
}

fn read_number(spec: &FieldSpec, raw: &Value) -> Result<f64, DecodeError> {
    let n = raw.as_f64().ok_or_else(|| {
        DecodeError::mismatch(
            &spec.name,
            format!("expected a number, got {}", json_type_name(raw)),
        )
    })?;
    spec.conversion
        .apply_numeric(n)
        .map_err(|reason| DecodeError::mismatch(&spec.name, reason))
}

fn whole(spec: &FieldSpec, n: f64) -> Result<i64, DecodeError> {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Ok(n as i64)
    } else {
        Err(DecodeError::mismatch(
            &spec.name,
            format!("expected an integer, got {}", n),
        ))
    }
}

fn read_bool(spec: &FieldSpec, raw: &Value) -> Result<bool, DecodeError> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(false),
        Value::Number(n) if n.as_f64() == Some(1.0) => Ok(true),
        other => Err(DecodeError::mismatch(
            &spec.name,
            format!("expected a boolean, got {}", other),
        )),
    }
}

fn read_string(spec: &FieldSpec, raw: &Value) -> Result<String, DecodeError> {
    if matches!(spec.conversion, Conversion::Map(_)) {
        let code = raw.as_i64().ok_or_else(|| {
            DecodeError::mismatch(&spec.name, format!("expected an integer code, got {}", raw))
        })?;
        return spec
            .conversion
            .lookup(code)
            .map(str::to_string)
            .ok_or_else(|| DecodeError::mismatch(&spec.name, format!("unknown code {}", code)));
    }

    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(DecodeError::mismatch(
            &spec.name,
            format!("expected a string, got {}", json_type_name(other)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{classify, Classification};
    use crate::layout::NO_READING;

    fn decode_str(payload: &str) -> Result<Decoded, DecodeError> {
        let table = LayoutTable::standard();
        let envelope = RawEnvelope::parse(payload.as_bytes())?;
        match classify(&envelope) {
            Classification::Known(kind) => decode(&envelope, kind, &table),
            Classification::Unknown(name) => Err(DecodeError::UnsupportedLayout(name)),
        }
    }

    fn float(record: &ObservationRecord, name: &str) -> f64 {
        match record.field(name) {
            Some(FieldValue::Float(v)) => *v,
            other => panic!("{} is not a float: {:?}", name, other),
        }
    }

    #[test]
    fn test_rapid_wind() {
        let decoded = decode_str(r#"{"type":"rapid_wind","ob":[1588021244,2.3,180]}"#).unwrap();
        let record = decoded.record;

        assert_eq!(record.measurement(), "rapid_wind");
        assert_eq!(record.timestamp(), 1588021244);
        assert_eq!(
            record.fields(),
            &[
                ("wind_speed".to_string(), FieldValue::Float(2.3)),
                ("wind_direction".to_string(), FieldValue::Float(180.0)),
            ]
        );
        assert!(record.tags().is_empty());
        assert!(decoded.mismatches.is_empty());
    }

    #[test]
    fn test_trailing_samples_ignored() {
        let exact = decode_str(r#"{"type":"rapid_wind","ob":[1588021244,2.3,180]}"#).unwrap();
        let longer =
            decode_str(r#"{"type":"rapid_wind","ob":[1588021244,2.3,180,"extra",7]}"#).unwrap();
        assert_eq!(exact, longer);
    }

    #[test]
    fn test_short_sample_array_is_arity_mismatch() {
        let err = decode_str(r#"{"type":"rapid_wind","ob":[1588021244,2.3]}"#).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ArityMismatch {
                kind: MessageKind::RapidWind,
                expected: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn test_empty_obs_is_arity_mismatch() {
        let err = decode_str(r#"{"type":"obs_air","obs":[]}"#).unwrap_err();
        assert!(matches!(err, DecodeError::ArityMismatch { actual: 0, .. }));
    }

    #[test]
    fn test_missing_sample_array_is_malformed() {
        let err = decode_str(r#"{"type":"rapid_wind"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_unknown_kind_unsupported() {
        let err = decode_str(r#"{"type":"light_debug","ob":[1,2,3]}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedLayout("light_debug".to_string()));
    }

    #[test]
    fn test_kind_without_layout_unsupported() {
        let envelope = RawEnvelope::parse(br#"{"type":"rapid_wind","ob":[1,2,3]}"#).unwrap();
        let err = decode(&envelope, MessageKind::RapidWind, &LayoutTable::empty()).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedLayout("rapid_wind".to_string()));
    }

    #[test]
    fn test_sentinel_omits_field() {
        let decoded = decode_str(r#"{"type":"rapid_wind","ob":[1588021244,-9999,180]}"#).unwrap();
        assert_eq!(decoded.record.field("wind_speed"), None);
        assert_eq!(float(&decoded.record, "wind_direction"), 180.0);
        assert!(decoded.mismatches.is_empty());
    }

    #[test]
    fn test_obs_st_full_layout() {
        let decoded = decode_str(
            r#"{"serial_number":"ST-00000512","type":"obs_st","hub_sn":"HB-00013030",
                "obs":[[1588948614,0.18,0.22,0.27,144,6,1017.57,22.37,50.26,328,0.03,3,0.000000,0,0,0,2.410,1]],
                "firmware_revision":129}"#,
        )
        .unwrap();
        let record = decoded.record;

        assert!(decoded.mismatches.is_empty());
        assert_eq!(record.timestamp(), 1588948614);
        assert_eq!(
            record.tags(),
            &[
                ("station".to_string(), "ST-00000512".to_string()),
                ("hub".to_string(), "HB-00013030".to_string()),
            ]
        );
        assert_eq!(record.fields().len(), 17);
        assert_eq!(record.fields()[0].0, "wind_lull");
        assert_eq!(float(&record, "air_temperature"), 22.37);
        assert_eq!(record.field("wind_sample_interval"), Some(&FieldValue::Integer(6)));
        assert_eq!(
            record.field("precipitation_type"),
            Some(&FieldValue::String("none".to_string()))
        );
        assert_eq!(record.field("lightning_strike_count"), Some(&FieldValue::Integer(0)));
        assert_eq!(record.field("report_interval"), Some(&FieldValue::Integer(60)));
    }

    #[test]
    fn test_obs_sky_null_local_rain_omitted() {
        let decoded = decode_str(
            r#"{"serial_number":"SK-00008453","type":"obs_sky","hub_sn":"HB-00000001",
                "obs":[[1493321340,9000,10,0.0,2.6,4.6,7.4,187,3.12,1,130,null,2,3]],
                "firmware_revision":29}"#,
        )
        .unwrap();
        let record = decoded.record;

        assert!(decoded.mismatches.is_empty());
        assert_eq!(record.field("local_day_rain_accumulation"), None);
        assert_eq!(
            record.field("precipitation_type"),
            Some(&FieldValue::String("hail".to_string()))
        );
        assert_eq!(record.fields().len(), 12);
    }

    #[test]
    fn test_null_in_required_field_is_field_local() {
        let decoded = decode_str(
            r#"{"type":"obs_air","obs":[[1493164835,835.0,10.0,45,0,0,null,1]]}"#,
        )
        .unwrap();

        assert_eq!(decoded.record.timestamp(), 1493164835);
        assert_eq!(decoded.record.field("battery"), None);
        assert_eq!(float(&decoded.record, "station_pressure"), 835.0);
        assert_eq!(
            decoded.mismatches,
            vec![DecodeError::TypeMismatch {
                field: "battery".to_string(),
                reason: "null in required field".to_string(),
            }]
        );
    }

    #[test]
    fn test_non_numeric_value_is_field_local() {
        let decoded =
            decode_str(r#"{"type":"rapid_wind","ob":[1588021244,"fast",180]}"#).unwrap();

        assert_eq!(decoded.record.field("wind_speed"), None);
        assert_eq!(decoded.record.fields().len(), 1);
        assert!(matches!(
            &decoded.mismatches[..],
            [DecodeError::TypeMismatch { field, .. }] if field == "wind_speed"
        ));
    }

    #[test]
    fn test_unknown_precip_code_is_field_local() {
        let decoded = decode_str(
            r#"{"type":"obs_st","obs":[[1588948614,0.18,0.22,0.27,144,6,1017.57,22.37,50.26,328,0.03,3,0.0,9,0,0,2.410,1]]}"#,
        )
        .unwrap();
        assert_eq!(decoded.record.field("precipitation_type"), None);
        assert_eq!(decoded.mismatches.len(), 1);
    }

    #[test]
    fn test_zero_divisor_is_field_local() {
        let layout = Layout::new(
            MessageKind::StrikeEvent,
            SampleSource::Flat("evt".to_string()),
            vec![
                FieldSpec::timestamp(),
                FieldSpec::float("distance").with_conversion(Conversion::Scale { mul: 1.0, div: 0.0 }),
                FieldSpec::float("energy"),
            ],
        );
        let envelope = RawEnvelope::parse(br#"{"type":"evt_strike","evt":[1493322445,27,3848]}"#).unwrap();

        let decoded = decode_with_layout(&envelope, &layout).unwrap();
        assert_eq!(decoded.record.field("distance"), None);
        assert_eq!(decoded.record.field("energy"), Some(&FieldValue::Float(3848.0)));
        assert_eq!(decoded.mismatches.len(), 1);
    }

    #[test]
    fn test_precip_event_carries_marker() {
        let decoded = decode_str(r#"{"type":"evt_precip","evt":[1493322445]}"#).unwrap();
        assert_eq!(decoded.record.timestamp(), 1493322445);
        assert_eq!(decoded.record.field("precip_start"), Some(&FieldValue::Boolean(true)));
    }

    #[test]
    fn test_device_status_keyed() {
        let decoded = decode_str(
            r#"{"serial_number":"AR-00004049","type":"device_status","hub_sn":"HB-00000001",
                "timestamp":1510855923,"uptime":2189,"voltage":3.50,"firmware_revision":17,
                "rssi":-17,"hub_rssi":-87,"sensor_status":0,"debug":0}"#,
        )
        .unwrap();
        let record = decoded.record;

        assert!(decoded.mismatches.is_empty());
        assert_eq!(record.timestamp(), 1510855923);
        assert_eq!(record.field("rssi"), Some(&FieldValue::Integer(-17)));
        assert_eq!(record.field("voltage"), Some(&FieldValue::Float(3.5)));
        assert_eq!(record.field("debug"), Some(&FieldValue::Boolean(false)));
    }

    #[test]
    fn test_hub_status_keyed() {
        let decoded = decode_str(
            r#"{"serial_number":"HB-00000001","type":"hub_status","firmware_revision":"35",
                "uptime":1670133,"rssi":-62,"timestamp":1495724691,"reset_flags":"BOR,PIN,POR",
                "seq":48,"fs":[1,0,15675411,524288],"radio_stats":[2,1,0,3,2839],"mqtt_stats":[1,0]}"#,
        )
        .unwrap();
        let record = decoded.record;

        assert_eq!(record.tags(), &[("station".to_string(), "HB-00000001".to_string())]);
        assert_eq!(
            record.field("firmware_revision"),
            Some(&FieldValue::String("35".to_string()))
        );
        assert_eq!(
            record.field("reset_flags"),
            Some(&FieldValue::String("BOR,PIN,POR".to_string()))
        );
    }

    #[test]
    fn test_status_without_timestamp_decodes_to_zero() {
        let decoded = decode_str(r#"{"type":"hub_status","uptime":10,"rssi":-60,"firmware_revision":"35"}"#)
            .unwrap();
        assert!(!decoded.record.has_timestamp());
        assert_eq!(decoded.record.field("uptime"), Some(&FieldValue::Integer(10)));
        assert!(decoded.mismatches.is_empty());
    }

    #[test]
    fn test_observation_without_timestamp_is_flagged() {
        let decoded = decode_str(r#"{"type":"rapid_wind","ob":[null,2.3,180]}"#).unwrap();
        assert!(!decoded.record.has_timestamp());
        assert!(matches!(
            &decoded.mismatches[..],
            [DecodeError::TypeMismatch { field, .. }] if field == "timestamp"
        ));
    }

    #[test]
    fn test_sentinel_constant_is_exact() {
        assert_eq!(NO_READING, -9999.0);
        let decoded = decode_str(r#"{"type":"rapid_wind","ob":[1588021244,-9998.5,180]}"#).unwrap();
        assert_eq!(float(&decoded.record, "wind_speed"), -9998.5);
    }
}
