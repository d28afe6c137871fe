//! Field layouts
//!
//! A layout is an ordered list of typed field descriptors for one message
//! kind. For positional kinds, entry `i` describes sample `i`; keyed kinds
//! read each entry from the envelope key of the same name. Layouts are plain
//! data and can be loaded from JSON, so a protocol revision does not touch
//! the decoder.

mod tables;

pub use tables::{standard_layouts, NO_READING};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::errors::LayoutError;
use crate::types::MessageKind;

/// Semantic type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Epoch seconds; becomes the record timestamp, never a field
    Timestamp,
    Float,
    Integer,
    String,
    Boolean,
}

/// Unit-conversion rule applied to a raw value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    #[default]
    Identity,
    /// `value * mul / div`
    Scale { mul: f64, div: f64 },
    /// Fixed integer code to string mapping
    Map(Vec<(i64, String)>),
}

impl Conversion {
    pub fn scale(mul: f64) -> Self {
        Self::Scale { mul, div: 1.0 }
    }

    pub fn map<'a>(entries: impl IntoIterator<Item = (i64, &'a str)>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(code, label)| (code, label.to_string()))
                .collect(),
        )
    }

    /// Apply a numeric rule. `Map` is not numeric.
    pub(crate) fn apply_numeric(&self, value: f64) -> Result<f64, String> {
        match self {
            Self::Identity => Ok(value),
            Self::Scale { div, .. } if *div == 0.0 => Err("scale divides by zero".to_string()),
            Self::Scale { mul, div } => Ok(value * mul / div),
            Self::Map(_) => Err("map conversion yields a string".to_string()),
        }
    }

    pub(crate) fn lookup(&self, code: i64) -> Option<&str> {
        match self {
            Self::Map(entries) => entries
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, label)| label.as_str()),
            _ => None,
        }
    }
}

/// How "no reading" is represented for a field
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// A value must be present
    #[default]
    Required,
    /// JSON null omits the field
    Nullable,
    /// JSON null or this numeric constant omits the field
    Sentinel(f64),
}

impl NullPolicy {
    pub fn allows_null(&self) -> bool {
        !matches!(self, Self::Required)
    }

    pub fn is_sentinel(&self, value: f64) -> bool {
        matches!(self, Self::Sentinel(s) if *s == value)
    }
}

/// One entry in a layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub conversion: Conversion,
    #[serde(default)]
    pub null: NullPolicy,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            conversion: Conversion::Identity,
            null: NullPolicy::Required,
        }
    }

    pub fn timestamp() -> Self {
        Self::new("timestamp", ValueType::Timestamp)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Float)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Integer)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::String)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Boolean)
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.null = NullPolicy::Nullable;
        self
    }

    pub fn sentinel(mut self, value: f64) -> Self {
        self.null = NullPolicy::Sentinel(value);
        self
    }
}

/// Where a kind's samples live inside the envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// A flat array under this key (`ob`, `evt`)
    Flat(String),
    /// The first row of an array of arrays under this key (`obs`)
    FirstRow(String),
    /// Fields read from envelope keys named after each field
    Keyed,
}

/// Layout for one message kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub kind: MessageKind,
    pub samples: SampleSource,
    pub fields: Vec<FieldSpec>,
    /// Boolean field set to true on every record of this kind
    #[serde(default)]
    pub marker: Option<String>,
}

impl Layout {
    pub fn new(kind: MessageKind, samples: SampleSource, fields: Vec<FieldSpec>) -> Self {
        Self {
            kind,
            samples,
            fields,
            marker: None,
        }
    }

    pub fn with_marker(mut self, name: impl Into<String>) -> Self {
        self.marker = Some(name.into());
        self
    }

    /// Number of positional samples the layout declares
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    fn validate(&self) -> Result<(), LayoutError> {
        let invalid = |reason: String| LayoutError::Invalid {
            kind: self.kind,
            reason,
        };

        if self.fields.is_empty() {
            return Err(invalid("no fields declared".to_string()));
        }
        for (i, spec) in self.fields.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(invalid(format!("field {} has an empty name", i)));
            }
            if self.fields[..i].iter().any(|other| other.name == spec.name) {
                return Err(invalid(format!("field `{}` declared twice", spec.name)));
            }
            match (&spec.conversion, spec.value_type) {
                (Conversion::Identity, _) => {}
                (Conversion::Map(_), ValueType::String) => {}
                (Conversion::Scale { .. }, ValueType::Float | ValueType::Integer) => {}
                (_, value_type) => {
                    return Err(invalid(format!(
                        "field `{}`: conversion does not fit a {:?} value",
                        spec.name, value_type
                    )))
                }
            }
        }

        let timestamps: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.value_type == ValueType::Timestamp)
            .map(|(i, _)| i)
            .collect();
        match timestamps.as_slice() {
            [] => return Err(invalid("no timestamp field".to_string())),
            [0] => {}
            [_] if self.samples == SampleSource::Keyed => {}
            [i] => {
                return Err(invalid(format!(
                    "timestamp must be the first sample, found at {}",
                    i
                )))
            }
            _ => return Err(invalid("more than one timestamp field".to_string())),
        }
        Ok(())
    }
}

/// Read-only lookup of layouts by message kind
#[derive(Debug, Clone, Default)]
pub struct LayoutTable {
    layouts: HashMap<MessageKind, Layout>,
}

impl LayoutTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in layouts for every known message kind
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for layout in standard_layouts() {
            table.insert(layout);
        }
        table
    }

    /// Insert or replace a layout, returning the replaced one
    pub fn insert(&mut self, layout: Layout) -> Option<Layout> {
        self.layouts.insert(layout.kind, layout)
    }

    pub fn get(&self, kind: MessageKind) -> Option<&Layout> {
        self.layouts.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Override or add layouts from a JSON array of layout documents.
    /// Nothing is applied unless every layout in the document is valid.
    pub fn extend_from_json(&mut self, json: &str) -> Result<usize, LayoutError> {
        let layouts: Vec<Layout> = serde_json::from_str(json)?;
        for layout in &layouts {
            layout.validate()?;
        }

        let count = layouts.len();
        for layout in layouts {
            debug!(kind = %layout.kind, fields = layout.fields.len(), "Loaded layout override");
            self.insert(layout);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_covers_every_kind() {
        let table = LayoutTable::standard();
        for kind in MessageKind::ALL {
            assert!(table.get(kind).is_some(), "missing layout for {}", kind);
        }
    }

    #[test]
    fn test_standard_layouts_are_valid() {
        for layout in standard_layouts() {
            layout.validate().unwrap();
        }
    }

    #[test]
    fn test_scale_rejects_zero_divisor() {
        let conv = Conversion::Scale { mul: 1.0, div: 0.0 };
        assert!(conv.apply_numeric(5.0).is_err());
        assert_eq!(Conversion::scale(60.0).apply_numeric(2.0), Ok(120.0));
    }

    #[test]
    fn test_extend_from_json_overrides_layout() {
        let mut table = LayoutTable::standard();
        let doc = r#"[{
            "kind": "rapid_wind",
            "samples": {"flat": "ob"},
            "fields": [
                {"name": "timestamp", "value_type": "timestamp"},
                {"name": "wind_speed_kmh", "value_type": "float", "conversion": {"scale": {"mul": 3.6, "div": 1.0}}},
                {"name": "wind_direction", "value_type": "integer", "null": {"sentinel": -9999.0}}
            ]
        }]"#;

        assert_eq!(table.extend_from_json(doc).unwrap(), 1);
        let layout = table.get(MessageKind::RapidWind).unwrap();
        assert_eq!(layout.fields[1].name, "wind_speed_kmh");
        assert_eq!(layout.fields[2].null, NullPolicy::Sentinel(-9999.0));
        assert_eq!(table.len(), MessageKind::ALL.len());
    }

    #[test]
    fn test_extend_from_json_rejects_duplicate_fields() {
        let mut table = LayoutTable::empty();
        let doc = r#"[{
            "kind": "evt_strike",
            "samples": {"flat": "evt"},
            "fields": [
                {"name": "timestamp", "value_type": "timestamp"},
                {"name": "distance", "value_type": "float"},
                {"name": "distance", "value_type": "float"}
            ]
        }]"#;

        assert!(matches!(
            table.extend_from_json(doc),
            Err(LayoutError::Invalid { .. })
        ));
        assert!(table.is_empty());
    }

    fn invalid_reason(doc: &str) -> String {
        let mut table = LayoutTable::standard();
        match table.extend_from_json(doc) {
            Err(LayoutError::Invalid { reason, .. }) => reason,
            other => panic!("expected an invalid layout, got {:?}", other),
        }
    }

    #[test]
    fn test_layout_without_timestamp_rejected() {
        let reason = invalid_reason(
            r#"[{"kind": "rapid_wind", "samples": {"flat": "ob"},
                "fields": [{"name": "wind_speed", "value_type": "float"}]}]"#,
        );
        assert_eq!(reason, "no timestamp field");
    }

    #[test]
    fn test_positional_timestamp_must_be_first() {
        let reason = invalid_reason(
            r#"[{"kind": "rapid_wind", "samples": {"flat": "ob"},
                "fields": [
                    {"name": "wind_speed", "value_type": "float"},
                    {"name": "timestamp", "value_type": "timestamp"}
                ]}]"#,
        );
        assert!(reason.starts_with("timestamp must be the first sample"));

        // Keyed layouts read by name, so order is free
        let mut table = LayoutTable::standard();
        let keyed = r#"[{"kind": "hub_status", "samples": "keyed",
            "fields": [
                {"name": "uptime", "value_type": "integer"},
                {"name": "timestamp", "value_type": "timestamp"}
            ]}]"#;
        assert_eq!(table.extend_from_json(keyed).unwrap(), 1);
    }

    #[test]
    fn test_conversion_must_fit_value_type() {
        let reason = invalid_reason(
            r#"[{"kind": "obs_st", "samples": {"first_row": "obs"},
                "fields": [
                    {"name": "timestamp", "value_type": "timestamp"},
                    {"name": "precipitation_type", "value_type": "float", "conversion": {"map": [[0, "none"]]}}
                ]}]"#,
        );
        assert!(reason.contains("precipitation_type"));

        let reason = invalid_reason(
            r#"[{"kind": "obs_st", "samples": {"first_row": "obs"},
                "fields": [
                    {"name": "timestamp", "value_type": "timestamp"},
                    {"name": "firmware", "value_type": "string", "conversion": {"scale": {"mul": 2.0, "div": 1.0}}}
                ]}]"#,
        );
        assert!(reason.contains("firmware"));
    }

    #[test]
    fn test_extend_from_json_rejects_bad_json() {
        let mut table = LayoutTable::empty();
        assert!(matches!(
            table.extend_from_json("{not json"),
            Err(LayoutError::Parse(_))
        ));
    }
}
