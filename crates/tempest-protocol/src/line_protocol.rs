//! Line-protocol encoding
//!
//! `measurement[,tag=value]* field=value[,field=value]* timestamp`

use std::fmt::Write;

use crate::errors::EncodingError;
use crate::types::{FieldValue, ObservationRecord};

/// Encode a record as a single write statement without a trailing newline.
///
/// Output is a pure function of the record: tags and fields keep their
/// declared order. Text containing `\n` or `\r` is rejected, since no
/// escape keeps it on one line.
pub fn encode(record: &ObservationRecord) -> Result<String, EncodingError> {
    if record.is_empty() {
        return Err(EncodingError::EmptyRecord(record.measurement().to_string()));
    }

    let mut line = String::with_capacity(64 + record.fields().len() * 24);
    line.push_str(&escape_measurement(record.measurement())?);

    for (key, value) in record.tags() {
        line.push(',');
        line.push_str(&escape_tag(key, key)?);
        line.push('=');
        line.push_str(&escape_tag(key, value)?);
    }

    for (i, (name, value)) in record.fields().iter().enumerate() {
        line.push(if i == 0 { ' ' } else { ',' });
        line.push_str(&escape_tag(name, name)?);
        line.push('=');
        write_value(&mut line, name, value)?;
    }

    // Writing into a String cannot fail
    let _ = write!(line, " {}", record.timestamp());
    Ok(line)
}

fn write_value(line: &mut String, name: &str, value: &FieldValue) -> Result<(), EncodingError> {
    match value {
        FieldValue::Float(v) if !v.is_finite() => {
            return Err(EncodingError::NonFinite(name.to_string()))
        }
        FieldValue::Float(v) => {
            let _ = write!(line, "{}", v);
        }
        FieldValue::Integer(v) => {
            let _ = write!(line, "{}i", v);
        }
        FieldValue::Boolean(v) => line.push(if *v { 't' } else { 'f' }),
        FieldValue::String(v) => {
            line.push('"');
            line.push_str(&escape(name, v, &['"', '\\'])?);
            line.push('"');
        }
    }
    Ok(())
}

fn escape_measurement(s: &str) -> Result<String, EncodingError> {
    escape(s, s, &['\\', ',', ' '])
}

/// Tag keys, tag values and field keys share one escaping rule. A literal
/// backslash is doubled so a trailing one cannot swallow the next separator.
fn escape_tag(owner: &str, s: &str) -> Result<String, EncodingError> {
    escape(owner, s, &['\\', ',', '=', ' '])
}

fn escape(owner: &str, s: &str, special: &[char]) -> Result<String, EncodingError> {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\n' || c == '\r' {
            return Err(EncodingError::LineBreak(owner.to_string()));
        }
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    Ok(out)
}
