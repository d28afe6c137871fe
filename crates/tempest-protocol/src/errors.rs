//! Error types for the station protocol

use thiserror::Error;

use crate::types::MessageKind;

/// Result type alias
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Top-level protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
}

/// Envelope and field decoding errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("Arity mismatch for {kind}: expected {expected} samples, got {actual}")]
    ArityMismatch {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    /// Field-local: the record is still produced without this field
    #[error("Type mismatch for field `{field}`: {reason}")]
    TypeMismatch { field: String, reason: String },
}

impl DecodeError {
    pub(crate) fn mismatch(field: &str, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Line-protocol encoding errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingError {
    #[error("record `{0}` has no fields")]
    EmptyRecord(String),

    #[error("field `{0}` is not a finite number")]
    NonFinite(String),

    /// A line break would split the statement in two
    #[error("{0} contains a line break")]
    LineBreak(String),
}

/// Errors loading layout tables from data
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Invalid layout document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Layout for {kind} is invalid: {reason}")]
    Invalid { kind: MessageKind, reason: String },
}
