//! # Tempest Station Protocol
//!
//! Decoding of the UDP broadcasts a WeatherFlow Tempest hub emits on the
//! local network, and encoding of the decoded observations as line-protocol
//! writes:
//!
//! - **Envelope** - parses one datagram and classifies it by its `type` discriminator
//! - **Layout** - data-driven positional (or keyed) field tables per message kind
//! - **Decoder** - applies a layout to an envelope, producing an [`ObservationRecord`]
//! - **Line protocol** - serializes a record into a single write statement
//!
//! Everything here is synchronous and free of I/O.
//!
//! ## Example
//! ```rust
//! use tempest_protocol::{classify, decode, encode, Classification, LayoutTable, RawEnvelope};
//!
//! let table = LayoutTable::standard();
//! let envelope = RawEnvelope::parse(br#"{"type":"rapid_wind","ob":[1588021244,2.3,180]}"#).unwrap();
//! let Classification::Known(kind) = classify(&envelope) else { unreachable!() };
//! let decoded = decode(&envelope, kind, &table).unwrap();
//! assert_eq!(
//!     encode(&decoded.record).unwrap(),
//!     "rapid_wind wind_speed=2.3,wind_direction=180 1588021244"
//! );
//! ```

pub mod decoder;
pub mod envelope;
pub mod errors;
pub mod layout;
pub mod line_protocol;
pub mod types;

// Re-exports
pub use decoder::{decode, decode_with_layout, Decoded};
pub use envelope::{classify, Classification, RawEnvelope};
pub use errors::{DecodeError, EncodingError, LayoutError, ProtocolError, Result};
pub use layout::{Conversion, FieldSpec, Layout, LayoutTable, NullPolicy, SampleSource, ValueType};
pub use line_protocol::encode;
pub use types::*;

/// Protocol crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default UDP port the hub broadcasts on
pub const DEFAULT_BROADCAST_PORT: u16 = 50222;

/// Envelope key holding the message kind
pub const DISCRIMINATOR_KEY: &str = "type";
