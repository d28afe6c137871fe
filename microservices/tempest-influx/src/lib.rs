//! Tempest to InfluxDB bridge
//!
//! Listens for WeatherFlow Tempest hub broadcasts, turns each one into a
//! line-protocol statement and writes it to an InfluxDB v2 bucket.
//!
//! - [`Dispatcher`] owns the UDP socket and spawns one task per datagram
//! - [`Pipeline`] decodes, encodes, routes and forwards a single datagram
//! - [`BucketRouter`] picks the bucket, [`Forwarder`] performs the write

pub mod config;
pub mod dispatch;
pub mod forwarder;
pub mod pipeline;
pub mod router;
pub mod service;

pub use config::BridgeConfig;
pub use dispatch::{ChannelSource, DatagramSource, Dispatcher};
pub use forwarder::{ForwardError, ForwardOutcome, Forwarder, ForwarderConfig};
pub use pipeline::{DropReason, PacketOutcome, Pipeline, PipelineMetrics, PreparedWrite};
pub use router::{BucketRouter, RouteSource, RoutingConfig, RoutingDecision};
pub use service::TempestInfluxService;
