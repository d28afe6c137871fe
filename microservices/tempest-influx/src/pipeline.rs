//! Per-datagram pipeline
//!
//! `Received -> Decoded -> (Dropped | Encoded) -> Forwarded | Failed`
//!
//! Every stage below the forward is synchronous and reads only immutable
//! state, so one `Pipeline` is shared by all in-flight packets.

use std::net::SocketAddr;
use std::time::Instant;

use tempest_protocol::{
    classify, decode, encode, Classification, DecodeError, EncodingError, LayoutTable,
    MessageKind, RawEnvelope,
};
use tempest_telemetry::{Counter, Gauge, Histogram};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::forwarder::{ForwardError, ForwardOutcome, Forwarder};
use crate::router::{BucketRouter, RoutingDecision};

/// Why a packet never reached the forwarder
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DropReason {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("{kind} expected {expected} samples, got {actual}")]
    Arity {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    #[error("{0} has no timestamp")]
    NoTimestamp(MessageKind),

    #[error("{0} has no fields")]
    EmptyRecord(MessageKind),

    #[error("encoding failed: {0}")]
    Encoding(EncodingError),
}

impl DropReason {
    /// Expected drops that are not worth a warning
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NoTimestamp(_) | Self::EmptyRecord(_))
    }
}

impl From<DecodeError> for DropReason {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::MalformedEnvelope(msg) => Self::Malformed(msg),
            DecodeError::UnsupportedLayout(kind) => Self::UnsupportedLayout(kind),
            DecodeError::ArityMismatch {
                kind,
                expected,
                actual,
            } => Self::Arity {
                kind,
                expected,
                actual,
            },
            other @ DecodeError::TypeMismatch { .. } => Self::Malformed(other.to_string()),
        }
    }
}

/// Terminal state of one packet
#[derive(Debug)]
pub enum PacketOutcome {
    Forwarded {
        kind: MessageKind,
        bucket: String,
        status: u16,
    },
    DryRun {
        kind: MessageKind,
        bucket: String,
    },
    Dropped(DropReason),
    Failed {
        kind: MessageKind,
        bucket: String,
        error: ForwardError,
    },
}

impl PacketOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded { .. } | Self::DryRun { .. })
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Emit the packet's diagnostic line
    pub fn log(&self, peer: Option<SocketAddr>) {
        let peer = peer.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        match self {
            Self::Forwarded {
                kind,
                bucket,
                status,
            } => debug!(peer = %peer, kind = %kind, bucket = %bucket, status, "Forwarded"),
            Self::DryRun { kind, bucket } => {
                debug!(peer = %peer, kind = %kind, bucket = %bucket, "Dry run")
            }
            Self::Dropped(reason) if reason.is_benign() => {
                info!(peer = %peer, reason = %reason, "Dropped packet")
            }
            Self::Dropped(reason) => warn!(peer = %peer, reason = %reason, "Dropped packet"),
            Self::Failed {
                kind,
                bucket,
                error,
            } => error!(peer = %peer, kind = %kind, bucket = %bucket, error = %error, "Forward failed"),
        }
    }
}

/// An encoded statement ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWrite {
    pub kind: MessageKind,
    pub line: String,
    pub route: RoutingDecision,
    /// Fields left out of `line` because they failed to decode
    pub mismatches: Vec<DecodeError>,
}

/// Pipeline counters
#[derive(Clone)]
pub struct PipelineMetrics {
    pub received: Counter,
    pub forwarded: Counter,
    pub dropped: Counter,
    pub failed: Counter,
    pub in_flight: Gauge,
    pub latency_ms: Histogram,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            received: Counter::new("packets_received"),
            forwarded: Counter::new("packets_forwarded"),
            dropped: Counter::new("packets_dropped"),
            failed: Counter::new("packets_failed"),
            in_flight: Gauge::new("forwards_in_flight"),
            latency_ms: Histogram::new("forward_latency_ms"),
        }
    }

    fn record(&self, outcome: &PacketOutcome) {
        match outcome {
            PacketOutcome::Forwarded { .. } | PacketOutcome::DryRun { .. } => self.forwarded.inc(),
            PacketOutcome::Dropped(_) => self.dropped.inc(),
            PacketOutcome::Failed { .. } => self.failed.inc(),
        }
    }

    pub fn log_summary(&self) {
        info!(
            received = self.received.get(),
            forwarded = self.forwarded.get(),
            dropped = self.dropped.get(),
            failed = self.failed.get(),
            in_flight = self.in_flight.get(),
            latency_p50_ms = self.latency_ms.percentile(50.0),
            latency_p99_ms = self.latency_ms.percentile(99.0),
            "Pipeline summary"
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// One slot of the in-flight gauge, released on drop
struct InFlight<'a>(&'a Gauge);

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a Gauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Decode, encode, route and forward one datagram
pub struct Pipeline {
    layouts: LayoutTable,
    router: BucketRouter,
    forwarder: Forwarder,
    verbose: bool,
    gate: Option<Semaphore>,
    metrics: PipelineMetrics,
}

impl Pipeline {
    pub fn new(layouts: LayoutTable, router: BucketRouter, forwarder: Forwarder) -> Self {
        Self {
            layouts,
            router,
            forwarder,
            verbose: false,
            gate: None,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> tempest_core::Result<Self> {
        let forwarder = Forwarder::new(&config.forwarder())
            .map_err(|e| tempest_core::TempestError::Config(e.to_string()))?;
        Ok(Self::new(
            config.layout_table()?,
            BucketRouter::new(config.routing()),
            forwarder,
        )
        .with_verbose(config.verbose)
        .with_max_in_flight(config.max_in_flight))
    }

    /// Log each write line
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Cap concurrent forwards; 0 leaves them unbounded
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.gate = (max > 0).then(|| Semaphore::new(max));
        self
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn router(&self) -> &BucketRouter {
        &self.router
    }

    /// Everything short of the network call
    pub fn prepare(&self, payload: &[u8]) -> Result<PreparedWrite, DropReason> {
        let envelope = RawEnvelope::parse(payload)?;
        let kind = match classify(&envelope) {
            Classification::Known(kind) => kind,
            Classification::Unknown(name) => return Err(DropReason::UnsupportedLayout(name)),
        };

        let decoded = decode(&envelope, kind, &self.layouts)?;
        let record = decoded.record;
        if !record.has_timestamp() {
            return Err(DropReason::NoTimestamp(kind));
        }
        if record.is_empty() {
            return Err(DropReason::EmptyRecord(kind));
        }

        let line = encode(&record).map_err(DropReason::Encoding)?;
        Ok(PreparedWrite {
            kind,
            line,
            route: self.router.route(&record),
            mismatches: decoded.mismatches,
        })
    }

    /// Run one datagram through to a terminal outcome
    ///
    /// `len` is the number of bytes received into `buf`.
    pub async fn handle_datagram(&self, buf: &[u8], len: usize) -> PacketOutcome {
        let payload = &buf[..len.min(buf.len())];
        let prepared = match self.prepare(payload) {
            Ok(prepared) => prepared,
            Err(reason) => {
                let outcome = PacketOutcome::Dropped(reason);
                self.metrics.record(&outcome);
                return outcome;
            }
        };

        // Mismatches are reported only for packets that are written
        for mismatch in &prepared.mismatches {
            warn!(kind = %prepared.kind, error = %mismatch, "Field dropped");
        }

        if self.verbose {
            info!(bucket = %prepared.route.bucket, line = %prepared.line, "Write");
        }

        let outcome = self.forward(prepared).await;
        self.metrics.record(&outcome);
        outcome
    }

    async fn forward(&self, prepared: PreparedWrite) -> PacketOutcome {
        // The gate is never closed
        let _permit = match &self.gate {
            Some(gate) => gate.acquire().await.ok(),
            None => None,
        };

        let in_flight = InFlight::enter(&self.metrics.in_flight);
        let started = Instant::now();
        let result = self
            .forwarder
            .forward(&prepared.line, &prepared.route.bucket)
            .await;
        self.metrics
            .latency_ms
            .record(started.elapsed().as_secs_f64() * 1000.0);
        drop(in_flight);

        let PreparedWrite { kind, route, .. } = prepared;
        match result {
            Ok(ForwardOutcome::Delivered { status }) => PacketOutcome::Forwarded {
                kind,
                bucket: route.bucket,
                status,
            },
            Ok(ForwardOutcome::DryRun) => PacketOutcome::DryRun {
                kind,
                bucket: route.bucket,
            },
            Err(error) => PacketOutcome::Failed {
                kind,
                bucket: route.bucket,
                error,
            },
        }
    }
}
