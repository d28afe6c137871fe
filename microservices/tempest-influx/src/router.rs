//! Bucket routing
//!
//! Picks the destination bucket for a record. A bucket set on the record
//! itself wins, then a per-kind override, then the default bucket.

use std::collections::HashMap;

use tempest_protocol::{MessageKind, ObservationRecord};

/// Static per-kind bucket configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub default_bucket: String,
    pub overrides: HashMap<MessageKind, String>,
}

impl RoutingConfig {
    pub fn new(default_bucket: impl Into<String>) -> Self {
        Self {
            default_bucket: default_bucket.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, kind: MessageKind, bucket: impl Into<String>) -> Self {
        self.overrides.insert(kind, bucket.into());
        self
    }
}

/// Where a routing decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    Record,
    Kind,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub bucket: String,
    pub source: RouteSource,
}

/// Bucket router
#[derive(Debug, Clone)]
pub struct BucketRouter {
    config: RoutingConfig,
}

impl BucketRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Bucket for a record; never fails
    pub fn route(&self, record: &ObservationRecord) -> RoutingDecision {
        if let Some(bucket) = record.bucket_override() {
            return RoutingDecision {
                bucket: bucket.to_string(),
                source: RouteSource::Record,
            };
        }

        let (bucket, source) = self.route_kind(record.kind());
        RoutingDecision {
            bucket: bucket.to_string(),
            source,
        }
    }

    /// Bucket for a message kind alone
    pub fn route_kind(&self, kind: MessageKind) -> (&str, RouteSource) {
        match self.config.overrides.get(&kind) {
            Some(bucket) => (bucket.as_str(), RouteSource::Kind),
            None => (self.config.default_bucket.as_str(), RouteSource::Default),
        }
    }
}
