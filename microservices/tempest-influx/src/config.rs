//! Configuration for the Tempest to InfluxDB bridge

use std::time::Duration;

use tempest_core::{
    env_lookup, flag_var, optional_var, parse_var, require_var, string_var, Result, TempestError,
};
use tempest_protocol::{LayoutTable, MessageKind};

use crate::forwarder::ForwarderConfig;
use crate::router::RoutingConfig;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// UDP address to listen on for hub broadcasts
    pub source: String,
    /// Write endpoint base URL
    pub target: String,
    /// Authentication token
    pub token: String,
    /// Default bucket
    pub bucket: String,
    /// Bucket for high-frequency rapid_wind samples
    pub rapid_wind_bucket: Option<String>,
    /// Max datagram size
    pub buffer_size: usize,
    /// Log every write line
    pub verbose: bool,
    /// Log every received datagram (implies verbose)
    pub debug: bool,
    /// Build and log writes without sending them
    pub noop: bool,
    /// Per-request timeout for forwards
    pub forward_timeout_secs: u64,
    /// Concurrent forward limit, 0 for unbounded
    pub max_in_flight: usize,
    /// Optional JSON file with layout overrides
    pub layouts_path: Option<String>,
}

impl BridgeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = flag_var(&lookup, "TEMPEST_DEBUG")?;
        let config = Self {
            source: string_var(&lookup, "TEMPEST_SOURCE", "0.0.0.0:50222"),
            target: string_var(&lookup, "INFLUX_URL", "http://localhost:8086/api/v2/write"),
            token: string_var(&lookup, "INFLUX_TOKEN", ""),
            bucket: require_var(&lookup, "INFLUX_BUCKET")?,
            rapid_wind_bucket: optional_var(&lookup, "INFLUX_RAPID_WIND_BUCKET"),
            buffer_size: parse_var(&lookup, "TEMPEST_BUFFER", 10240)?,
            verbose: debug || flag_var(&lookup, "TEMPEST_VERBOSE")?,
            debug,
            noop: flag_var(&lookup, "TEMPEST_NOOP")?,
            forward_timeout_secs: parse_var(&lookup, "FORWARD_TIMEOUT_SECS", 10)?,
            max_in_flight: parse_var(&lookup, "MAX_IN_FLIGHT", 64)?,
            layouts_path: optional_var(&lookup, "TEMPEST_LAYOUTS"),
        };

        if config.buffer_size == 0 {
            return Err(TempestError::Config("TEMPEST_BUFFER must be positive".to_string()));
        }
        if config.forward_timeout_secs == 0 {
            return Err(TempestError::Config(
                "FORWARD_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        reqwest::Url::parse(&config.target)
            .map_err(|e| TempestError::Config(format!("Invalid INFLUX_URL: {}", e)))?;

        Ok(config)
    }

    pub fn routing(&self) -> RoutingConfig {
        let mut routing = RoutingConfig::new(&self.bucket);
        if let Some(bucket) = &self.rapid_wind_bucket {
            routing = routing.with_override(MessageKind::RapidWind, bucket);
        }
        routing
    }

    pub fn forwarder(&self) -> ForwarderConfig {
        ForwarderConfig {
            target: self.target.clone(),
            token: self.token.clone(),
            timeout: Duration::from_secs(self.forward_timeout_secs),
            noop: self.noop,
        }
    }

    /// Standard layouts plus any overrides from `layouts_path`
    pub fn layout_table(&self) -> Result<LayoutTable> {
        let mut table = LayoutTable::standard();
        if let Some(path) = &self.layouts_path {
            let doc = std::fs::read_to_string(path)
                .map_err(|e| TempestError::Config(format!("Cannot read {}: {}", path, e)))?;
            let count = table
                .extend_from_json(&doc)
                .map_err(|e| TempestError::Protocol(format!("{}: {}", path, e)))?;
            tracing::info!(path = %path, layouts = count, "Loaded layout overrides");
        }
        Ok(table)
    }
}
