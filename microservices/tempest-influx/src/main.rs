//! tempest-influx - WeatherFlow Tempest UDP to InfluxDB bridge

use std::sync::Arc;

use tempest_core::ServiceRuntime;
use tempest_influx::{BridgeConfig, TempestInfluxService};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _telemetry = tempest_telemetry::init("tempest-influx")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tempest-influx");

    let config = BridgeConfig::from_env()?;
    let service = Arc::new(TempestInfluxService::new(config)?);
    ServiceRuntime::run(service).await?;

    Ok(())
}
