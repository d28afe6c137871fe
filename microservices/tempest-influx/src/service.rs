//! Bridge service lifecycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempest_core::{Result, TempestService};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::pipeline::Pipeline;

/// UDP listener forwarding hub broadcasts to the write endpoint
pub struct TempestInfluxService {
    config: BridgeConfig,
    pipeline: Arc<Pipeline>,
    shutdown: Notify,
    running: AtomicBool,
    stopped: Notify,
    start_time: Instant,
}

/// How long `shutdown` waits for the receive loop to stop
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl TempestInfluxService {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let pipeline = Pipeline::from_config(&config)?;

        info!(
            source = %config.source,
            target = %config.target,
            bucket = %config.bucket,
            rapid_wind_bucket = config.rapid_wind_bucket.as_deref().unwrap_or("-"),
            max_in_flight = config.max_in_flight,
            noop = config.noop,
            "Initializing bridge"
        );

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            shutdown: Notify::new(),
            running: AtomicBool::new(false),
            stopped: Notify::new(),
            start_time: Instant::now(),
        })
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Whether the receive loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TempestService for TempestInfluxService {
    fn service_id(&self) -> &'static str {
        "tempest-influx"
    }

    async fn start(&self) -> Result<()> {
        let socket = UdpSocket::bind(&self.config.source).await?;
        info!(addr = %socket.local_addr()?, "Listening for hub broadcasts");

        self.running.store(true, Ordering::SeqCst);
        Dispatcher::new(self.pipeline.clone(), self.config.buffer_size)
            .with_debug(self.config.debug)
            .run(socket, self.shutdown.notified())
            .await;
        self.running.store(false, Ordering::SeqCst);
        self.stopped.notify_one();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.notify_one();
        if self.is_running()
            && tokio::time::timeout(STOP_TIMEOUT, self.stopped.notified())
                .await
                .is_err()
        {
            warn!("Receive loop did not stop in time");
        }
        self.pipeline.metrics().log_summary();
        info!(
            uptime_seconds = self.start_time.elapsed().as_secs(),
            "Bridge stopped"
        );
        Ok(())
    }
}
