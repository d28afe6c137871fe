//! Service infrastructure for all microservices

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};

use crate::error::Result;

/// Standard trait all microservices must implement
#[async_trait]
pub trait TempestService: Send + Sync + 'static {
    /// Service identifier (e.g., "tempest-influx")
    fn service_id(&self) -> &'static str;

    /// Service version
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Run until the task is aborted or a fatal error occurs
    async fn start(&self) -> Result<()>;

    /// Graceful shutdown
    async fn shutdown(&self) -> Result<()>;
}

/// Standard microservice runtime bootstrap
pub struct ServiceRuntime {
    start_time: Instant,
}

impl ServiceRuntime {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Run a microservice until Ctrl+C or SIGTERM
    pub async fn run<S: TempestService>(service: Arc<S>) -> Result<()> {
        Self::new().run_until(service, Self::wait_for_shutdown()).await
    }

    /// Run a microservice until `shutdown` resolves or the service stops on
    /// its own. Work still in flight inside `start` is abandoned.
    pub async fn run_until<S, F>(&self, service: Arc<S>, shutdown: F) -> Result<()>
    where
        S: TempestService,
        F: Future<Output = ()> + Send,
    {
        info!(
            service_id = service.service_id(),
            version = service.version(),
            "Starting microservice"
        );

        let service_clone = service.clone();
        let mut service_handle = tokio::spawn(async move { service_clone.start().await });

        let outcome = tokio::select! {
            _ = shutdown => {
                info!("Shutdown signal received, gracefully stopping...");
                Ok(())
            }
            joined = &mut service_handle => match joined {
                Ok(Ok(())) => {
                    warn!("Service stopped without a shutdown signal");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(code = e.error_code(), "Service error: {}", e);
                    Err(e)
                }
                Err(e) => {
                    error!("Service task failed: {}", e);
                    Err(crate::TempestError::Internal(e.to_string()))
                }
            },
        };

        if let Err(e) = service.shutdown().await {
            warn!("Error during shutdown: {}", e);
        }

        service_handle.abort();

        info!(
            uptime_seconds = self.start_time.elapsed().as_secs(),
            "Microservice stopped"
        );

        outcome
    }

    async fn wait_for_shutdown() {
        let ctrl_c = async {
            signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to listen for SIGTERM")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}

impl Default for ServiceRuntime {
    fn default() -> Self {
        Self::new()
    }
}
