use crate::{BookingError, Result, SeatStore};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Graceful shutdown coordinator
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<Box<dyn ShutdownComponent + Send + Sync>>>>,
    shutdown_timeout: Duration,
}

/// Trait for components that need graceful shutdown
#[async_trait::async_trait]
pub trait ShutdownComponent {
    async fn shutdown(&self) -> Result<()>;
    fn name(&self) -> &str;
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ShutdownCoordinator {
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
            shutdown_timeout,
        }
    }

    /// Register a component for graceful shutdown
    pub async fn register_component(&self, component: Box<dyn ShutdownComponent + Send + Sync>) {
        let mut components = self.components.lock().await;
        info!("Registering component '{}' for graceful shutdown", component.name());
        components.push(component);
    }

    /// Get a shutdown signal receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger graceful shutdown. Components are stopped in registration order.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if self.shutdown_tx.send(()).is_err() {
            warn!("No subscribers for the shutdown signal");
        }

        let components = self.components.lock().await;
        let shutdown_all = async {
            let mut failures = 0;
            for component in components.iter() {
                info!("Shutting down component '{}'", component.name());
                match component.shutdown().await {
                    Ok(()) => info!("Component '{}' shutdown successfully", component.name()),
                    Err(e) => {
                        error!("Component '{}' shutdown failed: {}", component.name(), e);
                        failures += 1;
                    }
                }
            }
            failures
        };

        match tokio::time::timeout(self.shutdown_timeout, shutdown_all).await {
            Ok(0) => {
                info!("All components shutdown successfully");
                Ok(())
            }
            Ok(failures) => Err(BookingError::Shutdown(format!(
                "{} component(s) failed to shut down",
                failures
            ))),
            Err(_) => {
                error!("Shutdown timeout exceeded");
                Err(BookingError::Shutdown(format!(
                    "timeout of {:?} exceeded",
                    self.shutdown_timeout
                )))
            }
        }
    }
}

/// Flushes the seat store on shutdown
pub struct StoreShutdown {
    store: Arc<dyn SeatStore>,
}

impl StoreShutdown {
    pub fn new(store: Arc<dyn SeatStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ShutdownComponent for StoreShutdown {
    async fn shutdown(&self) -> Result<()> {
        info!("Flushing {} store...", self.store.name());
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.flush())
            .await
            .map_err(|e| BookingError::Io(std::io::Error::other(e)))??;
        info!("{} store flushed successfully", self.store.name());
        Ok(())
    }

    fn name(&self) -> &str {
        "seat-store"
    }
}

/// Resolves on SIGTERM or Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
