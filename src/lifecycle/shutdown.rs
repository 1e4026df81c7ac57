//! Graceful Shutdown Handler
//!
//! Waits for a shutdown signal and tears the container down.

use crate::di::Container;
use std::future::Future;
use tokio::signal;

/// Destroys a container once a shutdown signal arrives.
///
/// # Example
///
/// ```rust,ignore
/// use beanstack::lifecycle::ShutdownHandler;
///
/// let handler = ShutdownHandler::new(container.clone());
/// tokio::spawn(async move {
///     handler.wait_for_shutdown().await;
///     std::process::exit(0);
/// });
/// ```
pub struct ShutdownHandler {
    container: Container,
}

impl ShutdownHandler {
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    /// Block until Ctrl+C or SIGTERM, then run `destroy_all`.
    ///
    /// Returns the number of singletons destroyed.
    pub async fn wait_for_shutdown(&self) -> usize {
        run_until(&self.container, shutdown_signal()).await
    }
}

/// Wait for `signal` to complete, then destroy every ready singleton.
///
/// Returns the number of singletons destroyed.
pub async fn run_until<F>(container: &Container, signal: F) -> usize
where
    F: Future<Output = ()>,
{
    signal.await;
    tracing::info!("Starting graceful shutdown...");
    let destroyed = container.destroy_all();
    tracing::info!("Graceful shutdown complete ({} singletons destroyed)", destroyed);
    destroyed
}

/// Create a future that completes when a shutdown signal is received
///
/// # Example
///
/// ```rust,ignore
/// use beanstack::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         container.destroy_all();
///     }
///     _ = worker.run() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
