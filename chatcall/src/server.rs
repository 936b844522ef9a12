//! Server lifecycle management
//!
//! Starts the HTTP server and the background expiry sweep, and shuts both
//! down cleanly on SIGTERM or Ctrl+C.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use chatcall_core::{bootstrap::Services, Config};

/// `ChatCall` server - owns the HTTP listener and the expiry sweeper
pub struct ChatCallServer {
    config: Config,
    services: Services,
}

impl ChatCallServer {
    pub const fn new(config: Config, services: Services) -> Self {
        Self { config, services }
    }

    /// Start all components and wait for a shutdown signal
    pub async fn start(self) -> Result<()> {
        info!("Starting ChatCall server...");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = self.start_expiry_sweeper();
        let mut http_handle = self.start_http_server(shutdown_rx).await?;

        info!("All components started");

        tokio::select! {
            result = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                result?;
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, draining connections...");
                let _ = shutdown_tx.send(true);
                // Let in-flight requests and open sockets drain
                let _ = http_handle.await;
            }
        }

        sweeper.abort();
        info!("ChatCall server shut down complete");
        Ok(())
    }

    /// Run the registry's expiry sweep on a fixed interval.
    ///
    /// Lazy eviction already keeps reads honest; the sweep exists so
    /// callers hear about expiry promptly even when nobody touches the
    /// call.
    fn start_expiry_sweeper(&self) -> JoinHandle<()> {
        let registry = self.services.registry.clone();
        let interval = Duration::from_secs(self.config.registry.sweep_interval_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let evicted = registry.sweep_expired();
                if evicted > 0 {
                    info!(evicted, "Evicted expired pending calls");
                }
            }
        })
    }

    /// Start the HTTP server with graceful shutdown support.
    ///
    /// Binds before spawning so a busy port fails startup instead of
    /// surfacing later as a dead background task.
    async fn start_http_server(
        &self,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        let http_address = self.config.http_address();

        let router = chatcall_api::http::create_router(
            self.services.jwt_service.clone(),
            self.services.token_service.clone(),
            self.services.registry.clone(),
            self.services.hub.clone(),
        );

        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;

        info!("HTTP server listening on {}", http_address);

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(e) = serve.await {
                error!("HTTP server error: {e}");
            }
            info!("HTTP server stopped");
        });

        Ok(handle)
    }
}

/// Resolves once SIGTERM or Ctrl+C arrives.
///
/// A handler that fails to install pends forever; installation failure
/// must not itself trigger a shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Ctrl+C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
