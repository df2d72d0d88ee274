use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::{sync::watch, time::timeout};
use tracing::info;

use crate::{
    api::{self, AppState},
    config::RelayConfig,
    endpoint,
    hub::Hub,
    registry::IdentityRegistry,
};

/// Build the relay router over prepared state. Split out so tests can
/// serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/register", post(api::post_register))
        .route("/health", get(api::get_health))
        .route("/message", get(endpoint::message_handler))
        .with_state(state)
}

pub struct RelayServer {
    config: RelayConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            shutdown_tx,
        })
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let registry = Arc::new(IdentityRegistry::new());
        let (hub, hub_handle) = Hub::new();
        let hub_task = tokio::spawn(hub.run());

        let state = AppState {
            registry,
            hub: hub_handle.clone(),
            config: self.config.clone(),
        };
        let app = router(state);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("courier-relay listening on {}", listener.local_addr()?);

        // Closing connections is the hub's job: when the shutdown signal
        // fires, tell the hub first so every endpoint's close signal flips
        // and the upgraded connections drain, then let axum finish.
        let shutdown_rx = self.shutdown_tx.subscribe();
        let hub_for_shutdown = hub_handle.clone();
        let graceful = async move {
            Self::shutdown_signal(shutdown_rx).await;
            hub_for_shutdown.shutdown();
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await?;

        hub_handle.shutdown();
        let _ = timeout(self.config.shutdown_timeout(), hub_task).await;
        info!("courier-relay stopped");
        Ok(())
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, starting graceful shutdown");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("shutdown requested");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
