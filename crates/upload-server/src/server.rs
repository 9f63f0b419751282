//! Upload HTTP server.
//!
//! Binds a TCP listener and serves the upload route until
//! [`UploadServer::shutdown`] is called.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use resumable_transfer::UploadCoordinator;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::ServerError;
use crate::routes::create_router;
use crate::state::AppState;

/// Default request body limit: room for a 10 MiB chunk plus form fields.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024 + 64 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Path serving both probes and deliveries.
    pub route: String,
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            route: "/upload".into(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

/// The upload HTTP server.
pub struct UploadServer {
    config: ServerConfig,
    state: AppState,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl UploadServer {
    pub fn new(config: ServerConfig, coordinator: Arc<UploadCoordinator>) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: AppState::new(coordinator),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Gracefully shuts down the server. In-flight requests are finished.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Builds the router for the configured route.
    pub fn router(&self) -> Result<Router, ServerError> {
        let route = &self.config.route;
        let has_params = route.contains(['{', '}'])
            || route.split('/').any(|segment| segment.starts_with([':', '*']));
        if !route.starts_with('/') || has_params {
            return Err(ServerError::InvalidRoute(route.clone()));
        }
        Ok(create_router(
            self.state.clone(),
            route,
            self.config.max_request_bytes,
        ))
    }

    /// Runs the server until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let router = self.router()?;

        let listener = TcpListener::bind((self.config.bind, self.config.port)).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(route = %self.config.route, "upload server listening on {local_addr}");

        axum::serve(listener, router)
            .with_graceful_shutdown(self.cancel.clone().cancelled_owned())
            .await?;

        tracing::info!("server shutting down");
        Ok(())
    }
}
