//! Streamable HTTP transport for the MCP server.

use crate::auth::{AuthConfig, auth_middleware};
use crate::error::{DbError, DbResult};
use crate::mcp::DiagService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// SSE connections can keep the server alive indefinitely after a shutdown
/// signal; give them this long to finish.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    service: DiagService,
    host: String,
    port: u16,
    /// MCP endpoint path
    endpoint: String,
    auth: Arc<AuthConfig>,
}

impl HttpTransport {
    pub fn new(
        service: DiagService,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            service,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
            auth: Arc::new(auth),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The axum router serving MCP at the configured endpoint.
    pub fn router(&self) -> axum::Router {
        let service = self.service.clone();
        let mcp = StreamableHttpService::new(
            move || Ok(service.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service does not accept the root path
        let router = if self.endpoint == "/" {
            axum::Router::new().fallback_service(mcp)
        } else {
            axum::Router::new().nest_service(&self.endpoint, mcp)
        };

        if self.auth.is_enabled() {
            router.layer(axum::middleware::from_fn_with_state(
                self.auth.clone(),
                auth_middleware,
            ))
        } else {
            router
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!(
            addr = %bind_addr,
            auth = self.auth.is_enabled(),
            tokens = self.auth.token_count(),
            "Starting MCP server with HTTP transport"
        );
        if !self.auth.is_enabled() {
            warn!("HTTP authentication is disabled; any client that can reach the port can call tools");
        }

        let app = self.router();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let notify = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            notify.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );
                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database connections");
        self.service.dispatcher().pool().close().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
