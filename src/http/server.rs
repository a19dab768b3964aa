//! HTTP server implementation.

use axum::routing::get;
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::rate_limit;
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::AdmissionControl;

/// Build the protected router: every route sits behind the admission middleware.
pub fn router(admission: AdmissionControl) -> Router {
    Router::new()
        .route("/", get(welcome))
        .layer(middleware::from_fn_with_state(admission, rate_limit))
}

async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to the rate limited API" }))
}

/// HTTP server for the rate limited API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Admission pipeline shared by all requests
    admission: AdmissionControl,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, admission: AdmissionControl) -> Self {
        Self { addr, admission }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GatekeeperError::Io(e)
        })?;

        info!(addr = %self.addr, "Starting HTTP server");

        let app = router(self.admission).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                GatekeeperError::Io(e)
            })
    }
}
