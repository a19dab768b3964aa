//! Admission middleware for axum.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::net::SocketAddr;
use tracing::info;

use crate::ratelimit::{AdmissionControl, Decision};

/// Body message of a rejected request.
pub const REJECTION_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Admit the request or answer `429 Too Many Requests`.
///
/// The client address comes from the connection's [`ConnectInfo`]; when the
/// server was not built with connect info the address resolves as empty.
pub async fn rate_limit(
    State(admission): State<AdmissionControl>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let resolved = admission.resolver().resolve_request(req.headers(), peer);

    match admission.check(&resolved).await {
        Decision::Admitted => next.run(req).await,
        decision => {
            info!(
                identity = %resolved.key,
                decision = ?decision,
                method = %req.method(),
                path = %req.uri().path(),
                "Request rejected"
            );
            too_many_requests()
        }
    }
}

fn too_many_requests() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "message": REJECTION_MESSAGE })),
    )
        .into_response()
}
