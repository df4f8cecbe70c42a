use crate::encoding::{Encoder, Envelope, Toggles};
use crate::error::ServerError;
use crate::state::ServerState;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id carried in request extensions for logging.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// API key authentication middleware
///
/// Runs before anything else that can answer, so a bad or missing key is a
/// bare 401 regardless of path or method. The presented key is never logged.
pub async fn api_key_auth(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.is_valid_api_key(presented) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected request with missing or invalid API key"
        );
        return Err(ServerError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Content negotiation middleware
///
/// Picks an [`Encoder`] from `Content-Type` and the `pretty`/`null` query
/// toggles, exposes it to handlers through request extensions and re-encodes
/// any [`Envelope`] response in the chosen format. Error responses produced
/// by the framework itself (rejections, timeouts) get an envelope built from
/// their status.
pub async fn negotiate(mut request: Request, next: Next) -> Response {
    // A query that does not decode leaves both toggles off.
    let pairs = Query::<Vec<(String, String)>>::try_from_uri(request.uri())
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();
    let encoder = Encoder::negotiate(
        request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Toggles::from_pairs(&pairs),
    );
    request.extensions_mut().insert(encoder);

    let mut response = next.run(request).await;
    let status = response.status();

    let envelope = match response.extensions_mut().remove::<Envelope>() {
        Some(envelope) => envelope,
        None if status.is_client_error() || status.is_server_error() => {
            Envelope::from_status(status)
        }
        None => return response,
    };

    let body = match encoder.encode(&envelope) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode response envelope");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.insert(CONTENT_TYPE, encoder.content_type());
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(body))
}

/// Request ID injection middleware
pub async fn request_id(mut request: Request, next: Next) -> Response {
    // Generate or extract request ID
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Logging middleware
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    tracing::info!(
        method = %method,
        path = %path,
        request_id = %request_id,
        "Request started"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %path,
        status = %status,
        duration_ms = %duration.as_millis(),
        request_id = %request_id,
        "Request completed"
    );

    response
}
