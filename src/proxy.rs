// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// HTTP relay
//
// Responsibilities:
// - Validate and forward agent runs via the injected UpstreamClient
// - Re-frame successful upstream bodies into one envelope per part
// - Pass non-2xx upstream responses through unchanged
// - Heartbeat endpoint

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::config::FormatSetting;
use crate::stream::StreamProcessor;
use crate::upstream::{RunRequest, UpstreamClient, UpstreamError};

/// The relay binds to localhost only, never 0.0.0.0.
pub const BIND_HOST: [u8; 4] = [127, 0, 0, 1];
pub const DEFAULT_PORT: u16 = 9810;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to the caller before any frame is written.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("request body is empty")]
    EmptyBody,
}

impl From<UpstreamError> for ProxyError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Transport(msg) => ProxyError::UpstreamFailure(msg),
            UpstreamError::Timeout(msg) => ProxyError::UpstreamTimeout(msg),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // Public messages never carry upstream detail.
        let (status, public_message) = match &self {
            ProxyError::UpstreamFailure(_) => (StatusCode::BAD_GATEWAY, "upstream request failed"),
            ProxyError::UpstreamTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream request timed out")
            }
            ProxyError::MalformedJson(_) => (StatusCode::BAD_REQUEST, "request body is not valid JSON"),
            ProxyError::EmptyBody => (StatusCode::BAD_REQUEST, "request body is empty"),
        };
        (status, public_message).into_response()
    }
}

// ---------------------------------------------------------------------------
// Header handling
// ---------------------------------------------------------------------------

/// Remove hop-by-hop headers that must not be relayed.
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    for name in [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-connection",
    ] {
        headers.remove(name);
    }
}

fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub processor: Arc<StreamProcessor>,
    pub format: FormatSetting,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// POST /v1/run_sse
pub async fn run_sse(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if body.is_empty() {
        return ProxyError::EmptyBody.into_response();
    }
    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
        return ProxyError::MalformedJson(e.to_string()).into_response();
    }

    let request_id = request_id_from(&headers);
    let run = RunRequest {
        request_id: request_id.clone(),
        headers,
        body,
    };

    let upstream = match state.upstream.forward(run).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "upstream request failed");
            return ProxyError::from(e).into_response();
        }
    };

    if !upstream.status.is_success() {
        tracing::info!(
            request_id = %request_id,
            status = upstream.status.as_u16(),
            "passing upstream error through"
        );
        let mut response = Response::new(Body::from_stream(upstream.body));
        *response.status_mut() = upstream.status;
        *response.headers_mut() = upstream.headers;
        strip_hop_by_hop_headers(response.headers_mut());
        return response;
    }

    let format = state.format.resolve(upstream.content_type());
    tracing::info!(request_id = %request_id, %format, "streaming run");

    let span = tracing::info_span!("run", request_id = %request_id);
    let frames = span.in_scope(|| state.processor.process(format, upstream.body));
    let mut response = Response::new(Body::from_stream(frames.map(Ok::<_, Infallible>)));
    let out = response.headers_mut();
    out.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    out.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(id) = HeaderValue::from_str(&request_id) {
        out.insert(REQUEST_ID, id);
    }
    response
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. All collaborators arrive through `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/v1/run_sse", post(run_sse))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
