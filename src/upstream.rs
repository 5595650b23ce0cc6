// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Upstream agent client
//
// Forwards a run request to the agent runtime and hands back its status,
// headers and a streaming body. The relay never buffers the body.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use futures_util::stream::{Stream, TryStreamExt};

use crate::config::UpstreamConfig;

/// Request headers copied from the inbound request to the upstream one.
const FORWARDED_HEADERS: &[&str] = &["authorization", "cookie", "x-user-id", "x-session-id"];

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

impl UpstreamError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

pub type UpstreamBody = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// One agent run to forward.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub request_id: String,
    pub headers: HeaderMap,
    /// Validated JSON request body, forwarded unchanged.
    pub body: Bytes,
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Forwards runs to the agent runtime. Shared across handlers via `Arc`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(&self, request: RunRequest) -> Result<UpstreamResponse, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Reqwest client
// ---------------------------------------------------------------------------

pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
}

impl ReqwestUpstreamClient {
    pub fn new(client: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            url: config.url(),
            timeout: config.timeout(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn forward(&self, request: RunRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut headers = HeaderMap::new();
        for name in FORWARDED_HEADERS {
            if let Some(value) = request.headers.get(*name) {
                headers.insert(*name, value.clone());
            }
        }
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Ok(id) = HeaderValue::from_str(&request.request_id) {
            headers.insert("x-request-id", id);
        }

        let mut req = self
            .client
            .post(&self.url)
            .headers(headers)
            .body(request.body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        tracing::debug!(request_id = %request.request_id, url = %self.url, "forwarding run");

        let resp = req.send().await.map_err(UpstreamError::from_reqwest)?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes_stream().map_err(UpstreamError::from_reqwest);

        Ok(UpstreamResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatSetting;
    use futures_util::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> UpstreamConfig {
        UpstreamConfig {
            base_url: server.uri(),
            path: "/run_sse".into(),
            format: FormatSetting::Auto,
            timeout_ms: Some(5_000),
        }
    }

    fn run(headers: HeaderMap) -> RunRequest {
        RunRequest {
            request_id: "req-1".into(),
            headers,
            body: Bytes::from_static(br#"{"new_message":"hi"}"#),
        }
    }

    #[tokio::test]
    async fn forwards_body_and_auth_and_streams_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run_sse"))
            .and(header("authorization", "Bearer t"))
            .and(header("x-request-id", "req-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_raw("data: {}\n\n", "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ReqwestUpstreamClient::new(reqwest::Client::new(), &config_for(&server));
        let mut inbound = HeaderMap::new();
        inbound.insert("authorization", HeaderValue::from_static("Bearer t"));
        inbound.insert("x-internal", HeaderValue::from_static("drop me"));

        let resp = client.forward(run(inbound)).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.content_type(), Some("text/event-stream"));

        let chunks: Vec<_> = resp.body.collect().await;
        let body: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(body, b"data: {}\n\n");
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let config = UpstreamConfig {
            base_url: "http://127.0.0.1:1".into(),
            path: "/run_sse".into(),
            format: FormatSetting::Auto,
            timeout_ms: None,
        };
        let client = ReqwestUpstreamClient::new(reqwest::Client::new(), &config);
        let err = client.forward(run(HeaderMap::new())).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport(_)));
    }

    #[tokio::test]
    async fn slow_upstream_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.timeout_ms = Some(50);
        let client = ReqwestUpstreamClient::new(reqwest::Client::new(), &config);
        let err = client.forward(run(HeaderMap::new())).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(_)));
    }
}
