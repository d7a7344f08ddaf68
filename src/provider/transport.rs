//! HTTP transport seam.
//!
//! Backends hand a fully built [`TransportRequest`] to a [`Transport`] and get
//! the status and body back. Non-2xx statuses are returned, not raised; the
//! caller maps them. Only network-level failures are errors here.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GuardError, GuardResult};

/// A request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Service name, used to label errors.
    pub service: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Raw backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to a backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> GuardResult<TransportResponse>;
}

/// Transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration, https_only: bool) -> GuardResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .https_only(https_only)
            .tls_info(true)
            .build()
            .map_err(|e| GuardError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> GuardResult<TransportResponse> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| transport_error(&request.service, &e))?;

        let peer_cert = response
            .extensions()
            .get::<reqwest::tls::TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .is_some();
        tracing::debug!(
            service = %request.service,
            status = response.status().as_u16(),
            peer_certificate = peer_cert,
            "Backend responded"
        );

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&request.service, &e))?;
        Ok(TransportResponse { status, body })
    }
}

fn transport_error(service: &str, e: &reqwest::Error) -> GuardError {
    let message = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else {
        // Keep URLs out of diagnostics.
        let text = e.to_string();
        match e.url() {
            Some(url) => text.replace(url.as_str(), "<url>"),
            None => text,
        }
    };
    GuardError::Transport {
        provider: service.to_string(),
        status: e.status().map(|s| s.as_u16()),
        message,
    }
}
