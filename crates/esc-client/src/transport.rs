//! Transport seam between the write path and a server endpoint
//!
//! [`HttpTransport`] talks to a live server over reqwest. Tests substitute an
//! in-memory implementation.

use crate::error::ClientError;
use async_trait::async_trait;
use esc_negotiation::Headers;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// HTTP method subset used by the write path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// Request after header negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    /// Method
    pub method: Method,
    /// Path and query, starting with `/`
    pub path: String,
    /// Negotiated headers
    pub headers: Headers,
    /// Body, passed through untouched
    pub body: Option<String>,
}

impl OutgoingRequest {
    /// New request without headers or body
    #[inline]
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// With headers
    #[inline]
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// With body
    #[inline]
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Status and parsed JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP status
    pub status: u16,
    /// JSON body; non-JSON text is wrapped as `{"raw": ...}`
    pub body: Value,
}

impl TransportResponse {
    /// New response
    #[inline]
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// 2xx
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Best-effort error reason from an error body
    #[must_use]
    pub fn error_reason(&self) -> String {
        let error = &self.body["error"];
        error["reason"]
            .as_str()
            .or_else(|| error.as_str())
            .or_else(|| self.body["raw"].as_str())
            .map_or_else(|| self.body.to_string(), str::to_string)
    }

    fn from_text(status: u16, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
        };
        Self { status, body }
    }
}

/// Sends negotiated requests to one server endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request exactly as given
    ///
    /// # Errors
    /// `ClientError::Transport` when no response was received. HTTP error
    /// statuses are returned as responses, not errors.
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, ClientError>;

    /// Endpoint description for diagnostics
    fn endpoint(&self) -> String;
}

/// reqwest-backed transport bound to a base URL
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport with its own connection pool
    ///
    /// # Errors
    /// `ClientError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Share an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL without trailing slash
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(method = %request.method, %url, headers = ?request.headers, "sending request");

        let mut builder = self.client.request(request.method.as_reqwest(), &url);
        for (key, value) in request.headers.iter() {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok(TransportResponse::from_text(status, &text))
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_reason_prefers_structured_reason() {
        let response = TransportResponse::new(
            406,
            json!({"error": {"reason": "Content-Type header [x] is not supported"}, "status": 406}),
        );
        assert_eq!(response.error_reason(), "Content-Type header [x] is not supported");

        let flat = TransportResponse::new(400, json!({"error": "bad"}));
        assert_eq!(flat.error_reason(), "bad");

        let raw = TransportResponse::from_text(502, "Bad Gateway");
        assert_eq!(raw.error_reason(), "Bad Gateway");
    }

    #[test]
    fn empty_body_is_null() {
        let response = TransportResponse::from_text(200, "  ");
        assert_eq!(response.body, Value::Null);
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn http_transport_sends_headers_and_body_verbatim() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/_bulk")
                    .header("Content-Type", "application/x-ndjson")
                    .body("{\"index\":{}}\n{}\n");
                then.status(200).json_body(json!({"errors": false, "items": []}));
            })
            .await;

        let transport = HttpTransport::new(server.base_url(), Duration::from_secs(5)).unwrap();
        let request = OutgoingRequest::new(Method::Post, "/_bulk")
            .with_headers(Headers::from([("Content-Type", "application/x-ndjson")]))
            .with_body("{\"index\":{}}\n{}\n");

        let response = transport.send(request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["errors"], false);
    }

    #[tokio::test]
    async fn http_transport_returns_error_status_as_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing/_count");
                then.status(404)
                    .json_body(json!({"error": {"reason": "no such index [missing]"}, "status": 404}));
            })
            .await;

        let transport = HttpTransport::new(format!("{}/", server.base_url()), Duration::from_secs(5)).unwrap();
        let response = transport
            .send(OutgoingRequest::new(Method::Get, "/missing/_count"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.error_reason(), "no such index [missing]");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = transport
            .send(OutgoingRequest::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
