use async_trait::async_trait;
use dbridge_core::TransportableError;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::{RemoteError, RemoteResult};

/// One request/response exchange with a bridge server.
///
/// `path` is absolute from the server root (`/connection/3/commit`). The
/// returned value is the decoded JSON body, `Null` for empty bodies.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, method: Method, path: &str, body: Option<JsonValue>) -> RemoteResult<JsonValue>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: TransportableError,
}

/// Turns a non-success response body into the error it carries.
pub fn decode_error(status: u16, text: &str) -> RemoteError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => body.error.into(),
        Err(_) => RemoteError::Protocol(format!("HTTP {}: {}", status, text)),
    }
}

pub fn decode_body(text: &str) -> RemoteResult<JsonValue> {
    if text.trim().is_empty() {
        return Ok(JsonValue::Null);
    }
    Ok(serde_json::from_str(text)?)
}

pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> RemoteResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| RemoteError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: Method, path: &str, body: Option<JsonValue>) -> RemoteResult<JsonValue> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Connection(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Protocol(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(decode_error(status.as_u16(), &text));
        }
        decode_body(&text)
    }
}
