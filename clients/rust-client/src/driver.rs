use dbridge_core::ConnectRequest;
use reqwest::Method;
use std::sync::Arc;

use crate::connection::RemoteConnection;
use crate::error::RemoteResult;
use crate::transport::{HttpTransport, Transport};

/// Entry point to one bridge server.
#[derive(Clone)]
pub struct RemoteDriver {
    transport: Arc<dyn Transport>,
}

impl RemoteDriver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn http(base_url: &str) -> RemoteResult<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(base_url)?)))
    }

    /// Whether the server has a backend for `url`.
    pub async fn accepts_url(&self, url: &str) -> RemoteResult<bool> {
        let answer = self
            .transport
            .call(Method::POST, "/acceptsurl", Some(url.into()))
            .await?;
        Ok(serde_json::from_value(answer)?)
    }

    pub async fn connect(&self, request: &ConnectRequest) -> RemoteResult<RemoteConnection> {
        RemoteConnection::open(self.transport.clone(), request).await
    }
}
