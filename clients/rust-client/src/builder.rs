use dbridge_core::ConnectRequest;
use std::sync::Arc;
use std::time::Duration;

use crate::connection::RemoteConnection;
use crate::driver::RemoteDriver;
use crate::error::RemoteResult;
use crate::transport::HttpTransport;

pub struct RemoteDriverBuilder {
    addr: String,
    request: ConnectRequest,
    timeout_ms: Option<u64>,
}

impl RemoteDriverBuilder {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            request: ConnectRequest::default(),
            timeout_ms: None,
        }
    }

    /// Database URL or alias; the server falls back to the user's mapping.
    pub fn url(mut self, url: &str) -> Self {
        self.request.url = Some(url.to_string());
        self
    }

    pub fn auth(mut self, user: &str, password: &str) -> Self {
        self.request.user = Some(user.to_string());
        self.request.password = Some(password.to_string());
        self
    }

    /// Connection property, also usable to override conversion options.
    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.request
            .properties
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn build(&self) -> RemoteResult<RemoteDriver> {
        let transport = match self.timeout_ms {
            Some(ms) => HttpTransport::with_timeout(&self.addr, Duration::from_millis(ms))?,
            None => HttpTransport::new(&self.addr)?,
        };
        Ok(RemoteDriver::new(Arc::new(transport)))
    }

    pub async fn connect(self) -> RemoteResult<RemoteConnection> {
        self.build()?.connect(&self.request).await
    }
}
