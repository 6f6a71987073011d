//! Binding between a local proxy and its server-side entity.

use dbridge_core::{CoercionEngine, EntityDescriptor, ErrorKind};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{RemoteError, RemoteResult};
use crate::transport::Transport;

/// Open/closed flag of a proxy, linked to the flags of its ancestors so that
/// closing a connection locally invalidates every proxy created under it.
#[derive(Debug, Default)]
pub(crate) struct Lifetime {
    closed: AtomicBool,
    parent: Option<Arc<Lifetime>>,
}

impl Lifetime {
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            parent: Some(self.clone()),
        })
    }

    pub fn is_open(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.parent.as_ref().map_or(true, |p| p.is_open())
    }

    /// Marks this proxy closed; false if it already was.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

#[derive(Clone)]
pub(crate) struct Handle {
    descriptor: EntityDescriptor,
    transport: Arc<dyn Transport>,
    life: Arc<Lifetime>,
    engine: Arc<CoercionEngine>,
}

impl Handle {
    pub fn root(
        descriptor: EntityDescriptor,
        transport: Arc<dyn Transport>,
        engine: Arc<CoercionEngine>,
    ) -> Self {
        Self {
            descriptor,
            transport,
            life: Lifetime::root(),
            engine,
        }
    }

    pub fn child(&self, descriptor: EntityDescriptor) -> Self {
        Self {
            descriptor,
            transport: self.transport.clone(),
            life: self.life.child(),
            engine: self.engine.clone(),
        }
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn url(&self) -> &str {
        &self.descriptor.url
    }

    pub fn engine(&self) -> &CoercionEngine {
        &self.engine
    }

    pub fn is_open(&self) -> bool {
        self.life.is_open()
    }

    /// Fails with `ReferenceNotFound` once this proxy or an ancestor is closed.
    pub fn ensure_open(&self) -> RemoteResult<()> {
        if !self.is_open() {
            return Err(RemoteError::local(
                ErrorKind::ReferenceNotFound,
                format!("{} is closed", self.descriptor.url),
            ));
        }
        Ok(())
    }

    /// Fails fast for closed proxies and for operations the session policy
    /// lists as unsupported.
    fn check(&self, function: &str) -> RemoteResult<()> {
        self.ensure_open()?;
        if !function.is_empty() && !self.engine.policy().is_supported(function) {
            return Err(RemoteError::local(ErrorKind::UnsupportedOperation, function));
        }
        Ok(())
    }

    pub async fn raw(&self, method: Method, action: &str, body: Option<JsonValue>) -> RemoteResult<JsonValue> {
        self.check(action.split('/').next().unwrap_or_default())?;
        let path = if action.is_empty() {
            self.descriptor.url.clone()
        } else {
            format!("{}/{}", self.descriptor.url, action)
        };
        self.transport.call(method, &path, body).await
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        action: &str,
        body: Option<JsonValue>,
    ) -> RemoteResult<T> {
        let value = self.raw(method, action, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, action: &str) -> RemoteResult<T> {
        self.call(Method::GET, action, None).await
    }

    pub async fn post<T: DeserializeOwned>(&self, action: &str, body: impl Serialize) -> RemoteResult<T> {
        self.call(Method::POST, action, Some(serde_json::to_value(body)?)).await
    }

    pub async fn put<B: Serialize>(&self, action: &str, body: B) -> RemoteResult<()> {
        self.raw(Method::PUT, action, Some(serde_json::to_value(body)?)).await?;
        Ok(())
    }

    /// Issues an action without a body and ignores the response.
    pub async fn send(&self, method: Method, action: &str) -> RemoteResult<()> {
        self.raw(method, action, None).await?;
        Ok(())
    }

    /// Closes the server-side entity. Closing twice is a local no-op.
    pub async fn close(&self) -> RemoteResult<()> {
        if !self.life.is_open() || !self.life.close() {
            return Ok(());
        }
        self.transport
            .call(Method::DELETE, &self.descriptor.url, None)
            .await?;
        Ok(())
    }

    /// Closes through a dedicated action (`free`) rather than a bare DELETE.
    pub async fn free(&self) -> RemoteResult<()> {
        if !self.life.is_open() || !self.life.close() {
            return Ok(());
        }
        self.transport
            .call(Method::DELETE, &format!("{}/free", self.descriptor.url), None)
            .await?;
        Ok(())
    }
}
