//! Common test utilities for bridge integration tests
//!
//! Provides shared helpers for:
//! - Building the router over an in-memory SQLite backend
//! - Issuing raw HTTP calls with `oneshot`
//! - Driving the Rust client through the router with a counting transport

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use dbridge::{create_router, AppState, Config};
use dbridge_client::transport::{decode_body, decode_error};
use dbridge_client::{RemoteConnection, RemoteDriver, RemoteResult, Transport};
use dbridge_core::ConnectRequest;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

pub const MEMORY_URL: &str = "sqlite::memory:";

pub fn create_test_app() -> Router {
    create_app_with(Config::default())
}

pub fn create_app_with(config: Config) -> Router {
    let state = AppState::from_config(config).expect("Failed to build app state");
    create_router(state)
}

// Helper to parse JSON response
pub async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&body).unwrap()
}

/// One raw request against the router.
pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(b) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    (status, response_json(response).await)
}

/// Opens a session over HTTP and returns its URL.
pub async fn connect(app: &Router) -> String {
    let (status, body) = call(app, Method::POST, "/connection", Some(json!({ "url": MEMORY_URL }))).await;
    assert_eq!(status, StatusCode::OK, "connect failed: {}", body);
    body["url"].as_str().unwrap().to_string()
}

/// Transport that serves requests straight from the router and counts them.
pub struct RouterTransport {
    app: Router,
    calls: AtomicUsize,
}

impl RouterTransport {
    pub fn new(app: Router) -> Self {
        Self {
            app,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RouterTransport {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> RemoteResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(b) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let response = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        if !status.is_success() {
            return Err(decode_error(status.as_u16(), &text));
        }
        decode_body(&text)
    }
}

pub fn client_for(app: Router) -> (RemoteDriver, Arc<RouterTransport>) {
    let transport = Arc::new(RouterTransport::new(app));
    (RemoteDriver::new(transport.clone()), transport)
}

pub async fn open_client(app: Router) -> (RemoteConnection, Arc<RouterTransport>) {
    open_client_with(app, BTreeMap::new()).await
}

/// Opens a client connection with extra connection properties.
pub async fn open_client_with(
    app: Router,
    properties: BTreeMap<String, String>,
) -> (RemoteConnection, Arc<RouterTransport>) {
    let (driver, transport) = client_for(app);
    let request = ConnectRequest {
        url: Some(MEMORY_URL.to_string()),
        properties,
        ..Default::default()
    };
    let conn = driver.connect(&request).await.expect("Failed to connect");
    (conn, transport)
}

/// Runs DDL/DML statements on a fresh plain statement.
pub async fn run_sql(conn: &RemoteConnection, statements: &[&str]) {
    let stmt = conn.create_statement().await.unwrap();
    for sql in statements {
        stmt.execute_update(Some(sql)).await.unwrap();
    }
    stmt.close().await.unwrap();
}
