//! Session Bootstrap and Permission Tests
//!
//! Credentials, aliases and SQL permission rules configured on the server.

mod common;

use axum::http::{Method, StatusCode};
use common::{call, client_for, create_app_with};
use dbridge::bootstrap::{hash_password, UserEntry};
use dbridge::permissions::PermissionRule;
use dbridge::Config;
use dbridge_core::{ConnectRequest, ErrorKind};
use serde_json::json;
use std::collections::BTreeMap;

fn secured_config() -> Config {
    let mut config = Config::default();
    config.bootstrap.require_auth = true;
    config
        .bootstrap
        .aliases
        .insert("scratch".to_string(), "sqlite::memory:".to_string());
    config.bootstrap.users.insert(
        "ada".to_string(),
        UserEntry {
            url: Some("scratch".to_string()),
            password_hash: Some(hash_password("lovelace").unwrap()),
            properties: BTreeMap::new(),
        },
    );
    config.bootstrap.users.insert(
        "reader".to_string(),
        UserEntry {
            url: Some("scratch".to_string()),
            password_hash: Some(hash_password("pages").unwrap()),
            properties: BTreeMap::new(),
        },
    );
    config.permissions.insert(
        "reader".to_string(),
        PermissionRule {
            allow: vec!["SELECT".to_string()],
            deny: vec![],
        },
    );
    config
}

fn login(user: &str, password: &str) -> ConnectRequest {
    ConnectRequest {
        user: Some(user.to_string()),
        password: Some(password.to_string()),
        ..Default::default()
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_login_through_alias() {
    let (driver, _) = client_for(create_app_with(secured_config()));
    let conn = driver.connect(&login("ada", "lovelace")).await.unwrap();
    assert_eq!(conn.backend(), "sqlite");

    let info = conn.metadata().await.unwrap();
    assert_eq!(info.user_name.as_deref(), Some("ada"));
}

#[tokio::test]
async fn test_bad_password_is_rejected() {
    let app = create_app_with(secured_config());
    let (status, body) = call(
        &app,
        Method::POST,
        "/connection",
        Some(json!({ "user": "ada", "password": "babbage" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["ancestry"][0], "LoginFailure");

    let (driver, _) = client_for(app);
    let err = driver.connect(&login("nobody", "x")).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::LoginFailure);
    assert!(err.is_a(ErrorKind::InvalidAuthorization));
}

#[tokio::test]
async fn test_unknown_backend_is_connectivity_error() {
    let app = create_app_with(Config::default());
    let (status, body) = call(
        &app,
        Method::POST,
        "/connection",
        Some(json!({ "url": "oracle:thin:@db:1521" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["ancestry"][0], "ConnectivityError");
}

// ============================================================================
// Permissions
// ============================================================================

#[tokio::test]
async fn test_rule_limits_statement_kinds() {
    let (driver, _) = client_for(create_app_with(secured_config()));
    let conn = driver.connect(&login("reader", "pages")).await.unwrap();
    let stmt = conn.create_statement().await.unwrap();

    let mut rs = stmt.execute_query(Some("SELECT 1")).await.unwrap();
    assert!(rs.next().await.unwrap());

    let err = stmt
        .execute_update(Some("CREATE TABLE t (i INTEGER)"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = conn
        .prepare_statement("DELETE FROM t")
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn test_unruled_subject_is_unrestricted() {
    let (driver, _) = client_for(create_app_with(secured_config()));
    let conn = driver.connect(&login("ada", "lovelace")).await.unwrap();
    let stmt = conn.create_statement().await.unwrap();
    assert_eq!(
        stmt.execute_update(Some("CREATE TABLE t (i INTEGER)")).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_wildcard_rule_denies_over_http() {
    let mut config = Config::default();
    config.permissions.insert(
        "*".to_string(),
        PermissionRule {
            allow: vec![],
            deny: vec![r"(?i)^\s*drop\b".to_string()],
        },
    );
    let app = create_app_with(config);
    let conn = common::connect(&app).await;
    let (_, stmt) = call(&app, Method::POST, &format!("{}/statement", conn), None).await;
    let stmt = stmt["url"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("{}/update", stmt),
        Some(json!({ "sql": "DROP TABLE anything" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["ancestry"][0], "PermissionDenied");
}
