//! Value Coercion Tests
//!
//! Column reads through the client under default and overridden policies.

mod common;

use axum::http::{Method, StatusCode};
use chrono::NaiveDate;
use common::{call, connect, create_test_app, open_client, open_client_with, run_sql};
use dbridge_client::RemoteConnection;
use dbridge_core::{ErrorKind, LobKind};
use serde_json::json;
use std::collections::BTreeMap;

fn properties(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn single_row(conn: &RemoteConnection, ddl: &str, insert: &str, select: &str) -> dbridge_client::RemoteCursor {
    run_sql(conn, &[ddl, insert]).await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt.execute_query(Some(select)).await.unwrap();
    assert!(rs.next().await.unwrap());
    rs
}

// ============================================================================
// Numbers
// ============================================================================

#[tokio::test]
async fn test_narrowing_out_of_range_fails() {
    let (conn, _) = open_client(create_test_app()).await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (i INTEGER)",
        "INSERT INTO t VALUES (300)",
        "SELECT i FROM t",
    )
    .await;

    assert_eq!(rs.get_short(1).await.unwrap(), 300);
    let err = rs.get_byte(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Coercion);
    assert!(err.is_a(ErrorKind::DataError));
}

#[tokio::test]
async fn test_server_read_reports_coercion_status() {
    let app = create_test_app();
    let conn = connect(&app).await;
    let (_, stmt) = call(&app, Method::POST, &format!("{}/statement", conn), None).await;
    let stmt = stmt["url"].as_str().unwrap().to_string();
    let (_, cursor) = call(
        &app,
        Method::POST,
        &format!("{}/query", stmt),
        Some(json!({ "sql": "SELECT 300 AS big" })),
    )
    .await;
    let cursor = cursor["url"].as_str().unwrap().to_string();
    call(&app, Method::POST, &format!("{}/nextrow", cursor), None).await;

    let (status, body) = call(&app, Method::GET, &format!("{}/byte/index/1", cursor), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["ancestry"][0], "CoercionError");
}

#[tokio::test]
async fn test_float_to_int_rounding_modes() {
    for (mode, positive, negative) in [
        ("truncate", 2, -2),
        ("nearest", 3, -3),
        ("floor", 2, -3),
        ("ceiling", 3, -2),
    ] {
        let (conn, _) =
            open_client_with(create_test_app(), properties(&[("floatToInt", mode)])).await;
        let mut rs = single_row(
            &conn,
            "CREATE TABLE t (p DOUBLE, n DOUBLE)",
            "INSERT INTO t VALUES (2.5, -2.5)",
            "SELECT p, n FROM t",
        )
        .await;
        assert_eq!(rs.get_int(1).await.unwrap(), positive, "{}", mode);
        assert_eq!(rs.get_int(2).await.unwrap(), negative, "{}", mode);
    }
}

#[tokio::test]
async fn test_numeric_text_parses() {
    let (conn, _) = open_client(create_test_app()).await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (s VARCHAR(10))",
        "INSERT INTO t VALUES ('17')",
        "SELECT s FROM t",
    )
    .await;
    assert_eq!(rs.get_long(1).await.unwrap(), 17);
    assert_eq!(rs.get_double(1).await.unwrap(), 17.0);
}

// ============================================================================
// Booleans
// ============================================================================

#[tokio::test]
async fn test_boolean_reads() {
    let (conn, _) = open_client(create_test_app()).await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (b BOOLEAN)",
        "INSERT INTO t VALUES (1)",
        "SELECT b FROM t",
    )
    .await;

    assert!(rs.get_boolean(1).await.unwrap());
    assert_eq!(rs.get_int(1).await.unwrap(), 1);
    assert_eq!(rs.get_string(1).await.unwrap().as_deref(), Some("TRUE"));
}

#[tokio::test]
async fn test_boolean_literals_and_number_policy() {
    let props = properties(&[
        ("booleanLiterals", "no,yes"),
        ("booleanToNumber", "false"),
        ("numberToBoolean", "positive"),
    ]);
    let (conn, _) = open_client_with(create_test_app(), props).await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (b BOOLEAN, n INTEGER)",
        "INSERT INTO t VALUES (0, -4)",
        "SELECT b, n FROM t",
    )
    .await;

    assert_eq!(rs.get_string(1).await.unwrap().as_deref(), Some("no"));
    assert_eq!(rs.get_int(1).await.unwrap_err().kind(), ErrorKind::Coercion);
    assert!(!rs.get_boolean(2).await.unwrap());
}

// ============================================================================
// Large objects
// ============================================================================

#[tokio::test]
async fn test_text_as_blob_needs_policy() {
    let (conn, _) = open_client(create_test_app()).await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (s VARCHAR(10))",
        "INSERT INTO t VALUES ('hello')",
        "SELECT s FROM t",
    )
    .await;
    assert_eq!(rs.get_blob(1).await.err().unwrap().kind(), ErrorKind::Coercion);

    let clob = rs.get_clob(1).await.unwrap().expect("clob");
    assert_eq!(clob.kind(), LobKind::Clob);
    assert!(!clob.is_remote());
    assert_eq!(clob.text().await.unwrap(), "hello");
}

#[tokio::test]
async fn test_partial_blob_knows_only_length() {
    let (conn, _) =
        open_client_with(create_test_app(), properties(&[("blobable", "string.")])).await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (s VARCHAR(10))",
        "INSERT INTO t VALUES ('hello')",
        "SELECT s FROM t",
    )
    .await;

    let blob = rs.get_blob(1).await.unwrap().expect("blob");
    assert_eq!(blob.length().await.unwrap(), 5);
    assert_eq!(blob.bytes(1, 2).await.unwrap_err().kind(), ErrorKind::Coercion);
}

#[tokio::test]
async fn test_null_blob_depends_on_mode() {
    let (conn, _) =
        open_client_with(create_test_app(), properties(&[("blobable", "string")])).await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (s VARCHAR(10))",
        "INSERT INTO t VALUES (NULL)",
        "SELECT s FROM t",
    )
    .await;

    let blob = rs.get_blob(1).await.unwrap().expect("empty blob");
    assert_eq!(blob.length().await.unwrap(), 0);
    assert!(rs.was_null());
}

// ============================================================================
// Temporal values
// ============================================================================

#[tokio::test]
async fn test_timestamp_rendering_and_projection() {
    let (conn, _) = open_client(create_test_app()).await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (ts TIMESTAMP)",
        "INSERT INTO t VALUES ('2024-01-02 03:04:05.250')",
        "SELECT ts FROM t",
    )
    .await;

    assert_eq!(
        rs.get_string(1).await.unwrap().as_deref(),
        Some("2024-01-02 03:04:05.25")
    );
    assert_eq!(
        rs.get_date(1).await.unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 2)
    );
    let millis = rs.get_long(1).await.unwrap();
    assert_eq!(millis % 1000, 250);
}

#[tokio::test]
async fn test_timestamp_without_millis() {
    let (conn, _) = open_client_with(
        create_test_app(),
        properties(&[("timestampWithMillis", "false")]),
    )
    .await;
    let mut rs = single_row(
        &conn,
        "CREATE TABLE t (ts TIMESTAMP)",
        "INSERT INTO t VALUES ('2024-01-02 03:04:05.250')",
        "SELECT ts FROM t",
    )
    .await;
    assert_eq!(
        rs.get_string(1).await.unwrap().as_deref(),
        Some("2024-01-02 03:04:05")
    );
}

#[tokio::test]
async fn test_bad_property_rejects_connect() {
    let (driver, _) = common::client_for(create_test_app());
    let request = dbridge_core::ConnectRequest {
        url: Some(common::MEMORY_URL.to_string()),
        properties: properties(&[("floatToInt", "sideways")]),
        ..Default::default()
    };
    assert!(driver.connect(&request).await.is_err());
}
