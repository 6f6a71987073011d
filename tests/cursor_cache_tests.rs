//! Cursor State Machine Tests
//!
//! Checks that the client serves column reads from the row snapshot:
//! - No round trips for cached reads or out-of-range indices
//! - Invalidation on every positioning call
//! - Fallback to server reads when no snapshot exists
//! - No cached reads once the cursor or an ancestor is closed

mod common;

use common::{create_test_app, open_client, open_client_with, run_sql};
use dbridge_core::ErrorKind;
use std::collections::BTreeMap;

async fn seeded() -> (dbridge_client::RemoteConnection, std::sync::Arc<common::RouterTransport>) {
    let (conn, transport) = open_client(create_test_app()).await;
    run_sql(
        &conn,
        &[
            "CREATE TABLE t (a INTEGER, b VARCHAR(10), c DOUBLE)",
            "INSERT INTO t VALUES (1, 'one', 1.5)",
            "INSERT INTO t VALUES (2, 'two', 2.5)",
            "INSERT INTO t VALUES (3, NULL, 3.5)",
        ],
    )
    .await;
    (conn, transport)
}

#[tokio::test]
async fn test_cached_reads_cost_no_round_trip() {
    let (conn, transport) = seeded().await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query(Some("SELECT a, b, c FROM t ORDER BY a"))
        .await
        .unwrap();

    assert!(rs.next().await.unwrap());
    let after_move = transport.calls();

    assert_eq!(rs.get_int(1).await.unwrap(), 1);
    assert_eq!(rs.get_string(2).await.unwrap().as_deref(), Some("one"));
    assert_eq!(rs.get_double(3).await.unwrap(), 1.5);
    assert_eq!(rs.get_string("B").await.unwrap().as_deref(), Some("one"));

    let err = rs.get_int(99).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidColumn);
    assert!(err.to_string().contains("99"));

    assert_eq!(transport.calls(), after_move);
}

#[tokio::test]
async fn test_one_round_trip_per_row() {
    let (conn, transport) = seeded().await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query(Some("SELECT a, b, c FROM t ORDER BY a"))
        .await
        .unwrap();

    let before = transport.calls();
    let mut sum = 0;
    while rs.next().await.unwrap() {
        sum += rs.get_int(1).await.unwrap();
        rs.get_string(2).await.unwrap();
        rs.get_double(3).await.unwrap();
    }
    assert_eq!(sum, 6);
    // three rows plus the final move off the end
    assert_eq!(transport.calls() - before, 4);
}

#[tokio::test]
async fn test_positioning_replaces_snapshot() {
    let (conn, _) = seeded().await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query(Some("SELECT a, b FROM t ORDER BY a"))
        .await
        .unwrap();

    assert!(rs.last().await.unwrap());
    assert_eq!(rs.get_int(1).await.unwrap(), 3);
    assert!(rs.get_string(2).await.unwrap().is_none());
    assert!(rs.was_null());

    assert!(rs.absolute(2).await.unwrap());
    assert!(!rs.was_null());
    assert_eq!(rs.get_int(1).await.unwrap(), 2);

    assert!(rs.relative(-1).await.unwrap());
    assert_eq!(rs.get_int(1).await.unwrap(), 1);

    assert!(!rs.previous().await.unwrap());
    assert!(rs.cached_row().is_none());
    assert!(rs.is_before_first().await.unwrap());
}

#[tokio::test]
async fn test_null_reads_zero_and_flag() {
    let (conn, _) = seeded().await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query(Some("SELECT b FROM t WHERE a = 3"))
        .await
        .unwrap();
    assert!(rs.next().await.unwrap());
    assert_eq!(rs.get_int(1).await.unwrap(), 0);
    assert!(rs.was_null());
}

#[tokio::test]
async fn test_reads_without_snapshot_go_to_server() {
    let (conn, transport) = seeded().await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query(Some("SELECT a, b FROM t ORDER BY a"))
        .await
        .unwrap();
    assert!(rs.next().await.unwrap());

    // Server cursor moves off the rows; a server read then has no row.
    rs.before_first().await.unwrap();
    assert!(rs.cached_row().is_none());
    let err = rs.get_int(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataError);

    assert!(rs.first().await.unwrap());
    let before = transport.calls();
    assert_eq!(rs.row().await.unwrap(), 1);
    assert_eq!(transport.calls() - before, 1);
}

#[tokio::test]
async fn test_metadata_is_cached_from_descriptor() {
    let (conn, transport) = seeded().await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query(Some("SELECT a, b FROM t"))
        .await
        .unwrap();

    let before = transport.calls();
    let metadata = rs.metadata().await.unwrap();
    assert_eq!(metadata.column_count(), 2);
    assert_eq!(rs.find_column("b").await.unwrap(), 2);
    assert_eq!(
        rs.find_column("missing").await.unwrap_err().kind(),
        ErrorKind::InvalidColumn
    );
    assert_eq!(transport.calls(), before);
}

#[tokio::test]
async fn test_closed_statement_stops_cached_reads() {
    let (conn, transport) = seeded().await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query(Some("SELECT a FROM t ORDER BY a"))
        .await
        .unwrap();
    assert!(rs.next().await.unwrap());
    assert_eq!(rs.get_int(1).await.unwrap(), 1);

    stmt.close().await.unwrap();
    let before = transport.calls();
    let err = rs.get_int(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReferenceNotFound);
    assert_eq!(
        rs.metadata().await.err().unwrap().kind(),
        ErrorKind::ReferenceNotFound
    );
    assert_eq!(transport.calls(), before);
}

#[tokio::test]
async fn test_closed_cursor_stops_cached_reads() {
    let (conn, _) = seeded().await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query(Some("SELECT b FROM t ORDER BY a"))
        .await
        .unwrap();
    assert!(rs.next().await.unwrap());

    rs.close().await.unwrap();
    assert!(rs.is_closed());
    let err = rs.get_string(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReferenceNotFound);
}

#[tokio::test]
async fn test_partial_blob_from_row_refuses_bytes() {
    let properties: BTreeMap<String, String> =
        [("blobable".to_string(), "string.".to_string())].into();
    let (conn, transport) = open_client_with(create_test_app(), properties).await;
    run_sql(
        &conn,
        &["CREATE TABLE t (s VARCHAR(10))", "INSERT INTO t VALUES ('hello')"],
    )
    .await;
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt.execute_query(Some("SELECT s FROM t")).await.unwrap();
    assert!(rs.next().await.unwrap());

    let before = transport.calls();
    let blob = rs.get_blob(1).await.unwrap().expect("blob");
    assert!(!blob.is_remote());
    assert_eq!(blob.length().await.unwrap(), 5);
    let err = blob.bytes(1, 5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Coercion);
    assert!(err.is_a(ErrorKind::DataError));
    // the lob was synthesized from the cached row
    assert_eq!(transport.calls(), before);

    assert_eq!(rs.get_bytes(1).await.unwrap().as_deref(), Some(&b"hello"[..]));
}
