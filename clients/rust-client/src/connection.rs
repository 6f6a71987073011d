use dbridge_core::{
    CoercionEngine, ConnectRequest, ConversionPolicy, DatabaseInfo, EntityDescriptor, EntityKind,
    LobKind, Savepoint, Value,
};
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;

use crate::array::RemoteArray;
use crate::cursor::RemoteCursor;
use crate::error::{RemoteError, RemoteResult};
use crate::handle::Handle;
use crate::lob::RemoteLob;
use crate::statement::RemoteStatement;
use crate::transport::Transport;

/// Root proxy of a remote session.
///
/// The session's conversion policy arrives with the connection descriptor and
/// drives every local coercion made by proxies created from this connection.
pub struct RemoteConnection {
    handle: Handle,
    backend: String,
}

impl RemoteConnection {
    pub(crate) async fn open(transport: Arc<dyn Transport>, request: &ConnectRequest) -> RemoteResult<Self> {
        let body = serde_json::to_value(request)?;
        let desc: EntityDescriptor =
            serde_json::from_value(transport.call(Method::POST, "/connection", Some(body)).await?)?;
        if desc.kind != EntityKind::Connection {
            return Err(RemoteError::Protocol(format!(
                "expected a connection, got a {}",
                desc.kind
            )));
        }

        let policy: ConversionPolicy = desc.field("policy").unwrap_or_default();
        let backend = desc.field("backend").unwrap_or_default();
        let engine = Arc::new(CoercionEngine::new(policy)?);
        tracing::debug!("Opened {} on {}", desc.url, backend);

        Ok(Self {
            handle: Handle::root(desc, transport, engine),
            backend,
        })
    }

    pub fn url(&self) -> &str {
        self.handle.url()
    }

    /// Name of the server-side backend (`sqlite`, ...).
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn policy(&self) -> &ConversionPolicy {
        self.handle.engine().policy()
    }

    pub fn is_closed(&self) -> bool {
        !self.handle.is_open()
    }

    pub async fn create_statement(&self) -> RemoteResult<RemoteStatement> {
        let desc = self.handle.post("statement", ()).await?;
        Ok(RemoteStatement::new(self.handle.child(desc)))
    }

    pub async fn prepare_statement(&self, sql: &str) -> RemoteResult<RemoteStatement> {
        self.prepare(sql, false).await
    }

    /// Prepares a statement whose executions report generated keys.
    pub async fn prepare_statement_with_keys(&self, sql: &str) -> RemoteResult<RemoteStatement> {
        self.prepare(sql, true).await
    }

    async fn prepare(&self, sql: &str, generated_keys: bool) -> RemoteResult<RemoteStatement> {
        let desc = self
            .handle
            .post(
                "prepared-statement",
                json!({ "sql": sql, "generated_keys": generated_keys }),
            )
            .await?;
        Ok(RemoteStatement::new(self.handle.child(desc)))
    }

    pub async fn auto_commit(&self) -> RemoteResult<bool> {
        self.handle.get("autocommit").await
    }

    pub async fn set_auto_commit(&self, enabled: bool) -> RemoteResult<()> {
        self.handle.put("autocommit", enabled).await
    }

    pub async fn commit(&self) -> RemoteResult<()> {
        self.handle.send(Method::POST, "commit").await
    }

    pub async fn rollback(&self) -> RemoteResult<()> {
        self.handle.send(Method::POST, "rollback").await
    }

    pub async fn rollback_to(&self, savepoint: &Savepoint) -> RemoteResult<()> {
        self.handle
            .raw(Method::POST, "rollback", Some(serde_json::to_value(savepoint)?))
            .await?;
        Ok(())
    }

    pub async fn set_savepoint(&self, name: Option<&str>) -> RemoteResult<Savepoint> {
        self.handle.post("savepoint", name).await
    }

    pub async fn release_savepoint(&self, savepoint: &Savepoint) -> RemoteResult<()> {
        self.handle
            .send(Method::DELETE, &format!("savepoint/{}", savepoint.id))
            .await
    }

    pub async fn is_read_only(&self) -> RemoteResult<bool> {
        self.handle.get("readonly").await
    }

    pub async fn set_read_only(&self, read_only: bool) -> RemoteResult<()> {
        self.handle.put("readonly", read_only).await
    }

    pub async fn transaction_isolation(&self) -> RemoteResult<i32> {
        self.handle.get("isolation").await
    }

    pub async fn set_transaction_isolation(&self, level: i32) -> RemoteResult<()> {
        self.handle.put("isolation", level).await
    }

    pub async fn metadata(&self) -> RemoteResult<DatabaseInfo> {
        self.handle.get("metadata").await
    }

    async fn catalog(&self, name: &str, params: &[(&str, Option<&str>)]) -> RemoteResult<RemoteCursor> {
        let query: Vec<String> = params
            .iter()
            .filter_map(|(key, value)| value.map(|v| format!("{}={}", key, encode_query(v))))
            .collect();
        let action = if query.is_empty() {
            format!("metadata/{}", name)
        } else {
            format!("metadata/{}?{}", name, query.join("&"))
        };
        let desc = self.handle.post(&action, ()).await?;
        Ok(RemoteCursor::new(self.handle.child(desc)))
    }

    /// Cursor over the tables whose name matches a SQL `LIKE` pattern.
    pub async fn tables(&self, pattern: Option<&str>) -> RemoteResult<RemoteCursor> {
        self.catalog("tables", &[("pattern", pattern)]).await
    }

    /// Cursor over the columns of matching tables. Both arguments are `LIKE`
    /// patterns.
    pub async fn columns(
        &self,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> RemoteResult<RemoteCursor> {
        self.catalog("columns", &[("table", table_pattern), ("column", column_pattern)])
            .await
    }

    pub async fn primary_keys(&self, table: &str) -> RemoteResult<RemoteCursor> {
        self.catalog("primarykeys", &[("table", Some(table))]).await
    }

    pub async fn imported_keys(&self, table: &str) -> RemoteResult<RemoteCursor> {
        self.catalog("importedkeys", &[("table", Some(table))]).await
    }

    pub async fn type_info(&self) -> RemoteResult<RemoteCursor> {
        self.catalog("typeinfo", &[]).await
    }

    pub async fn schemas(&self) -> RemoteResult<RemoteCursor> {
        self.catalog("schemas", &[]).await
    }

    pub async fn catalogs(&self) -> RemoteResult<RemoteCursor> {
        self.catalog("catalogs", &[]).await
    }

    pub async fn native_sql(&self, sql: &str) -> RemoteResult<String> {
        self.handle.post("nativesql", sql).await
    }

    pub async fn is_valid(&self) -> RemoteResult<bool> {
        self.handle.get("valid").await
    }

    async fn create_lob(&self, kind: LobKind) -> RemoteResult<RemoteLob> {
        let action = match kind {
            LobKind::Blob => "blob",
            LobKind::Clob => "clob",
            LobKind::NClob => "nclob",
        };
        let desc = self.handle.post(action, ()).await?;
        Ok(RemoteLob::remote(self.handle.child(desc)))
    }

    pub async fn create_blob(&self) -> RemoteResult<RemoteLob> {
        self.create_lob(LobKind::Blob).await
    }

    pub async fn create_clob(&self) -> RemoteResult<RemoteLob> {
        self.create_lob(LobKind::Clob).await
    }

    pub async fn create_nclob(&self) -> RemoteResult<RemoteLob> {
        self.create_lob(LobKind::NClob).await
    }

    pub async fn create_array(&self, type_name: &str, elements: Vec<Value>) -> RemoteResult<RemoteArray> {
        let desc = self
            .handle
            .post("array", json!({ "type_name": type_name, "elements": elements }))
            .await?;
        Ok(RemoteArray::remote(self.handle.child(desc)))
    }

    /// Closes the session; every proxy created from it becomes unusable.
    pub async fn close(&self) -> RemoteResult<()> {
        self.handle.close().await
    }
}

/// Percent-encodes a query parameter value.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
