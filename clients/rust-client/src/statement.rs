use dbridge_core::{EntityDescriptor, ExecuteOutcome, ParameterValue, SqlType, Value};
use reqwest::Method;
use serde_json::json;

use crate::cursor::RemoteCursor;
use crate::error::RemoteResult;
use crate::handle::Handle;

/// What an `execute` call produced.
pub enum Execution {
    ResultSet(RemoteCursor),
    UpdateCount(i64),
}

/// A plain or prepared statement held by the server.
///
/// Plain statements take their SQL on each execution; prepared statements
/// were given it at creation and execute with bound parameters.
pub struct RemoteStatement {
    handle: Handle,
    sql: Option<String>,
}

impl RemoteStatement {
    pub(crate) fn new(handle: Handle) -> Self {
        let sql = handle.descriptor().field("sql");
        Self { handle, sql }
    }

    pub fn url(&self) -> &str {
        self.handle.url()
    }

    /// SQL text of a prepared statement.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        !self.handle.is_open()
    }

    fn cursor(&self, desc: Option<EntityDescriptor>) -> Option<RemoteCursor> {
        desc.map(|d| RemoteCursor::new(self.handle.child(d)))
    }

    pub async fn execute_query(&self, sql: Option<&str>) -> RemoteResult<RemoteCursor> {
        let desc = self.handle.post("query", json!({ "sql": sql })).await?;
        Ok(RemoteCursor::new(self.handle.child(desc)))
    }

    pub async fn execute_update(&self, sql: Option<&str>) -> RemoteResult<i64> {
        self.handle.post("update", json!({ "sql": sql })).await
    }

    pub async fn execute(&self, sql: Option<&str>) -> RemoteResult<Execution> {
        let outcome = self.handle.post("execute", json!({ "sql": sql })).await?;
        Ok(match outcome {
            ExecuteOutcome::ResultSet { cursor } => {
                Execution::ResultSet(RemoteCursor::new(self.handle.child(cursor)))
            }
            ExecuteOutcome::UpdateCount { count } => Execution::UpdateCount(count),
        })
    }

    /// The cursor produced by the last `execute`, if any.
    pub async fn result_set(&self) -> RemoteResult<Option<RemoteCursor>> {
        Ok(self.cursor(self.handle.get("resultset").await?))
    }

    pub async fn update_count(&self) -> RemoteResult<i64> {
        self.handle.get("updatecount").await
    }

    pub async fn add_batch(&self, sql: Option<&str>) -> RemoteResult<()> {
        self.handle
            .raw(Method::POST, "batch", Some(json!({ "sql": sql })))
            .await?;
        Ok(())
    }

    pub async fn clear_batch(&self) -> RemoteResult<()> {
        self.handle.send(Method::DELETE, "batch").await
    }

    pub async fn execute_batch(&self) -> RemoteResult<Vec<i64>> {
        self.handle.post("executebatch", ()).await
    }

    /// Binds a value at a 1-based index, with the type the backend should see.
    pub async fn set_parameter_as(
        &self,
        index: usize,
        value: impl Into<Value>,
        declared: Option<SqlType>,
    ) -> RemoteResult<()> {
        let param = ParameterValue {
            index,
            value: value.into(),
            declared,
        };
        self.handle.put("parameter", param).await
    }

    pub async fn set_parameter(&self, index: usize, value: impl Into<Value>) -> RemoteResult<()> {
        self.set_parameter_as(index, value, None).await
    }

    pub async fn set_null(&self, index: usize) -> RemoteResult<()> {
        self.set_parameter_as(index, Value::Null, None).await
    }

    pub async fn clear_parameters(&self) -> RemoteResult<()> {
        self.handle.send(Method::DELETE, "parameters").await
    }

    pub async fn generated_keys(&self) -> RemoteResult<Option<RemoteCursor>> {
        Ok(self.cursor(self.handle.get("generatedkeys").await?))
    }

    /// Asks the server to interrupt the statement's running execution.
    pub async fn cancel(&self) -> RemoteResult<()> {
        self.handle.send(Method::POST, "cancel").await
    }

    pub async fn query_timeout(&self) -> RemoteResult<u32> {
        self.handle.get("querytimeout").await
    }

    pub async fn set_query_timeout(&self, seconds: u32) -> RemoteResult<()> {
        self.handle.put("querytimeout", seconds).await
    }

    pub async fn max_rows(&self) -> RemoteResult<usize> {
        self.handle.get("maxrows").await
    }

    pub async fn set_max_rows(&self, rows: usize) -> RemoteResult<()> {
        self.handle.put("maxrows", rows).await
    }

    pub async fn close(&self) -> RemoteResult<()> {
        self.handle.close().await
    }
}
