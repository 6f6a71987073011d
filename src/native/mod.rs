//! Capability surface of a native database driver.
//!
//! The registry and the HTTP handlers only ever talk to these traits; the
//! concrete backend behind them is chosen by URL at connect time.

pub mod memory;
pub mod sqlite;

use dbridge_core::{
    CoercionError, DatabaseInfo, ErrorKind, LargeObject, LobKind, ResultMetadata, Savepoint, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub use memory::{MemoryArray, MemoryCursor, MemoryLob};
pub use sqlite::SqliteDriver;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct NativeError {
    pub kind: ErrorKind,
    /// Backend specific type name, sent in front of the kind's ancestry.
    pub leaf: Option<String>,
    pub message: String,
}

pub type NativeResult<T> = Result<T, NativeError>;

impl NativeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            leaf: None,
            message: message.into(),
        }
    }

    pub fn with_leaf(leaf: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            leaf: Some(leaf.into()),
            message: message.into(),
        }
    }

    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedOperation,
            format!("{} is not supported by this backend", operation),
        )
    }

    pub fn closed(what: &str) -> Self {
        Self::new(ErrorKind::Database, format!("{} is closed", what))
    }
}

impl From<CoercionError> for NativeError {
    fn from(err: CoercionError) -> Self {
        NativeError::new(err.kind(), err.to_string())
    }
}

pub trait NativeDriver: Send + Sync {
    fn name(&self) -> &str;

    fn accepts_url(&self, url: &str) -> bool;

    fn connect(
        &self,
        url: &str,
        properties: &BTreeMap<String, String>,
    ) -> NativeResult<Box<dyn NativeConnection>>;
}

pub trait NativeConnection: Send {
    fn create_statement(&mut self) -> NativeResult<Box<dyn NativeStatement>>;

    fn prepare(&mut self, sql: &str, generated_keys: bool) -> NativeResult<Box<dyn NativeStatement>>;

    fn native_sql(&self, sql: &str) -> NativeResult<String> {
        Ok(sql.to_string())
    }

    fn auto_commit(&self) -> NativeResult<bool>;

    fn set_auto_commit(&mut self, enabled: bool) -> NativeResult<()>;

    fn commit(&mut self) -> NativeResult<()>;

    fn rollback(&mut self, savepoint: Option<&Savepoint>) -> NativeResult<()>;

    fn set_savepoint(&mut self, name: Option<&str>) -> NativeResult<Savepoint>;

    fn release_savepoint(&mut self, savepoint: &Savepoint) -> NativeResult<()>;

    fn read_only(&self) -> NativeResult<bool>;

    fn set_read_only(&mut self, read_only: bool) -> NativeResult<()>;

    fn transaction_isolation(&self) -> NativeResult<i32>;

    fn set_transaction_isolation(&mut self, level: i32) -> NativeResult<()>;

    fn database_info(&self) -> NativeResult<DatabaseInfo>;

    /// Tables and views whose name matches a SQL `LIKE` pattern.
    fn tables(&mut self, pattern: Option<&str>) -> NativeResult<Box<dyn NativeCursor>>;

    /// Columns of matching tables, one row per column in declaration order.
    fn columns(
        &mut self,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> NativeResult<Box<dyn NativeCursor>>;

    /// Primary key columns of a table, ordered by key sequence.
    fn primary_keys(&mut self, table: &str) -> NativeResult<Box<dyn NativeCursor>>;

    /// Foreign key columns of a table and the columns they reference.
    fn imported_keys(&mut self, table: &str) -> NativeResult<Box<dyn NativeCursor>>;

    /// Type names the backend understands with their wire type codes.
    fn type_info(&mut self) -> NativeResult<Box<dyn NativeCursor>>;

    fn schemas(&mut self) -> NativeResult<Box<dyn NativeCursor>>;

    fn catalogs(&mut self) -> NativeResult<Box<dyn NativeCursor>>;

    fn create_lob(&mut self, kind: LobKind) -> NativeResult<Box<dyn NativeLob>> {
        Ok(Box::new(MemoryLob::new(match kind {
            LobKind::Blob => LargeObject::blob(Vec::new()),
            LobKind::Clob => LargeObject::clob(""),
            LobKind::NClob => LargeObject::nclob(""),
        })))
    }

    fn create_array(
        &mut self,
        type_name: &str,
        elements: Vec<Value>,
    ) -> NativeResult<Box<dyn NativeArray>> {
        Ok(Box::new(MemoryArray::new(type_name, elements)))
    }

    fn is_valid(&mut self) -> bool;

    fn close(&mut self) -> NativeResult<()>;
}

/// Interrupts a running statement from another thread.
pub trait Canceller: Send + Sync {
    fn cancel(&self);
}

/// A plain or prepared statement. Prepared statements carry their SQL and
/// ignore the `sql` argument of execution calls.
pub trait NativeStatement: Send {
    fn sql(&self) -> Option<&str>;

    fn execute_query(&mut self, sql: Option<&str>) -> NativeResult<Box<dyn NativeCursor>>;

    fn execute_update(&mut self, sql: Option<&str>) -> NativeResult<i64>;

    /// Returns true when the statement produced a result set.
    fn execute(&mut self, sql: Option<&str>) -> NativeResult<bool>;

    /// The pending result set of the last `execute`, consumed on read.
    fn result_set(&mut self) -> NativeResult<Option<Box<dyn NativeCursor>>>;

    fn update_count(&self) -> i64;

    fn set_parameter(&mut self, index: usize, value: Value) -> NativeResult<()>;

    fn clear_parameters(&mut self);

    fn add_batch(&mut self, sql: Option<&str>) -> NativeResult<()>;

    fn clear_batch(&mut self);

    fn execute_batch(&mut self) -> NativeResult<Vec<i64>>;

    fn generated_keys(&mut self) -> NativeResult<Option<Box<dyn NativeCursor>>>;

    fn canceller(&self) -> Option<Arc<dyn Canceller>>;

    fn query_timeout(&self) -> u32;

    fn set_query_timeout(&mut self, seconds: u32);

    fn max_rows(&self) -> usize;

    fn set_max_rows(&mut self, rows: usize);

    fn close(&mut self) -> NativeResult<()>;
}

/// A cell as read from a cursor. Large objects and arrays become entities of
/// their own when they reach the client.
pub enum Cell {
    Value(Value),
    Lob(Box<dyn NativeLob>),
    Array(Box<dyn NativeArray>),
}

/// Scrollable cursor. Rows and columns are 1-based.
pub trait NativeCursor: Send {
    fn metadata(&self) -> &ResultMetadata;

    fn next(&mut self) -> NativeResult<bool>;

    fn previous(&mut self) -> NativeResult<bool>;

    fn first(&mut self) -> NativeResult<bool>;

    fn last(&mut self) -> NativeResult<bool>;

    fn absolute(&mut self, row: i64) -> NativeResult<bool>;

    fn relative(&mut self, rows: i64) -> NativeResult<bool>;

    fn before_first(&mut self) -> NativeResult<()>;

    fn after_last(&mut self) -> NativeResult<()>;

    /// Current row number, 0 when not on a row.
    fn row(&self) -> usize;

    fn is_before_first(&self) -> bool;

    fn is_after_last(&self) -> bool;

    /// Reads a cell of the current row and records whether it was null.
    fn cell(&mut self, column: usize) -> NativeResult<Cell>;

    fn was_null(&self) -> bool;

    fn fetch_size(&self) -> usize;

    fn set_fetch_size(&mut self, rows: usize);

    fn close(&mut self) -> NativeResult<()>;
}

/// Binary or character large object. Positions are 1-based; lengths count
/// bytes for binary objects and characters for character objects.
pub trait NativeLob: Send {
    fn kind(&self) -> LobKind;

    fn length(&self) -> NativeResult<u64>;

    /// Bytes, or the UTF-8 encoding of characters, starting at `pos`.
    fn read(&self, pos: u64, len: usize) -> NativeResult<Vec<u8>>;

    fn position(&self, pattern: &[u8], start: u64) -> NativeResult<Option<u64>>;

    fn write(&mut self, pos: u64, data: &[u8]) -> NativeResult<usize>;

    fn truncate(&mut self, len: u64) -> NativeResult<()>;

    fn reader(&self) -> NativeResult<Box<dyn NativeInputStream>>;

    fn writer(&mut self, pos: u64) -> NativeResult<Box<dyn NativeOutputStream>>;

    fn snapshot(&self) -> NativeResult<LargeObject>;

    fn free(&mut self) -> NativeResult<()>;
}

pub trait NativeArray: Send {
    fn base_type_name(&self) -> &str;

    fn elements(&self) -> NativeResult<Vec<Value>>;

    /// Cursor with `INDEX` and `VALUE` columns over the elements.
    fn result_set(&self) -> NativeResult<Box<dyn NativeCursor>>;

    fn free(&mut self) -> NativeResult<()>;
}

pub trait NativeInputStream: Send {
    /// Up to `max` bytes; empty at end of stream.
    fn read(&mut self, max: usize) -> NativeResult<Vec<u8>>;

    fn available(&self) -> NativeResult<usize>;

    fn skip(&mut self, n: u64) -> NativeResult<u64>;

    fn close(&mut self) -> NativeResult<()>;
}

pub trait NativeOutputStream: Send {
    fn write(&mut self, data: &[u8]) -> NativeResult<()>;

    fn flush(&mut self) -> NativeResult<()>;

    fn close(&mut self) -> NativeResult<()>;
}

/// Drivers known to the server, picked by URL.
#[derive(Clone, Default)]
pub struct DriverSet {
    drivers: Vec<Arc<dyn NativeDriver>>,
}

impl DriverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        Self::new().with(Arc::new(SqliteDriver))
    }

    pub fn with(mut self, driver: Arc<dyn NativeDriver>) -> Self {
        self.drivers.push(driver);
        self
    }

    pub fn find(&self, url: &str) -> Option<Arc<dyn NativeDriver>> {
        self.drivers.iter().find(|d| d.accepts_url(url)).cloned()
    }

    pub fn accepts(&self, url: &str) -> bool {
        self.find(url).is_some()
    }
}
