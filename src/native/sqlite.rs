//! SQLite backend over `rusqlite`.
//!
//! URLs look like `sqlite::memory:` or `sqlite:/path/to/file.db`. Results are
//! materialized into [`MemoryCursor`]s; declared column types drive how
//! stored values are read back (dates stored as text, `BLOB`/`CLOB` columns as
//! large objects, `ARRAY` columns as JSON text).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use dbridge_core::{
    ColumnMeta, DatabaseInfo, ErrorKind, LargeObject, LobKind, ResultMetadata, Savepoint, Value,
    WireType,
};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::memory::{column, MemoryCursor};
use super::{
    Canceller, NativeConnection, NativeCursor, NativeDriver, NativeError, NativeResult,
    NativeStatement,
};

const URL_PREFIX: &str = "sqlite:";
const READ_UNCOMMITTED: i32 = 1;
const SERIALIZABLE: i32 = 8;

type Shared = Arc<Mutex<rusqlite::Connection>>;

/// Kind of a failure reported by the SQLite library itself.
fn classify(code: &rusqlite::ffi::Error, message: &str) -> ErrorKind {
    match code.code {
        rusqlite::ErrorCode::ConstraintViolation => ErrorKind::ConstraintViolation,
        rusqlite::ErrorCode::OperationInterrupted => ErrorKind::Cancelled,
        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
            ErrorKind::Timeout
        }
        rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase => {
            ErrorKind::Connectivity
        }
        rusqlite::ErrorCode::TypeMismatch | rusqlite::ErrorCode::TooBig => ErrorKind::DataError,
        _ if message.contains("syntax error") || message.starts_with("no such ") => {
            ErrorKind::SyntaxError
        }
        _ => ErrorKind::Database,
    }
}

fn sqlite_failure(code: &rusqlite::ffi::Error, message: String) -> NativeError {
    let kind = classify(code, &message);
    NativeError::with_leaf(format!("SQLITE_{}", code.extended_code), kind, message)
}

impl From<rusqlite::Error> for NativeError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg) => {
                sqlite_failure(code, msg.clone().unwrap_or_else(|| err.to_string()))
            }
            // Statement preparation reports parse errors with the offending offset.
            rusqlite::Error::SqlInputError { error, msg, .. } => sqlite_failure(error, msg.clone()),
            rusqlite::Error::InvalidColumnIndex(_) | rusqlite::Error::InvalidColumnName(_) => {
                NativeError::new(ErrorKind::InvalidColumn, err.to_string())
            }
            rusqlite::Error::InvalidParameterCount(..)
            | rusqlite::Error::InvalidParameterName(_)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::ToSqlConversionFailure(_)
            | rusqlite::Error::FromSqlConversionFailure(..) => {
                NativeError::new(ErrorKind::DataError, err.to_string())
            }
            _ => NativeError::new(ErrorKind::Database, err.to_string()),
        }
    }
}

pub struct SqliteDriver;

impl NativeDriver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with(URL_PREFIX)
    }

    fn connect(
        &self,
        url: &str,
        properties: &BTreeMap<String, String>,
    ) -> NativeResult<Box<dyn NativeConnection>> {
        let path = url.trim_start_matches(URL_PREFIX);
        let conn = if path.is_empty() || path == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(path)
        }
        .map_err(|e| NativeError::new(ErrorKind::Connectivity, format!("{}: {}", url, e)))?;

        if let Some(ms) = properties.get("busyTimeout").and_then(|v| v.parse::<u64>().ok()) {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }

        tracing::debug!("Opened SQLite connection to {}", url);
        Ok(Box::new(SqliteConnection::new(conn, url)))
    }
}

struct InterruptCanceller(rusqlite::InterruptHandle);

impl Canceller for InterruptCanceller {
    fn cancel(&self) {
        self.0.interrupt();
    }
}

pub struct SqliteConnection {
    conn: Shared,
    url: String,
    canceller: Arc<InterruptCanceller>,
    auto_commit: bool,
    isolation: i32,
    next_savepoint: u64,
    closed: bool,
}

impl SqliteConnection {
    fn new(conn: rusqlite::Connection, url: &str) -> Self {
        let canceller = Arc::new(InterruptCanceller(conn.get_interrupt_handle()));
        Self {
            conn: Arc::new(Mutex::new(conn)),
            url: url.to_string(),
            canceller,
            auto_commit: true,
            isolation: SERIALIZABLE,
            next_savepoint: 0,
            closed: false,
        }
    }

    fn check_open(&self) -> NativeResult<()> {
        if self.closed {
            return Err(NativeError::closed("connection"));
        }
        Ok(())
    }

    fn run(&self, sql: &str) -> NativeResult<()> {
        self.check_open()?;
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Re-open a transaction after commit or rollback when auto-commit is off.
    fn restart_transaction(&self) -> NativeResult<()> {
        if !self.auto_commit && self.conn.lock().is_autocommit() {
            self.run("BEGIN")?;
        }
        Ok(())
    }

    /// Rows of a catalog query, each column read as the given wire type.
    fn catalog_rows(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        wires: &[WireType],
    ) -> NativeResult<Vec<Vec<Value>>> {
        self.check_open()?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(wires.len());
            for (i, wire) in wires.iter().enumerate() {
                cells.push(from_sql(row.get_ref(i)?, *wire));
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn statement(&self, sql: Option<String>, generated_keys: bool) -> SqliteStatement {
        SqliteStatement {
            conn: self.conn.clone(),
            sql,
            params: BTreeMap::new(),
            batch: Vec::new(),
            generated_keys,
            last_insert: None,
            update_count: -1,
            pending: None,
            canceller: self.canceller.clone(),
            query_timeout: 0,
            max_rows: 0,
            closed: false,
        }
    }
}

impl NativeConnection for SqliteConnection {
    fn create_statement(&mut self) -> NativeResult<Box<dyn NativeStatement>> {
        self.check_open()?;
        Ok(Box::new(self.statement(None, true)))
    }

    fn prepare(&mut self, sql: &str, generated_keys: bool) -> NativeResult<Box<dyn NativeStatement>> {
        self.check_open()?;
        // Surface syntax errors at prepare time.
        self.conn.lock().prepare(sql)?;
        Ok(Box::new(self.statement(Some(sql.to_string()), generated_keys)))
    }

    fn auto_commit(&self) -> NativeResult<bool> {
        self.check_open()?;
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> NativeResult<()> {
        self.check_open()?;
        let in_transaction = !self.conn.lock().is_autocommit();
        self.auto_commit = enabled;
        if enabled && in_transaction {
            self.run("COMMIT")?;
        } else if !enabled && !in_transaction {
            self.run("BEGIN")?;
        }
        Ok(())
    }

    fn commit(&mut self) -> NativeResult<()> {
        self.check_open()?;
        if !self.conn.lock().is_autocommit() {
            self.run("COMMIT")?;
        }
        self.restart_transaction()
    }

    fn rollback(&mut self, savepoint: Option<&Savepoint>) -> NativeResult<()> {
        self.check_open()?;
        match savepoint {
            Some(sp) => self.run(&format!("ROLLBACK TO SAVEPOINT sp_{}", sp.id)),
            None => {
                if !self.conn.lock().is_autocommit() {
                    self.run("ROLLBACK")?;
                }
                self.restart_transaction()
            }
        }
    }

    fn set_savepoint(&mut self, name: Option<&str>) -> NativeResult<Savepoint> {
        self.check_open()?;
        self.next_savepoint += 1;
        let savepoint = Savepoint {
            id: self.next_savepoint,
            name: name.map(str::to_string),
        };
        self.run(&format!("SAVEPOINT sp_{}", savepoint.id))?;
        Ok(savepoint)
    }

    fn release_savepoint(&mut self, savepoint: &Savepoint) -> NativeResult<()> {
        self.run(&format!("RELEASE SAVEPOINT sp_{}", savepoint.id))
    }

    fn read_only(&self) -> NativeResult<bool> {
        self.check_open()?;
        let on: i64 = self
            .conn
            .lock()
            .query_row("PRAGMA query_only", [], |row| row.get(0))?;
        Ok(on != 0)
    }

    fn set_read_only(&mut self, read_only: bool) -> NativeResult<()> {
        self.run(&format!("PRAGMA query_only = {}", if read_only { "ON" } else { "OFF" }))
    }

    fn transaction_isolation(&self) -> NativeResult<i32> {
        self.check_open()?;
        Ok(self.isolation)
    }

    fn set_transaction_isolation(&mut self, level: i32) -> NativeResult<()> {
        match level {
            READ_UNCOMMITTED => self.run("PRAGMA read_uncommitted = 1")?,
            SERIALIZABLE => self.run("PRAGMA read_uncommitted = 0")?,
            other => {
                return Err(NativeError::new(
                    ErrorKind::UnsupportedOperation,
                    format!("transaction isolation level {} is not supported", other),
                ))
            }
        }
        self.isolation = level;
        Ok(())
    }

    fn database_info(&self) -> NativeResult<DatabaseInfo> {
        Ok(DatabaseInfo {
            product_name: "SQLite".to_string(),
            product_version: rusqlite::version().to_string(),
            driver_name: "dbridge-sqlite".to_string(),
            driver_version: env!("CARGO_PKG_VERSION").to_string(),
            url: self.url.clone(),
            user_name: None,
            read_only: self.read_only()?,
        })
    }

    fn tables(&mut self, pattern: Option<&str>) -> NativeResult<Box<dyn NativeCursor>> {
        self.check_open()?;
        let sql = "SELECT NULL AS TABLE_CAT, NULL AS TABLE_SCHEM, name AS TABLE_NAME, \
                   upper(type) AS TABLE_TYPE FROM sqlite_master \
                   WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' AND name LIKE ?1 \
                   ORDER BY name";
        let mut statement = self.statement(Some(sql.to_string()), false);
        statement.set_parameter(1, Value::String(pattern.unwrap_or("%").to_string()))?;
        statement.execute_query(None)
    }

    fn columns(
        &mut self,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> NativeResult<Box<dyn NativeCursor>> {
        let sql = "SELECT m.name, p.name, p.type, p.\"notnull\", p.dflt_value, p.cid + 1 \
                   FROM sqlite_master m JOIN pragma_table_info(m.name) p \
                   WHERE m.type IN ('table', 'view') AND m.name NOT LIKE 'sqlite_%' \
                   AND m.name LIKE ?1 AND p.name LIKE ?2 \
                   ORDER BY m.name, p.cid";
        let found = self.catalog_rows(
            sql,
            [table_pattern.unwrap_or("%"), column_pattern.unwrap_or("%")],
            &[
                WireType::Varchar,
                WireType::Varchar,
                WireType::Varchar,
                WireType::Integer,
                WireType::Varchar,
                WireType::Integer,
            ],
        )?;

        let rows = found
            .into_iter()
            .map(|cells| {
                let mut cells = cells.into_iter();
                let mut next = || cells.next().unwrap_or(Value::Null);
                let (table, name, decl, not_null, default, position) =
                    (next(), next(), next(), next(), next(), next());
                let decl = match decl {
                    Value::String(s) => s,
                    _ => String::new(),
                };
                vec![
                    Value::Null,
                    Value::Null,
                    table,
                    name,
                    Value::Int(WireType::from_decl(&decl).code() as i64),
                    Value::String(decl.to_uppercase()),
                    Value::Int(if not_null == Value::Int(0) { 1 } else { 0 }),
                    default,
                    position,
                ]
            })
            .collect();
        Ok(catalog_cursor(
            &[
                ("TABLE_CAT", WireType::Varchar),
                ("TABLE_SCHEM", WireType::Varchar),
                ("TABLE_NAME", WireType::Varchar),
                ("COLUMN_NAME", WireType::Varchar),
                ("DATA_TYPE", WireType::Integer),
                ("TYPE_NAME", WireType::Varchar),
                ("NULLABLE", WireType::Integer),
                ("COLUMN_DEF", WireType::Varchar),
                ("ORDINAL_POSITION", WireType::Integer),
            ],
            rows,
        ))
    }

    fn primary_keys(&mut self, table: &str) -> NativeResult<Box<dyn NativeCursor>> {
        let sql = "SELECT NULL, NULL, ?1, p.name, p.pk, NULL \
                   FROM pragma_table_info(?1) p WHERE p.pk > 0 ORDER BY p.pk";
        let rows = self.catalog_rows(
            sql,
            [table],
            &[
                WireType::Varchar,
                WireType::Varchar,
                WireType::Varchar,
                WireType::Varchar,
                WireType::Integer,
                WireType::Varchar,
            ],
        )?;
        Ok(catalog_cursor(
            &[
                ("TABLE_CAT", WireType::Varchar),
                ("TABLE_SCHEM", WireType::Varchar),
                ("TABLE_NAME", WireType::Varchar),
                ("COLUMN_NAME", WireType::Varchar),
                ("KEY_SEQ", WireType::Integer),
                ("PK_NAME", WireType::Varchar),
            ],
            rows,
        ))
    }

    fn imported_keys(&mut self, table: &str) -> NativeResult<Box<dyn NativeCursor>> {
        let sql = "SELECT f.\"table\", f.\"to\", ?1, f.\"from\", f.seq + 1, f.on_update, f.on_delete \
                   FROM pragma_foreign_key_list(?1) f ORDER BY f.id, f.seq";
        let rows = self.catalog_rows(
            sql,
            [table],
            &[
                WireType::Varchar,
                WireType::Varchar,
                WireType::Varchar,
                WireType::Varchar,
                WireType::Integer,
                WireType::Varchar,
                WireType::Varchar,
            ],
        )?;
        Ok(catalog_cursor(
            &[
                ("PKTABLE_NAME", WireType::Varchar),
                ("PKCOLUMN_NAME", WireType::Varchar),
                ("FKTABLE_NAME", WireType::Varchar),
                ("FKCOLUMN_NAME", WireType::Varchar),
                ("KEY_SEQ", WireType::Integer),
                ("UPDATE_RULE", WireType::Varchar),
                ("DELETE_RULE", WireType::Varchar),
            ],
            rows,
        ))
    }

    fn type_info(&mut self) -> NativeResult<Box<dyn NativeCursor>> {
        self.check_open()?;
        let rows = TYPE_NAMES
            .iter()
            .map(|name| {
                vec![
                    Value::String(name.to_string()),
                    Value::Int(WireType::from_decl(name).code() as i64),
                    Value::Int(1),
                ]
            })
            .collect();
        Ok(catalog_cursor(
            &[
                ("TYPE_NAME", WireType::Varchar),
                ("DATA_TYPE", WireType::Integer),
                ("NULLABLE", WireType::Integer),
            ],
            rows,
        ))
    }

    fn schemas(&mut self) -> NativeResult<Box<dyn NativeCursor>> {
        let rows = self.catalog_rows(
            "SELECT name, NULL FROM pragma_database_list ORDER BY seq",
            [],
            &[WireType::Varchar, WireType::Varchar],
        )?;
        Ok(catalog_cursor(
            &[
                ("TABLE_SCHEM", WireType::Varchar),
                ("TABLE_CATALOG", WireType::Varchar),
            ],
            rows,
        ))
    }

    /// SQLite has no catalogs.
    fn catalogs(&mut self) -> NativeResult<Box<dyn NativeCursor>> {
        self.check_open()?;
        Ok(catalog_cursor(&[("TABLE_CAT", WireType::Varchar)], Vec::new()))
    }

    fn is_valid(&mut self) -> bool {
        !self.closed
            && self
                .conn
                .lock()
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok()
    }

    fn close(&mut self) -> NativeResult<()> {
        if !self.closed {
            self.closed = true;
            tracing::debug!("Closed SQLite connection to {}", self.url);
        }
        Ok(())
    }
}

/// Declared type names reported by `type_info`, matching what `from_decl` reads back.
const TYPE_NAMES: &[&str] = &[
    "BOOLEAN", "TINYINT", "SMALLINT", "INTEGER", "BIGINT", "REAL", "DOUBLE", "NUMERIC", "DECIMAL",
    "CHAR", "VARCHAR", "TEXT", "NCHAR", "NVARCHAR", "BINARY", "VARBINARY", "DATE", "TIME",
    "TIMESTAMP", "TIMESTAMPTZ", "BLOB", "CLOB", "NCLOB", "ARRAY",
];

fn catalog_cursor(columns: &[(&str, WireType)], rows: Vec<Vec<Value>>) -> Box<dyn NativeCursor> {
    let metadata = ResultMetadata {
        columns: columns.iter().map(|(name, wire)| column(name, *wire)).collect(),
    };
    Box::new(MemoryCursor::new(metadata, rows))
}

enum Outcome {
    Rows(MemoryCursor),
    Count(i64),
}

pub struct SqliteStatement {
    conn: Shared,
    /// Set for prepared statements.
    sql: Option<String>,
    params: BTreeMap<usize, Value>,
    batch: Vec<(String, BTreeMap<usize, Value>)>,
    generated_keys: bool,
    last_insert: Option<i64>,
    update_count: i64,
    pending: Option<MemoryCursor>,
    canceller: Arc<InterruptCanceller>,
    query_timeout: u32,
    max_rows: usize,
    closed: bool,
}

impl SqliteStatement {
    fn check_open(&self) -> NativeResult<()> {
        if self.closed {
            return Err(NativeError::closed("statement"));
        }
        Ok(())
    }

    fn effective_sql(&self, sql: Option<&str>) -> NativeResult<String> {
        self.sql
            .as_deref()
            .or(sql)
            .map(str::to_string)
            .ok_or_else(|| NativeError::new(ErrorKind::DataError, "no SQL text given"))
    }

    fn run(&mut self, sql: &str, params: &BTreeMap<usize, Value>) -> NativeResult<Outcome> {
        self.check_open()?;
        let bound = params
            .iter()
            .map(|(i, v)| Ok((*i, to_sql(v)?)))
            .collect::<NativeResult<BTreeMap<usize, SqlValue>>>()?;
        let max_rows = self.max_rows;

        let conn = self.conn.lock();
        let timed_out = Arc::new(AtomicBool::new(false));
        if self.query_timeout > 0 {
            let deadline = Instant::now() + Duration::from_secs(self.query_timeout as u64);
            let flag = timed_out.clone();
            conn.progress_handler(
                1000,
                Some(move || {
                    let expired = Instant::now() >= deadline;
                    if expired {
                        flag.store(true, Ordering::SeqCst);
                    }
                    expired
                }),
            );
        }

        let result = execute_on(&conn, sql, &bound, max_rows);

        if self.query_timeout > 0 {
            conn.progress_handler(0, None::<fn() -> bool>);
        }

        let outcome = result.map_err(|e| {
            if timed_out.load(Ordering::SeqCst) {
                NativeError::new(
                    ErrorKind::Timeout,
                    format!("query timeout of {} seconds exceeded", self.query_timeout),
                )
            } else {
                NativeError::from(e)
            }
        })?;

        if let Outcome::Count(count) = &outcome {
            if *count > 0 && self.generated_keys {
                self.last_insert = Some(conn.last_insert_rowid());
            }
        }
        Ok(outcome)
    }
}

fn execute_on(
    conn: &rusqlite::Connection,
    sql: &str,
    bound: &BTreeMap<usize, SqlValue>,
    max_rows: usize,
) -> rusqlite::Result<Outcome> {
    let mut stmt = conn.prepare(sql)?;
    let expected = stmt.parameter_count();
    let mut values = Vec::with_capacity(expected);
    for index in 1..=expected {
        match bound.get(&index) {
            Some(v) => values.push(v.clone()),
            None => return Err(rusqlite::Error::InvalidParameterCount(index - 1, expected)),
        }
    }

    if stmt.column_count() == 0 {
        let changes = stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        return Ok(Outcome::Count(changes as i64));
    }

    let columns: Vec<ColumnMeta> = stmt
        .columns()
        .iter()
        .map(|c| {
            let decl = c.decl_type().unwrap_or("");
            ColumnMeta {
                name: c.name().to_string(),
                label: c.name().to_string(),
                wire_type: WireType::from_decl(decl),
                type_name: decl.to_uppercase(),
                nullable: true,
                table: None,
            }
        })
        .collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(values.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if max_rows > 0 && out.len() >= max_rows {
            break;
        }
        let mut cells = Vec::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            cells.push(from_sql(row.get_ref(i)?, col.wire_type));
        }
        out.push(cells);
    }
    Ok(Outcome::Rows(MemoryCursor::new(ResultMetadata { columns }, out)))
}

impl NativeStatement for SqliteStatement {
    fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    fn execute_query(&mut self, sql: Option<&str>) -> NativeResult<Box<dyn NativeCursor>> {
        let sql = self.effective_sql(sql)?;
        let params = self.params.clone();
        match self.run(&sql, &params)? {
            Outcome::Rows(cursor) => {
                self.update_count = -1;
                Ok(Box::new(cursor))
            }
            Outcome::Count(_) => Err(NativeError::new(
                ErrorKind::DataError,
                "statement did not return a result set",
            )),
        }
    }

    fn execute_update(&mut self, sql: Option<&str>) -> NativeResult<i64> {
        let sql = self.effective_sql(sql)?;
        let params = self.params.clone();
        match self.run(&sql, &params)? {
            Outcome::Count(count) => {
                self.update_count = count;
                Ok(count)
            }
            Outcome::Rows(_) => Err(NativeError::new(
                ErrorKind::DataError,
                "statement returned a result set",
            )),
        }
    }

    fn execute(&mut self, sql: Option<&str>) -> NativeResult<bool> {
        let sql = self.effective_sql(sql)?;
        let params = self.params.clone();
        match self.run(&sql, &params)? {
            Outcome::Rows(cursor) => {
                self.pending = Some(cursor);
                self.update_count = -1;
                Ok(true)
            }
            Outcome::Count(count) => {
                self.pending = None;
                self.update_count = count;
                Ok(false)
            }
        }
    }

    fn result_set(&mut self) -> NativeResult<Option<Box<dyn NativeCursor>>> {
        self.check_open()?;
        Ok(self
            .pending
            .take()
            .map(|c| Box::new(c) as Box<dyn NativeCursor>))
    }

    fn update_count(&self) -> i64 {
        self.update_count
    }

    fn set_parameter(&mut self, index: usize, value: Value) -> NativeResult<()> {
        self.check_open()?;
        if index == 0 {
            return Err(NativeError::new(
                ErrorKind::DataError,
                "parameter indexes start at 1",
            ));
        }
        self.params.insert(index, value);
        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.params.clear();
    }

    fn add_batch(&mut self, sql: Option<&str>) -> NativeResult<()> {
        self.check_open()?;
        let sql = self.effective_sql(sql)?;
        self.batch.push((sql, self.params.clone()));
        Ok(())
    }

    fn clear_batch(&mut self) {
        self.batch.clear();
    }

    fn execute_batch(&mut self) -> NativeResult<Vec<i64>> {
        let batch = std::mem::take(&mut self.batch);
        let mut counts = Vec::with_capacity(batch.len());
        for (sql, params) in batch {
            match self.run(&sql, &params)? {
                Outcome::Count(count) => counts.push(count),
                Outcome::Rows(_) => {
                    return Err(NativeError::new(
                        ErrorKind::DataError,
                        format!("batch entry {} returned a result set", counts.len() + 1),
                    ))
                }
            }
        }
        Ok(counts)
    }

    fn generated_keys(&mut self) -> NativeResult<Option<Box<dyn NativeCursor>>> {
        self.check_open()?;
        let rows = self
            .last_insert
            .map(|id| vec![vec![Value::Int(id)]])
            .unwrap_or_default();
        let metadata = ResultMetadata {
            columns: vec![column("GENERATED_KEY", WireType::BigInt)],
        };
        Ok(Some(Box::new(MemoryCursor::new(metadata, rows))))
    }

    fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        Some(self.canceller.clone())
    }

    fn query_timeout(&self) -> u32 {
        self.query_timeout
    }

    fn set_query_timeout(&mut self, seconds: u32) {
        self.query_timeout = seconds;
    }

    fn max_rows(&self) -> usize {
        self.max_rows
    }

    fn set_max_rows(&mut self, rows: usize) {
        self.max_rows = rows;
    }

    fn close(&mut self) -> NativeResult<()> {
        self.closed = true;
        self.pending = None;
        self.params.clear();
        self.batch.clear();
        Ok(())
    }
}

fn to_sql(value: &Value) -> NativeResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Decimal(d) => SqlValue::Text(d.to_string()),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => SqlValue::Text(t.format("%H:%M:%S%.f").to_string()),
        Value::Timestamp(ts) => SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        Value::Lob(lob) => match lob.kind {
            LobKind::Blob => SqlValue::Blob(lob.all_bytes()?.to_vec()),
            LobKind::Clob | LobKind::NClob => SqlValue::Text(lob.text()?),
        },
        Value::Array(items) => SqlValue::Text(
            serde_json::to_string(items)
                .map_err(|e| NativeError::new(ErrorKind::DataError, e.to_string()))?,
        ),
        Value::Ref(desc) => {
            return Err(NativeError::new(
                ErrorKind::Protocol,
                format!("unresolved reference {} cannot be bound", desc.url),
            ))
        }
    })
}

fn from_sql(value: ValueRef<'_>, wire: WireType) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match wire {
            WireType::Boolean | WireType::Bit => Value::Bool(i != 0),
            WireType::Decimal | WireType::Numeric => Value::Decimal(Decimal::from(i)),
            _ => Value::Int(i),
        },
        ValueRef::Real(f) => match wire {
            WireType::Decimal | WireType::Numeric => Decimal::from_f64(f)
                .map(Value::Decimal)
                .unwrap_or(Value::Float(f)),
            _ => Value::Float(f),
        },
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            let parsed = match wire {
                WireType::Date => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .ok()
                    .map(Value::Date),
                WireType::Time | WireType::TimeWithTimezone => {
                    NaiveTime::parse_from_str(&text, "%H:%M:%S%.f").ok().map(Value::Time)
                }
                WireType::Timestamp | WireType::TimestampWithTimezone => {
                    parse_timestamp(&text).map(Value::Timestamp)
                }
                WireType::Decimal | WireType::Numeric => text.parse::<Decimal>().ok().map(Value::Decimal),
                WireType::Clob => Some(Value::Lob(LargeObject::clob(text.clone()))),
                WireType::NClob => Some(Value::Lob(LargeObject::nclob(text.clone()))),
                WireType::Array => serde_json::from_str::<Vec<Value>>(&text)
                    .ok()
                    .map(Value::Array),
                _ => None,
            };
            parsed.unwrap_or(Value::String(text))
        }
        ValueRef::Blob(bytes) => match wire {
            WireType::Blob => Value::Lob(LargeObject::blob(bytes.to_vec())),
            _ => Value::Bytes(bytes.to_vec()),
        },
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Cell;

    fn connect() -> Box<dyn NativeConnection> {
        SqliteDriver
            .connect("sqlite::memory:", &BTreeMap::new())
            .unwrap()
    }

    fn int_cell(cursor: &mut Box<dyn NativeCursor>, column: usize) -> i64 {
        match cursor.cell(column).unwrap() {
            Cell::Value(Value::Int(i)) => i,
            _ => panic!("expected an int cell"),
        }
    }

    #[test]
    fn test_accepts_url() {
        assert!(SqliteDriver.accepts_url("sqlite::memory:"));
        assert!(!SqliteDriver.accepts_url("postgres://localhost/db"));
    }

    #[test]
    fn test_file_database_is_shared_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}{}", URL_PREFIX, dir.path().join("shared.db").display());

        let mut writer = SqliteDriver.connect(&url, &BTreeMap::new()).unwrap();
        let mut stmt = writer.create_statement().unwrap();
        stmt.execute_update(Some("CREATE TABLE t (i INTEGER)")).unwrap();
        stmt.execute_update(Some("INSERT INTO t VALUES (5)")).unwrap();

        let mut reader = SqliteDriver.connect(&url, &BTreeMap::new()).unwrap();
        let mut cursor = reader
            .create_statement()
            .unwrap()
            .execute_query(Some("SELECT i FROM t"))
            .unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(int_cell(&mut cursor, 1), 5);
    }

    #[test]
    fn test_query_and_update() {
        let mut conn = connect();
        let mut stmt = conn.create_statement().unwrap();
        assert_eq!(stmt.execute_update(Some("CREATE TABLE t (i INTEGER)")).unwrap(), 0);
        assert_eq!(stmt.execute_update(Some("INSERT INTO t VALUES (12345), (7)")).unwrap(), 2);

        let mut cursor = stmt.execute_query(Some("SELECT i FROM t ORDER BY i")).unwrap();
        assert_eq!(cursor.metadata().columns[0].wire_type, WireType::Integer);
        assert!(cursor.next().unwrap());
        assert_eq!(int_cell(&mut cursor, 1), 7);
        assert!(cursor.next().unwrap());
        assert_eq!(int_cell(&mut cursor, 1), 12345);
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn test_prepared_parameters_and_missing_parameter() {
        let mut conn = connect();
        conn.create_statement()
            .unwrap()
            .execute_update(Some("CREATE TABLE p (name VARCHAR(20), born DATE)"))
            .unwrap();

        let mut insert = conn.prepare("INSERT INTO p VALUES (?1, ?2)", true).unwrap();
        insert.set_parameter(1, Value::String("ada".into())).unwrap();
        assert_eq!(insert.execute_update(None).unwrap_err().kind, ErrorKind::DataError);

        insert
            .set_parameter(2, Value::Date(NaiveDate::from_ymd_opt(1815, 12, 10).unwrap()))
            .unwrap();
        assert_eq!(insert.execute_update(None).unwrap(), 1);

        let mut keys = insert.generated_keys().unwrap().unwrap();
        assert!(keys.next().unwrap());
        assert_eq!(int_cell(&mut keys, 1), 1);

        let mut cursor = conn
            .create_statement()
            .unwrap()
            .execute_query(Some("SELECT born FROM p"))
            .unwrap();
        cursor.next().unwrap();
        assert!(matches!(cursor.cell(1).unwrap(), Cell::Value(Value::Date(_))));
    }

    #[test]
    fn test_syntax_error_kind() {
        let mut conn = connect();
        let err = conn.prepare("SELEC 1", false).err().unwrap();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert!(err.leaf.unwrap().starts_with("SQLITE_"));
    }

    #[test]
    fn test_prepare_input_error_is_classified() {
        let raw = rusqlite::Connection::open_in_memory().unwrap();
        let err: NativeError = raw.prepare("SELEC 1").err().unwrap().into();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.leaf.as_deref(), Some("SQLITE_1"));

        let err: NativeError = raw.prepare("SELECT * FROM missing").err().unwrap().into();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert!(err.message.contains("no such table"));
    }

    #[test]
    fn test_constraint_violation_kind() {
        let mut conn = connect();
        let mut stmt = conn.create_statement().unwrap();
        stmt.execute_update(Some("CREATE TABLE u (id INTEGER PRIMARY KEY)")).unwrap();
        stmt.execute_update(Some("INSERT INTO u VALUES (1)")).unwrap();
        let err = stmt.execute_update(Some("INSERT INTO u VALUES (1)")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_execute_then_result_set_is_consumed() {
        let mut conn = connect();
        let mut stmt = conn.create_statement().unwrap();
        assert!(stmt.execute(Some("SELECT 1 AS one")).unwrap());
        assert!(stmt.result_set().unwrap().is_some());
        assert!(stmt.result_set().unwrap().is_none());
        assert!(!stmt.execute(Some("CREATE TABLE z (a INT)")).unwrap());
        assert_eq!(stmt.update_count(), 0);
    }

    #[test]
    fn test_batch() {
        let mut conn = connect();
        let mut stmt = conn.create_statement().unwrap();
        stmt.execute_update(Some("CREATE TABLE b (a INT)")).unwrap();
        stmt.add_batch(Some("INSERT INTO b VALUES (1)")).unwrap();
        stmt.add_batch(Some("INSERT INTO b VALUES (2), (3)")).unwrap();
        assert_eq!(stmt.execute_batch().unwrap(), vec![1, 2]);
        assert!(stmt.execute_batch().unwrap().is_empty());
    }

    #[test]
    fn test_lob_and_array_columns() {
        let mut conn = connect();
        let mut stmt = conn.create_statement().unwrap();
        stmt.execute_update(Some("CREATE TABLE l (b BLOB, c CLOB, a ARRAY)")).unwrap();
        stmt.execute_update(Some("INSERT INTO l VALUES (x'0102', 'text', '[{\"type\":\"int\",\"value\":1}]')"))
            .unwrap();
        let mut cursor = stmt.execute_query(Some("SELECT b, c, a FROM l")).unwrap();
        cursor.next().unwrap();
        assert!(matches!(cursor.cell(1).unwrap(), Cell::Lob(_)));
        assert!(matches!(cursor.cell(2).unwrap(), Cell::Lob(_)));
        assert!(matches!(cursor.cell(3).unwrap(), Cell::Array(_)));
    }

    #[test]
    fn test_transactions_and_savepoints() {
        let mut conn = connect();
        let mut stmt = conn.create_statement().unwrap();
        stmt.execute_update(Some("CREATE TABLE x (a INT)")).unwrap();

        conn.set_auto_commit(false).unwrap();
        stmt.execute_update(Some("INSERT INTO x VALUES (1)")).unwrap();
        let sp = conn.set_savepoint(Some("before-two")).unwrap();
        stmt.execute_update(Some("INSERT INTO x VALUES (2)")).unwrap();
        conn.rollback(Some(&sp)).unwrap();
        conn.commit().unwrap();
        conn.set_auto_commit(true).unwrap();

        let mut cursor = stmt.execute_query(Some("SELECT count(*) FROM x")).unwrap();
        cursor.next().unwrap();
        assert_eq!(int_cell(&mut cursor, 1), 1);
    }

    #[test]
    fn test_tables_metadata() {
        let mut conn = connect();
        conn.create_statement()
            .unwrap()
            .execute_update(Some("CREATE TABLE accounts (id INT)"))
            .unwrap();
        let mut tables = conn.tables(Some("acc%")).unwrap();
        assert!(tables.next().unwrap());
        match tables.cell(3).unwrap() {
            Cell::Value(v) => assert_eq!(v, Value::String("accounts".into())),
            _ => panic!("expected a value"),
        }
        assert!(!tables.next().unwrap());
    }

    #[test]
    fn test_column_and_key_catalogs() {
        let mut conn = connect();
        let mut stmt = conn.create_statement().unwrap();
        stmt.execute_update(Some("CREATE TABLE parent (id INTEGER PRIMARY KEY, label TEXT NOT NULL)"))
            .unwrap();
        stmt.execute_update(Some("CREATE TABLE child (id INT, parent_id INT REFERENCES parent(id))"))
            .unwrap();

        let mut columns = conn.columns(Some("parent"), None).unwrap();
        assert_eq!(columns.metadata().column_count(), 9);
        assert!(columns.next().unwrap());
        assert_eq!(int_cell(&mut columns, 9), 1);
        assert!(columns.next().unwrap());
        assert_eq!(int_cell(&mut columns, 5), WireType::LongVarchar.code() as i64);
        assert_eq!(int_cell(&mut columns, 7), 0);
        assert!(!columns.next().unwrap());

        let mut keys = conn.primary_keys("parent").unwrap();
        assert!(keys.next().unwrap());
        assert_eq!(int_cell(&mut keys, 5), 1);
        assert!(!conn.primary_keys("child").unwrap().next().unwrap());

        let mut imported = conn.imported_keys("child").unwrap();
        assert!(imported.next().unwrap());
        match imported.cell(1).unwrap() {
            Cell::Value(v) => assert_eq!(v, Value::String("parent".into())),
            _ => panic!("expected a value"),
        }
        assert!(!imported.next().unwrap());

        assert!(conn.type_info().unwrap().last().unwrap());
        assert!(!conn.catalogs().unwrap().next().unwrap());
    }
}
