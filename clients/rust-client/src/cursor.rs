//! Client half of the cursor state machine.
//!
//! Positioning goes through the `*row` actions, which answer with the whole
//! current row. Column reads are then served from that snapshot and coerced
//! locally with the session engine, so iterating `n` rows of `m` columns costs
//! `n` round trips rather than `n * m`. Any positioning call drops the snapshot.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use dbridge_core::{Cast, CastRequest, ResultMetadata, RowData, SqlType, Value};
use reqwest::Method;
use rust_decimal::Decimal;

use crate::array::RemoteArray;
use crate::error::{RemoteError, RemoteResult};
use crate::handle::Handle;
use crate::lob::RemoteLob;

/// A column addressed by 1-based index or by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column<'a> {
    Index(usize),
    Label(&'a str),
}

impl From<usize> for Column<'_> {
    fn from(index: usize) -> Self {
        Column::Index(index)
    }
}

impl<'a> From<&'a str> for Column<'a> {
    fn from(label: &'a str) -> Self {
        Column::Label(label)
    }
}

/// Targets a server handle can be handed out as without reading it.
fn keeps_reference(target: SqlType) -> bool {
    matches!(
        target,
        SqlType::Blob | SqlType::Clob | SqlType::NClob | SqlType::Array | SqlType::Object
    )
}

pub struct RemoteCursor {
    handle: Handle,
    metadata: Option<ResultMetadata>,
    snapshot: Option<RowData>,
    was_null: bool,
}

impl RemoteCursor {
    pub(crate) fn new(handle: Handle) -> Self {
        let metadata = handle.descriptor().field("metadata");
        Self {
            handle,
            metadata,
            snapshot: None,
            was_null: false,
        }
    }

    pub fn url(&self) -> &str {
        self.handle.url()
    }

    pub fn is_closed(&self) -> bool {
        !self.handle.is_open()
    }

    /// Result metadata, fetched once if the descriptor did not carry it.
    pub async fn metadata(&mut self) -> RemoteResult<&ResultMetadata> {
        self.handle.ensure_open()?;
        let metadata = match self.metadata.take() {
            Some(m) => m,
            None => self.handle.get("metadata").await?,
        };
        Ok(self.metadata.insert(metadata))
    }

    /// The row cached by the last positioning call, if it landed on one.
    pub fn cached_row(&self) -> Option<&[Value]> {
        self.snapshot.as_ref().and_then(|s| s.row.as_deref())
    }

    fn invalidate(&mut self) {
        self.snapshot = None;
        self.was_null = false;
    }

    async fn position(&mut self, action: &str) -> RemoteResult<bool> {
        self.invalidate();
        let data: RowData = self.handle.post(action, ()).await?;
        let moved = data.moved;
        if moved {
            self.snapshot = Some(data);
        }
        Ok(moved)
    }

    pub async fn next(&mut self) -> RemoteResult<bool> {
        self.position("nextrow").await
    }

    pub async fn previous(&mut self) -> RemoteResult<bool> {
        self.position("previousrow").await
    }

    pub async fn first(&mut self) -> RemoteResult<bool> {
        self.position("firstrow").await
    }

    pub async fn last(&mut self) -> RemoteResult<bool> {
        self.position("lastrow").await
    }

    pub async fn absolute(&mut self, row: i64) -> RemoteResult<bool> {
        self.position(&format!("absoluterow/{}", row)).await
    }

    pub async fn relative(&mut self, rows: i64) -> RemoteResult<bool> {
        self.position(&format!("relativerow/{}", rows)).await
    }

    pub async fn before_first(&mut self) -> RemoteResult<()> {
        self.invalidate();
        self.handle.send(Method::POST, "beforefirst").await
    }

    pub async fn after_last(&mut self) -> RemoteResult<()> {
        self.invalidate();
        self.handle.send(Method::POST, "afterlast").await
    }

    pub async fn is_before_first(&self) -> RemoteResult<bool> {
        self.handle.get("beforefirst").await
    }

    pub async fn is_after_last(&self) -> RemoteResult<bool> {
        self.handle.get("afterlast").await
    }

    /// Current 1-based row number, 0 when not on a row.
    pub async fn row(&self) -> RemoteResult<usize> {
        self.handle.get("row").await
    }

    pub async fn find_column(&mut self, label: &str) -> RemoteResult<usize> {
        Ok(self.metadata().await?.find_column(label)?)
    }

    /// Whether the last column read saw a SQL NULL.
    pub fn was_null(&self) -> bool {
        self.was_null
    }

    async fn column_index(&mut self, column: Column<'_>) -> RemoteResult<usize> {
        match column {
            Column::Index(index) => Ok(index),
            Column::Label(label) => self.find_column(label).await,
        }
    }

    /// Reads a column through the server, for reads with no usable snapshot.
    async fn fetch(&self, index: usize, target: SqlType) -> RemoteResult<Cast> {
        let value: Value = self
            .handle
            .get(&format!("{}/index/{}", target.name(), index))
            .await?;
        let was_null = self.handle.get("wasnull").await?;
        Ok(Cast { value, was_null })
    }

    async fn read(&mut self, column: Column<'_>, target: SqlType) -> RemoteResult<Cast> {
        // The snapshot outlives the server cursor; closed proxies must not serve it.
        self.handle.ensure_open()?;
        self.was_null = false;
        let index = self.column_index(column).await?;
        let meta = self.metadata().await?.column(index)?.clone();

        let cached = match &self.snapshot {
            Some(row) => Some(row.cell(index)?.clone()),
            None => None,
        };
        let cast = match cached {
            Some(Value::Ref(_)) if !keeps_reference(target) => self.fetch(index, target).await?,
            Some(value) => {
                let request = CastRequest::new(value, target)
                    .declared(meta.declared_type())
                    .wire(meta.wire_type);
                self.handle.engine().cast(&request)?
            }
            None => self.fetch(index, target).await?,
        };
        self.was_null = cast.was_null;
        Ok(cast)
    }

    pub async fn get_boolean<'a>(&mut self, column: impl Into<Column<'a>>) -> RemoteResult<bool> {
        Ok(self.read(column.into(), SqlType::Boolean).await?.bool())
    }

    pub async fn get_byte<'a>(&mut self, column: impl Into<Column<'a>>) -> RemoteResult<i8> {
        Ok(self.read(column.into(), SqlType::Byte).await?.int() as i8)
    }

    pub async fn get_short<'a>(&mut self, column: impl Into<Column<'a>>) -> RemoteResult<i16> {
        Ok(self.read(column.into(), SqlType::Short).await?.int() as i16)
    }

    pub async fn get_int<'a>(&mut self, column: impl Into<Column<'a>>) -> RemoteResult<i32> {
        Ok(self.read(column.into(), SqlType::Int).await?.int() as i32)
    }

    pub async fn get_long<'a>(&mut self, column: impl Into<Column<'a>>) -> RemoteResult<i64> {
        Ok(self.read(column.into(), SqlType::Long).await?.int())
    }

    pub async fn get_float<'a>(&mut self, column: impl Into<Column<'a>>) -> RemoteResult<f32> {
        Ok(self.read(column.into(), SqlType::Float).await?.float() as f32)
    }

    pub async fn get_double<'a>(&mut self, column: impl Into<Column<'a>>) -> RemoteResult<f64> {
        Ok(self.read(column.into(), SqlType::Double).await?.float())
    }

    pub async fn get_decimal<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<Decimal>> {
        match self.read(column.into(), SqlType::Decimal).await?.value {
            Value::Decimal(d) => Ok(Some(d)),
            _ => Ok(None),
        }
    }

    pub async fn get_string<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<String>> {
        Ok(self.read(column.into(), SqlType::String).await?.into_string())
    }

    pub async fn get_bytes<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<Vec<u8>>> {
        match self.read(column.into(), SqlType::Bytes).await?.value {
            Value::Bytes(b) => Ok(Some(b)),
            _ => Ok(None),
        }
    }

    pub async fn get_date<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<NaiveDate>> {
        match self.read(column.into(), SqlType::Date).await?.value {
            Value::Date(d) => Ok(Some(d)),
            _ => Ok(None),
        }
    }

    pub async fn get_time<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<NaiveTime>> {
        match self.read(column.into(), SqlType::Time).await?.value {
            Value::Time(t) => Ok(Some(t)),
            _ => Ok(None),
        }
    }

    pub async fn get_timestamp<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<NaiveDateTime>> {
        match self.read(column.into(), SqlType::Timestamp).await?.value {
            Value::Timestamp(ts) => Ok(Some(ts)),
            _ => Ok(None),
        }
    }

    /// The column value without coercion; LOB and array cells stay references.
    pub async fn get_object<'a>(&mut self, column: impl Into<Column<'a>>) -> RemoteResult<Value> {
        Ok(self.read(column.into(), SqlType::Object).await?.value)
    }

    pub async fn get_blob<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<RemoteLob>> {
        let value = self.read(column.into(), SqlType::Blob).await?.value;
        self.lob(value)
    }

    pub async fn get_clob<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<RemoteLob>> {
        let value = self.read(column.into(), SqlType::Clob).await?.value;
        self.lob(value)
    }

    pub async fn get_nclob<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<RemoteLob>> {
        let value = self.read(column.into(), SqlType::NClob).await?.value;
        self.lob(value)
    }

    pub async fn get_array<'a>(
        &mut self,
        column: impl Into<Column<'a>>,
    ) -> RemoteResult<Option<RemoteArray>> {
        let column = column.into();
        let value = self.read(column, SqlType::Array).await?.value;
        match value {
            Value::Null => Ok(None),
            Value::Ref(desc) => Ok(Some(RemoteArray::remote(self.handle.child(desc)))),
            Value::Array(elements) => {
                let index = self.column_index(column).await?;
                let base_type = self.metadata().await?.column(index)?.type_name.clone();
                Ok(Some(RemoteArray::inline(base_type, elements)))
            }
            other => Err(RemoteError::Protocol(format!(
                "expected an array, got {}",
                other.kind()
            ))),
        }
    }

    fn lob(&self, value: Value) -> RemoteResult<Option<RemoteLob>> {
        match value {
            Value::Null => Ok(None),
            Value::Ref(desc) => Ok(Some(RemoteLob::remote(self.handle.child(desc)))),
            Value::Lob(lob) => Ok(Some(RemoteLob::inline(lob))),
            other => Err(RemoteError::Protocol(format!(
                "expected a large object, got {}",
                other.kind()
            ))),
        }
    }

    pub async fn fetch_size(&self) -> RemoteResult<usize> {
        self.handle.get("fetchsize").await
    }

    pub async fn set_fetch_size(&self, rows: usize) -> RemoteResult<()> {
        self.handle.put("fetchsize", rows).await
    }

    pub async fn close(&mut self) -> RemoteResult<()> {
        self.invalidate();
        self.handle.close().await
    }
}
