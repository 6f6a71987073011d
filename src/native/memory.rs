//! In-memory cursors, large objects, arrays and streams.
//!
//! Backends materialize their results into these so every cursor is
//! scrollable, and LOB streams share storage with the object they were opened
//! from.

use dbridge_core::{ColumnMeta, ErrorKind, LargeObject, LobKind, ResultMetadata, Value, WireType};
use parking_lot::RwLock;
use std::sync::Arc;

use super::{
    Cell, NativeArray, NativeCursor, NativeError, NativeInputStream, NativeLob,
    NativeOutputStream, NativeResult,
};

pub fn column(name: &str, wire_type: WireType) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        label: name.to_string(),
        wire_type,
        type_name: format!("{:?}", wire_type).to_uppercase(),
        nullable: true,
        table: None,
    }
}

pub struct MemoryCursor {
    metadata: ResultMetadata,
    rows: Vec<Vec<Value>>,
    /// 0 is before the first row, `rows.len() + 1` after the last.
    position: usize,
    was_null: bool,
    fetch_size: usize,
    closed: bool,
}

impl MemoryCursor {
    pub fn new(metadata: ResultMetadata, rows: Vec<Vec<Value>>) -> Self {
        Self {
            metadata,
            rows,
            position: 0,
            was_null: false,
            fetch_size: 0,
            closed: false,
        }
    }

    fn check_open(&self) -> NativeResult<()> {
        if self.closed {
            return Err(NativeError::closed("result set"));
        }
        Ok(())
    }

    fn on_row(&self) -> bool {
        self.position >= 1 && self.position <= self.rows.len()
    }

    fn move_to(&mut self, position: i64) -> NativeResult<bool> {
        self.check_open()?;
        let after = self.rows.len() as i64 + 1;
        self.position = position.clamp(0, after) as usize;
        self.was_null = false;
        Ok(self.on_row())
    }
}

impl NativeCursor for MemoryCursor {
    fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    fn next(&mut self) -> NativeResult<bool> {
        self.move_to(self.position as i64 + 1)
    }

    fn previous(&mut self) -> NativeResult<bool> {
        self.move_to(self.position as i64 - 1)
    }

    fn first(&mut self) -> NativeResult<bool> {
        if self.rows.is_empty() {
            return self.move_to(0);
        }
        self.move_to(1)
    }

    fn last(&mut self) -> NativeResult<bool> {
        self.move_to(self.rows.len() as i64)
    }

    fn absolute(&mut self, row: i64) -> NativeResult<bool> {
        let len = self.rows.len() as i64;
        let target = match row {
            0 => 0,
            r if r > 0 => r,
            // -1 is the last row
            r => (len + 1 + r).max(0),
        };
        self.move_to(target)
    }

    fn relative(&mut self, rows: i64) -> NativeResult<bool> {
        self.move_to(self.position as i64 + rows)
    }

    fn before_first(&mut self) -> NativeResult<()> {
        self.move_to(0).map(|_| ())
    }

    fn after_last(&mut self) -> NativeResult<()> {
        self.move_to(self.rows.len() as i64 + 1).map(|_| ())
    }

    fn row(&self) -> usize {
        if self.on_row() {
            self.position
        } else {
            0
        }
    }

    fn is_before_first(&self) -> bool {
        self.position == 0 && !self.rows.is_empty()
    }

    fn is_after_last(&self) -> bool {
        self.position > self.rows.len() && !self.rows.is_empty()
    }

    fn cell(&mut self, column: usize) -> NativeResult<Cell> {
        self.check_open()?;
        if !self.on_row() {
            return Err(NativeError::new(
                ErrorKind::DataError,
                "cursor is not positioned on a row",
            ));
        }
        let row = &self.rows[self.position - 1];
        if column == 0 || column > row.len() {
            return Err(NativeError::new(
                ErrorKind::InvalidColumn,
                format!("column index {} out of range (1..={})", column, row.len()),
            ));
        }
        let value = row[column - 1].clone();
        self.was_null = value.is_null();
        let cell = match value {
            Value::Lob(lob) => Cell::Lob(Box::new(MemoryLob::new(lob))),
            Value::Array(items) => {
                let type_name = self
                    .metadata
                    .columns
                    .get(column - 1)
                    .map(|c| c.type_name.clone())
                    .unwrap_or_default();
                Cell::Array(Box::new(MemoryArray::new(&type_name, items)))
            }
            other => Cell::Value(other),
        };
        Ok(cell)
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    fn set_fetch_size(&mut self, rows: usize) {
        self.fetch_size = rows;
    }

    fn close(&mut self) -> NativeResult<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

pub struct MemoryLob {
    data: Arc<RwLock<LargeObject>>,
    freed: bool,
}

impl MemoryLob {
    pub fn new(lob: LargeObject) -> Self {
        Self {
            data: Arc::new(RwLock::new(lob)),
            freed: false,
        }
    }

    fn check_live(&self) -> NativeResult<()> {
        if self.freed {
            return Err(NativeError::closed("large object"));
        }
        Ok(())
    }
}

impl NativeLob for MemoryLob {
    fn kind(&self) -> LobKind {
        self.data.read().kind
    }

    fn length(&self) -> NativeResult<u64> {
        self.check_live()?;
        Ok(self.data.read().length())
    }

    fn read(&self, pos: u64, len: usize) -> NativeResult<Vec<u8>> {
        self.check_live()?;
        let lob = self.data.read();
        if lob.is_character() {
            Ok(lob.sub_string(pos, len)?.into_bytes())
        } else {
            Ok(lob.bytes(pos, len)?)
        }
    }

    fn position(&self, pattern: &[u8], start: u64) -> NativeResult<Option<u64>> {
        self.check_live()?;
        Ok(self.data.read().position(pattern, start)?)
    }

    fn write(&mut self, pos: u64, data: &[u8]) -> NativeResult<usize> {
        self.check_live()?;
        Ok(self.data.write().write_at(pos, data)?)
    }

    fn truncate(&mut self, len: u64) -> NativeResult<()> {
        self.check_live()?;
        Ok(self.data.write().truncate(len)?)
    }

    fn reader(&self) -> NativeResult<Box<dyn NativeInputStream>> {
        self.check_live()?;
        self.data.read().all_bytes()?;
        Ok(Box::new(MemoryInputStream {
            data: self.data.clone(),
            offset: 0,
            closed: false,
        }))
    }

    fn writer(&mut self, pos: u64) -> NativeResult<Box<dyn NativeOutputStream>> {
        self.check_live()?;
        Ok(Box::new(MemoryOutputStream {
            data: self.data.clone(),
            pos,
            closed: false,
        }))
    }

    fn snapshot(&self) -> NativeResult<LargeObject> {
        self.check_live()?;
        Ok(self.data.read().clone())
    }

    fn free(&mut self) -> NativeResult<()> {
        self.freed = true;
        Ok(())
    }
}

/// Reads the raw bytes of a large object; character objects yield UTF-8.
pub struct MemoryInputStream {
    data: Arc<RwLock<LargeObject>>,
    offset: usize,
    closed: bool,
}

impl NativeInputStream for MemoryInputStream {
    fn read(&mut self, max: usize) -> NativeResult<Vec<u8>> {
        if self.closed {
            return Err(NativeError::closed("stream"));
        }
        let lob = self.data.read();
        let bytes = lob.all_bytes()?;
        let start = self.offset.min(bytes.len());
        let end = (start + max).min(bytes.len());
        self.offset = end;
        Ok(bytes[start..end].to_vec())
    }

    fn available(&self) -> NativeResult<usize> {
        let lob = self.data.read();
        Ok(lob.all_bytes()?.len().saturating_sub(self.offset))
    }

    fn skip(&mut self, n: u64) -> NativeResult<u64> {
        let available = self.available()? as u64;
        let skipped = n.min(available);
        self.offset += skipped as usize;
        Ok(skipped)
    }

    fn close(&mut self) -> NativeResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Writes into a large object starting at a 1-based position.
pub struct MemoryOutputStream {
    data: Arc<RwLock<LargeObject>>,
    pos: u64,
    closed: bool,
}

impl NativeOutputStream for MemoryOutputStream {
    fn write(&mut self, data: &[u8]) -> NativeResult<()> {
        if self.closed {
            return Err(NativeError::closed("stream"));
        }
        let written = self.data.write().write_at(self.pos, data)?;
        self.pos += written as u64;
        Ok(())
    }

    fn flush(&mut self) -> NativeResult<()> {
        Ok(())
    }

    fn close(&mut self) -> NativeResult<()> {
        self.closed = true;
        Ok(())
    }
}

pub struct MemoryArray {
    type_name: String,
    elements: Vec<Value>,
    freed: bool,
}

impl MemoryArray {
    pub fn new(type_name: &str, elements: Vec<Value>) -> Self {
        Self {
            type_name: type_name.to_string(),
            elements,
            freed: false,
        }
    }
}

impl NativeArray for MemoryArray {
    fn base_type_name(&self) -> &str {
        &self.type_name
    }

    fn elements(&self) -> NativeResult<Vec<Value>> {
        if self.freed {
            return Err(NativeError::closed("array"));
        }
        Ok(self.elements.clone())
    }

    fn result_set(&self) -> NativeResult<Box<dyn NativeCursor>> {
        let rows = self
            .elements()?
            .into_iter()
            .enumerate()
            .map(|(i, v)| vec![Value::Int(i as i64 + 1), v])
            .collect();
        let metadata = ResultMetadata {
            columns: vec![
                column("INDEX", WireType::BigInt),
                column("VALUE", WireType::from_decl(&self.type_name)),
            ],
        };
        Ok(Box::new(MemoryCursor::new(metadata, rows)))
    }

    fn free(&mut self) -> NativeResult<()> {
        self.freed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(n: i64) -> MemoryCursor {
        let rows = (1..=n).map(|i| vec![Value::Int(i)]).collect();
        MemoryCursor::new(
            ResultMetadata {
                columns: vec![column("i", WireType::Integer)],
            },
            rows,
        )
    }

    fn current(c: &mut MemoryCursor) -> i64 {
        match c.cell(1).unwrap() {
            Cell::Value(Value::Int(i)) => i,
            _ => panic!("expected an int cell"),
        }
    }

    #[test]
    fn test_forward_iteration() {
        let mut c = cursor(2);
        assert!(c.is_before_first());
        assert!(c.next().unwrap());
        assert_eq!(current(&mut c), 1);
        assert!(c.next().unwrap());
        assert!(!c.next().unwrap());
        assert!(c.is_after_last());
        assert!(!c.next().unwrap());
        assert_eq!(c.row(), 0);
    }

    #[test]
    fn test_scrolling() {
        let mut c = cursor(5);
        assert!(c.last().unwrap());
        assert_eq!(c.row(), 5);
        assert!(c.absolute(-2).unwrap());
        assert_eq!(current(&mut c), 4);
        assert!(c.relative(-3).unwrap());
        assert_eq!(c.row(), 1);
        assert!(!c.relative(-1).unwrap());
        assert!(c.is_before_first());
        assert!(!c.absolute(9).unwrap());
        assert!(c.is_after_last());
        assert!(c.previous().unwrap());
        assert_eq!(c.row(), 5);
        assert!(c.first().unwrap());
    }

    #[test]
    fn test_empty_cursor() {
        let mut c = cursor(0);
        assert!(!c.first().unwrap());
        assert!(!c.next().unwrap());
        assert!(!c.is_before_first());
        assert!(c.cell(1).is_err());
    }

    #[test]
    fn test_cell_bounds_and_was_null() {
        let mut c = MemoryCursor::new(
            ResultMetadata {
                columns: vec![column("a", WireType::Integer), column("b", WireType::Varchar)],
            },
            vec![vec![Value::Int(1), Value::Null]],
        );
        c.next().unwrap();
        assert!(matches!(c.cell(2).unwrap(), Cell::Value(Value::Null)));
        assert!(c.was_null());
        let err = c.cell(3).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidColumn);
        assert!(err.message.contains('3'));
    }

    #[test]
    fn test_lob_streams_share_storage() {
        let mut lob = MemoryLob::new(LargeObject::blob(b"hello".to_vec()));
        let mut writer = lob.writer(6).unwrap();
        writer.write(b" world").unwrap();
        assert_eq!(lob.length().unwrap(), 11);

        let mut reader = lob.reader().unwrap();
        assert_eq!(reader.read(5).unwrap(), b"hello");
        assert_eq!(reader.skip(1).unwrap(), 1);
        assert_eq!(reader.read(100).unwrap(), b"world");
        assert!(reader.read(10).unwrap().is_empty());

        lob.free().unwrap();
        assert!(lob.length().is_err());
    }

    #[test]
    fn test_partial_lob_refuses_reads() {
        let lob = MemoryLob::new(LargeObject::blob(vec![1, 2, 3]).into_partial());
        assert_eq!(lob.length().unwrap(), 3);
        assert_eq!(lob.read(1, 3).unwrap_err().kind, ErrorKind::Coercion);
        assert!(lob.reader().is_err());
    }

    #[test]
    fn test_array_result_set() {
        let array = MemoryArray::new("INTEGER", vec![Value::Int(10), Value::Int(20)]);
        let mut rs = array.result_set().unwrap();
        assert!(rs.next().unwrap());
        assert!(rs.next().unwrap());
        match rs.cell(2).unwrap() {
            Cell::Value(v) => assert_eq!(v, Value::Int(20)),
            _ => panic!("expected a value"),
        }
    }
}
