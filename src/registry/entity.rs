use dbridge_core::{EntityKind, LobKind};
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::native::{
    Canceller, Cell, NativeArray, NativeConnection, NativeCursor, NativeInputStream, NativeLob,
    NativeOutputStream, NativeResult, NativeStatement,
};

/// Native object owned by a registry slot.
pub enum Entity {
    Connection(Box<dyn NativeConnection>),
    Statement(Box<dyn NativeStatement>),
    Cursor(Box<dyn NativeCursor>),
    Lob(Box<dyn NativeLob>),
    Array(Box<dyn NativeArray>),
    InputStream(Box<dyn NativeInputStream>),
    OutputStream(Box<dyn NativeOutputStream>),
}

pub fn lob_entity_kind(kind: LobKind) -> EntityKind {
    match kind {
        LobKind::Blob => EntityKind::Blob,
        LobKind::Clob => EntityKind::Clob,
        LobKind::NClob => EntityKind::NClob,
    }
}

impl Entity {
    pub fn name(&self) -> &'static str {
        match self {
            Entity::Connection(_) => "connection",
            Entity::Statement(_) => "statement",
            Entity::Cursor(_) => "result set",
            Entity::Lob(_) => "large object",
            Entity::Array(_) => "array",
            Entity::InputStream(_) => "input stream",
            Entity::OutputStream(_) => "output stream",
        }
    }

    /// Wraps a LOB or array cell; plain values stay inline.
    pub fn from_cell(cell: Cell) -> Result<(EntityKind, Entity), dbridge_core::Value> {
        match cell {
            Cell::Value(v) => Err(v),
            Cell::Lob(lob) => Ok((lob_entity_kind(lob.kind()), Entity::Lob(lob))),
            Cell::Array(array) => Ok((EntityKind::Array, Entity::Array(array))),
        }
    }

    pub fn close(&mut self) -> NativeResult<()> {
        match self {
            Entity::Connection(c) => c.close(),
            Entity::Statement(s) => s.close(),
            Entity::Cursor(c) => c.close(),
            Entity::Lob(l) => l.free(),
            Entity::Array(a) => a.free(),
            Entity::InputStream(s) => s.close(),
            Entity::OutputStream(s) => s.close(),
        }
    }

    pub fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        match self {
            Entity::Statement(s) => s.canceller(),
            _ => None,
        }
    }

    /// Values known at creation time, shipped in the descriptor.
    pub fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut fields = serde_json::Map::new();
        match self {
            Entity::Statement(s) => {
                if let Some(sql) = s.sql() {
                    fields.insert("sql".into(), sql.into());
                }
            }
            Entity::Cursor(c) => {
                if let Ok(metadata) = serde_json::to_value(c.metadata()) {
                    fields.insert("metadata".into(), metadata);
                }
            }
            Entity::Lob(l) => {
                if let Ok(length) = l.length() {
                    fields.insert("length".into(), length.into());
                }
            }
            Entity::Array(a) => {
                fields.insert("baseType".into(), a.base_type_name().into());
            }
            _ => {}
        }
        fields
    }

    fn mismatch(&self, wanted: &str) -> BridgeError {
        BridgeError::Protocol(format!("entity is a {}, not a {}", self.name(), wanted))
    }

    pub fn connection(&mut self) -> BridgeResult<&mut dyn NativeConnection> {
        match self {
            Entity::Connection(c) => Ok(c.as_mut()),
            other => Err(other.mismatch("connection")),
        }
    }

    pub fn statement(&mut self) -> BridgeResult<&mut dyn NativeStatement> {
        match self {
            Entity::Statement(s) => Ok(s.as_mut()),
            other => Err(other.mismatch("statement")),
        }
    }

    pub fn cursor(&mut self) -> BridgeResult<&mut dyn NativeCursor> {
        match self {
            Entity::Cursor(c) => Ok(c.as_mut()),
            other => Err(other.mismatch("result set")),
        }
    }

    pub fn lob(&mut self) -> BridgeResult<&mut dyn NativeLob> {
        match self {
            Entity::Lob(l) => Ok(l.as_mut()),
            other => Err(other.mismatch("large object")),
        }
    }

    pub fn array(&mut self) -> BridgeResult<&mut dyn NativeArray> {
        match self {
            Entity::Array(a) => Ok(a.as_mut()),
            other => Err(other.mismatch("array")),
        }
    }

    pub fn input_stream(&mut self) -> BridgeResult<&mut dyn NativeInputStream> {
        match self {
            Entity::InputStream(s) => Ok(s.as_mut()),
            other => Err(other.mismatch("input stream")),
        }
    }

    pub fn output_stream(&mut self) -> BridgeResult<&mut dyn NativeOutputStream> {
        match self {
            Entity::OutputStream(s) => Ok(s.as_mut()),
            other => Err(other.mismatch("output stream")),
        }
    }
}
