//! Request and response bodies exchanged between client and server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorKind, TransportableError};
use crate::types::{SqlType, WireType};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Connection,
    Statement,
    PreparedStatement,
    #[serde(rename = "resultset")]
    ResultSet,
    Blob,
    Clob,
    #[serde(rename = "nclob")]
    NClob,
    Array,
    Stream,
}

impl EntityKind {
    /// Path segment naming this kind in a reference.
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Connection => "connection",
            EntityKind::Statement => "statement",
            EntityKind::PreparedStatement => "prepared-statement",
            EntityKind::ResultSet => "resultset",
            EntityKind::Blob => "blob",
            EntityKind::Clob => "clob",
            EntityKind::NClob => "nclob",
            EntityKind::Array => "array",
            EntityKind::Stream => "stream",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<EntityKind> {
        match prefix {
            "connection" => Some(EntityKind::Connection),
            "statement" => Some(EntityKind::Statement),
            "prepared-statement" => Some(EntityKind::PreparedStatement),
            "resultset" => Some(EntityKind::ResultSet),
            "blob" => Some(EntityKind::Blob),
            "clob" => Some(EntityKind::Clob),
            "nclob" => Some(EntityKind::NClob),
            "array" => Some(EntityKind::Array),
            "stream" => Some(EntityKind::Stream),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::from_prefix(s).ok_or_else(|| format!("unknown entity kind '{}'", s))
    }
}

/// Descriptor returned whenever the server creates an entity.
///
/// `url` is the path of the entity relative to the server root. `fields`
/// carries values the client caches for the lifetime of its proxy, such as
/// result metadata or the session conversion policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub url: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl EntityDescriptor {
    pub fn new(url: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            url: url.into(),
            kind,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field<T: Serialize>(mut self, name: &str, value: &T) -> Self {
        if let Ok(json) = serde_json::to_value(value) {
            self.fields.insert(name.to_string(), json);
        }
        self
    }

    pub fn field<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.fields
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Snapshot of the current row, produced by each caching positioning call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowData {
    pub moved: bool,
    #[serde(default)]
    pub row: Option<Vec<Value>>,
}

impl RowData {
    pub fn moved(row: Vec<Value>) -> Self {
        Self {
            moved: true,
            row: Some(row),
        }
    }

    pub fn not_moved() -> Self {
        Self {
            moved: false,
            row: None,
        }
    }

    /// Cell at a 1-based column index.
    pub fn cell(&self, index: usize) -> Result<&Value, TransportableError> {
        let row = self.row.as_ref().ok_or_else(|| {
            TransportableError::new(ErrorKind::InvalidColumn, "cursor is not on a row")
        })?;
        if index == 0 || index > row.len() {
            return Err(invalid_column(index, row.len()));
        }
        Ok(&row[index - 1])
    }
}

pub fn invalid_column(index: usize, count: usize) -> TransportableError {
    TransportableError::new(
        ErrorKind::InvalidColumn,
        format!("column index {} out of range (1..={})", index, count),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub label: String,
    pub wire_type: WireType,
    pub type_name: String,
    pub nullable: bool,
    #[serde(default)]
    pub table: Option<String>,
}

impl ColumnMeta {
    pub fn declared_type(&self) -> SqlType {
        self.wire_type.declared_type()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub columns: Vec<ColumnMeta>,
}

impl ResultMetadata {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column at a 1-based index.
    pub fn column(&self, index: usize) -> Result<&ColumnMeta, TransportableError> {
        if index == 0 || index > self.columns.len() {
            return Err(invalid_column(index, self.columns.len()));
        }
        Ok(&self.columns[index - 1])
    }

    /// 1-based index of the first column whose label (then name) matches,
    /// ignoring ASCII case.
    pub fn find_column(&self, label: &str) -> Result<usize, TransportableError> {
        self.columns
            .iter()
            .position(|c| c.label.eq_ignore_ascii_case(label))
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(label))
            })
            .map(|i| i + 1)
            .ok_or_else(|| {
                TransportableError::new(
                    ErrorKind::InvalidColumn,
                    format!("no column labelled '{}'", label),
                )
            })
    }
}

/// A statement parameter, bound at a 1-based index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub index: usize,
    pub value: Value,
    #[serde(default)]
    pub declared: Option<SqlType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub product_name: String,
    pub product_version: String,
    pub driver_name: String,
    pub driver_version: String,
    pub url: String,
    pub user_name: Option<String>,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Savepoint {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of `POST /connection`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Result of an execute call: either a cursor or an update count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecuteOutcome {
    ResultSet { cursor: EntityDescriptor },
    UpdateCount { count: i64 },
}
