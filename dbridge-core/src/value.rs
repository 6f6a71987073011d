use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoercionError;
use crate::types::SqlType;
use crate::wire::EntityDescriptor;

/// A value crossing the bridge.
///
/// Serialized adjacently tagged, e.g. `{"type": "int", "value": 42}`. Bytes
/// travel as base64 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Lob(LargeObject),
    Array(Vec<Value>),
    Ref(EntityDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Bytes,
    Date,
    Time,
    Timestamp,
    Lob,
    Array,
    Ref,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Decimal => "decimal",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Lob => "lob",
            ValueKind::Array => "array",
            ValueKind::Ref => "ref",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Lob(_) => ValueKind::Lob,
            Value::Array(_) => ValueKind::Array,
            Value::Ref(_) => ValueKind::Ref,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type a value is taken to be declared as when nothing narrower is known.
    pub fn natural_type(&self) -> SqlType {
        match self {
            Value::Null => SqlType::Object,
            Value::Bool(_) => SqlType::Boolean,
            Value::Int(_) => SqlType::Long,
            Value::Float(_) => SqlType::Double,
            Value::Decimal(_) => SqlType::Decimal,
            Value::String(_) => SqlType::String,
            Value::Bytes(_) => SqlType::Bytes,
            Value::Date(_) => SqlType::Date,
            Value::Time(_) => SqlType::Time,
            Value::Timestamp(_) => SqlType::Timestamp,
            Value::Lob(lob) => match lob.kind {
                LobKind::Blob => SqlType::Blob,
                LobKind::Clob => SqlType::Clob,
                LobKind::NClob => SqlType::NClob,
            },
            Value::Array(_) => SqlType::Array,
            Value::Ref(_) => SqlType::Object,
        }
    }

    /// Short rendering used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => format!("'{}'", s),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            Value::Date(d) => d.to_string(),
            Value::Time(t) => t.to_string(),
            Value::Timestamp(ts) => ts.to_string(),
            Value::Lob(lob) => format!("<{:?} of {} bytes>", lob.kind, lob.content.len()),
            Value::Array(items) => format!("<array of {}>", items.len()),
            Value::Ref(desc) => desc.url.clone(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobKind {
    Blob,
    Clob,
    NClob,
}

/// Large object carried inline.
///
/// Character objects keep their text as UTF-8; lengths and positions are
/// counted in characters for them and in bytes for binary objects. Positions
/// are 1-based. A partial object knows its length but refuses content reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargeObject {
    pub kind: LobKind,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub partial: bool,
}

impl LargeObject {
    pub fn blob(content: Vec<u8>) -> Self {
        Self {
            kind: LobKind::Blob,
            content,
            partial: false,
        }
    }

    pub fn clob(text: impl Into<String>) -> Self {
        Self {
            kind: LobKind::Clob,
            content: text.into().into_bytes(),
            partial: false,
        }
    }

    pub fn nclob(text: impl Into<String>) -> Self {
        Self {
            kind: LobKind::NClob,
            ..Self::clob(text)
        }
    }

    pub fn into_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn is_character(&self) -> bool {
        self.kind != LobKind::Blob
    }

    pub fn length(&self) -> u64 {
        if self.is_character() {
            String::from_utf8_lossy(&self.content).chars().count() as u64
        } else {
            self.content.len() as u64
        }
    }

    fn readable(&self) -> Result<(), CoercionError> {
        if self.partial {
            return Err(CoercionError::PartialLob);
        }
        Ok(())
    }

    pub fn all_bytes(&self) -> Result<&[u8], CoercionError> {
        self.readable()?;
        Ok(&self.content)
    }

    pub fn text(&self) -> Result<String, CoercionError> {
        self.readable()?;
        Ok(String::from_utf8_lossy(&self.content).into_owned())
    }

    /// Up to `len` bytes starting at the 1-based `pos`.
    pub fn bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>, CoercionError> {
        self.readable()?;
        let start = checked_start(pos, self.content.len())?;
        let end = (start + len).min(self.content.len());
        Ok(self.content[start..end].to_vec())
    }

    /// Up to `len` characters starting at the 1-based `pos`.
    pub fn sub_string(&self, pos: u64, len: usize) -> Result<String, CoercionError> {
        let text = self.text()?;
        let count = text.chars().count();
        let start = checked_start(pos, count)?;
        Ok(text.chars().skip(start).take(len).collect())
    }

    /// 1-based position of the first occurrence of `pattern` at or after `start`.
    pub fn position(&self, pattern: &[u8], start: u64) -> Result<Option<u64>, CoercionError> {
        self.readable()?;
        if self.is_character() {
            let text = String::from_utf8_lossy(&self.content);
            let needle = String::from_utf8_lossy(pattern);
            let chars: Vec<char> = text.chars().collect();
            let needle: Vec<char> = needle.chars().collect();
            let from = checked_start(start, chars.len())?;
            if needle.is_empty() {
                return Ok(Some(from as u64 + 1));
            }
            Ok(chars[from..]
                .windows(needle.len())
                .position(|w| w == needle.as_slice())
                .map(|i| (from + i) as u64 + 1))
        } else {
            let from = checked_start(start, self.content.len())?;
            if pattern.is_empty() {
                return Ok(Some(from as u64 + 1));
            }
            Ok(self.content[from..]
                .windows(pattern.len())
                .position(|w| w == pattern)
                .map(|i| (from + i) as u64 + 1))
        }
    }

    /// Overwrite starting at the 1-based `pos`, growing the object as needed.
    /// Returns the number of bytes or characters written.
    pub fn write_at(&mut self, pos: u64, data: &[u8]) -> Result<usize, CoercionError> {
        self.readable()?;
        if self.is_character() {
            let mut chars: Vec<char> = String::from_utf8_lossy(&self.content).chars().collect();
            let start = checked_start(pos, chars.len())?;
            let incoming: Vec<char> = String::from_utf8_lossy(data).chars().collect();
            let end = start + incoming.len();
            if end > chars.len() {
                chars.resize(end, ' ');
            }
            chars[start..end].copy_from_slice(&incoming);
            self.content = chars.into_iter().collect::<String>().into_bytes();
            Ok(incoming.len())
        } else {
            let start = checked_start(pos, self.content.len())?;
            let end = start + data.len();
            if end > self.content.len() {
                self.content.resize(end, 0);
            }
            self.content[start..end].copy_from_slice(data);
            Ok(data.len())
        }
    }

    pub fn truncate(&mut self, len: u64) -> Result<(), CoercionError> {
        self.readable()?;
        if self.is_character() {
            let text: String = String::from_utf8_lossy(&self.content)
                .chars()
                .take(len as usize)
                .collect();
            self.content = text.into_bytes();
        } else {
            self.content.truncate(len as usize);
        }
        Ok(())
    }
}

/// Positions may point one past the end so writes can append.
fn checked_start(pos: u64, len: usize) -> Result<usize, CoercionError> {
    if pos == 0 || pos as usize > len + 1 {
        return Err(CoercionError::LobPosition(pos));
    }
    Ok(pos as usize - 1)
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
