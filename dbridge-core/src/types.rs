use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The type a caller asks a value to be read or written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    Char,
    String,
    NString,
    Bytes,
    Date,
    Time,
    Timestamp,
    Blob,
    Clob,
    NClob,
    Array,
    Object,
}

impl SqlType {
    pub fn name(&self) -> &'static str {
        match self {
            SqlType::Boolean => "boolean",
            SqlType::Byte => "byte",
            SqlType::Short => "short",
            SqlType::Int => "int",
            SqlType::Long => "long",
            SqlType::Float => "float",
            SqlType::Double => "double",
            SqlType::Decimal => "decimal",
            SqlType::Char => "char",
            SqlType::String => "string",
            SqlType::NString => "nstring",
            SqlType::Bytes => "bytes",
            SqlType::Date => "date",
            SqlType::Time => "time",
            SqlType::Timestamp => "timestamp",
            SqlType::Blob => "blob",
            SqlType::Clob => "clob",
            SqlType::NClob => "nclob",
            SqlType::Array => "array",
            SqlType::Object => "object",
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            SqlType::Byte | SqlType::Short | SqlType::Int | SqlType::Long
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self, SqlType::Float | SqlType::Double | SqlType::Decimal)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, SqlType::Date | SqlType::Time | SqlType::Timestamp)
    }

    /// Inclusive range of an integral type.
    pub fn integral_range(&self) -> Option<(i64, i64)> {
        match self {
            SqlType::Byte => Some((i8::MIN as i64, i8::MAX as i64)),
            SqlType::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            SqlType::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            SqlType::Long => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let ty = match lower.as_str() {
            "boolean" | "bool" => SqlType::Boolean,
            "byte" | "tinyint" => SqlType::Byte,
            "short" | "smallint" => SqlType::Short,
            "int" | "integer" => SqlType::Int,
            "long" | "bigint" => SqlType::Long,
            "float" | "real" => SqlType::Float,
            "double" => SqlType::Double,
            "decimal" | "bigdecimal" | "numeric" => SqlType::Decimal,
            "char" => SqlType::Char,
            "string" => SqlType::String,
            "nstring" => SqlType::NString,
            "bytes" => SqlType::Bytes,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "timestamp" => SqlType::Timestamp,
            "blob" => SqlType::Blob,
            "clob" => SqlType::Clob,
            "nclob" => SqlType::NClob,
            "array" => SqlType::Array,
            "object" => SqlType::Object,
            _ => return Err(format!("unknown type '{}'", s)),
        };
        Ok(ty)
    }
}

/// Column type as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    Null,
    Boolean,
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    NChar,
    NVarchar,
    Binary,
    VarBinary,
    LongVarBinary,
    Date,
    Time,
    Timestamp,
    TimeWithTimezone,
    TimestampWithTimezone,
    Blob,
    Clob,
    NClob,
    Array,
    Other,
}

impl WireType {
    /// Numeric code of the type in the usual SQL type numbering.
    pub fn code(&self) -> i32 {
        match self {
            WireType::Null => 0,
            WireType::Boolean => 16,
            WireType::Bit => -7,
            WireType::TinyInt => -6,
            WireType::SmallInt => 5,
            WireType::Integer => 4,
            WireType::BigInt => -5,
            WireType::Real => 7,
            WireType::Float => 6,
            WireType::Double => 8,
            WireType::Numeric => 2,
            WireType::Decimal => 3,
            WireType::Char => 1,
            WireType::Varchar => 12,
            WireType::LongVarchar => -1,
            WireType::NChar => -15,
            WireType::NVarchar => -9,
            WireType::Binary => -2,
            WireType::VarBinary => -3,
            WireType::LongVarBinary => -4,
            WireType::Date => 91,
            WireType::Time => 92,
            WireType::Timestamp => 93,
            WireType::TimeWithTimezone => 2013,
            WireType::TimestampWithTimezone => 2014,
            WireType::Blob => 2004,
            WireType::Clob => 2005,
            WireType::NClob => 2011,
            WireType::Array => 2003,
            WireType::Other => 1111,
        }
    }

    pub fn carries_timezone(&self) -> bool {
        matches!(
            self,
            WireType::TimeWithTimezone | WireType::TimestampWithTimezone
        )
    }

    /// The narrow type values of this column are declared as.
    pub fn declared_type(&self) -> SqlType {
        match self {
            WireType::Boolean | WireType::Bit => SqlType::Boolean,
            WireType::TinyInt => SqlType::Byte,
            WireType::SmallInt => SqlType::Short,
            WireType::Integer => SqlType::Int,
            WireType::BigInt => SqlType::Long,
            WireType::Real => SqlType::Float,
            WireType::Float | WireType::Double => SqlType::Double,
            WireType::Numeric | WireType::Decimal => SqlType::Decimal,
            WireType::Char => SqlType::Char,
            WireType::Varchar | WireType::LongVarchar => SqlType::String,
            WireType::NChar | WireType::NVarchar => SqlType::NString,
            WireType::Binary | WireType::VarBinary | WireType::LongVarBinary => SqlType::Bytes,
            WireType::Date => SqlType::Date,
            WireType::Time | WireType::TimeWithTimezone => SqlType::Time,
            WireType::Timestamp | WireType::TimestampWithTimezone => SqlType::Timestamp,
            WireType::Blob => SqlType::Blob,
            WireType::Clob => SqlType::Clob,
            WireType::NClob => SqlType::NClob,
            WireType::Array => SqlType::Array,
            WireType::Null | WireType::Other => SqlType::Object,
        }
    }

    /// Map a declared column type name (as found in DDL) to a wire type.
    pub fn from_decl(decl: &str) -> WireType {
        let upper = decl.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "BOOLEAN" | "BOOL" => WireType::Boolean,
            "BIT" => WireType::Bit,
            "TINYINT" => WireType::TinyInt,
            "SMALLINT" => WireType::SmallInt,
            "INT" | "INTEGER" | "MEDIUMINT" => WireType::Integer,
            "BIGINT" => WireType::BigInt,
            "REAL" => WireType::Real,
            "FLOAT" => WireType::Float,
            "DOUBLE" | "DOUBLE PRECISION" => WireType::Double,
            "NUMERIC" => WireType::Numeric,
            "DECIMAL" => WireType::Decimal,
            "CHAR" | "CHARACTER" => WireType::Char,
            "VARCHAR" | "VARYING CHARACTER" => WireType::Varchar,
            "TEXT" => WireType::LongVarchar,
            "NCHAR" => WireType::NChar,
            "NVARCHAR" => WireType::NVarchar,
            "BINARY" => WireType::Binary,
            "VARBINARY" => WireType::VarBinary,
            "DATE" => WireType::Date,
            "TIME" => WireType::Time,
            "DATETIME" | "TIMESTAMP" => WireType::Timestamp,
            "TIMETZ" | "TIME WITH TIME ZONE" => WireType::TimeWithTimezone,
            "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => WireType::TimestampWithTimezone,
            "BLOB" => WireType::Blob,
            "CLOB" => WireType::Clob,
            "NCLOB" => WireType::NClob,
            "ARRAY" => WireType::Array,
            "" => WireType::Null,
            _ => WireType::Other,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
