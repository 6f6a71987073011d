//! dbridge Core - value model and conversion contract shared by server and client.
//!
//! This crate holds everything both ends of the bridge must agree on, without
//! any HTTP or native driver dependencies:
//!
//! - **Value**: the closed, tagged value variant that travels on the wire
//! - **Types**: `SqlType` (requested Rust-side types) and `WireType` (backend column types)
//! - **Policy**: `ConversionPolicy`, the per-session conversion options
//! - **Coercion**: the rule table and the engine applying it
//! - **Wire**: entity descriptors, row snapshots, metadata and request bodies
//! - **Error**: transportable error ancestry
//!
//! # Example
//!
//! ```rust
//! use dbridge_core::{CastRequest, CoercionEngine, ConversionPolicy, SqlType, Value};
//!
//! let engine = CoercionEngine::new(ConversionPolicy::default()).unwrap();
//!
//! let cast = engine.cast(&CastRequest::new(Value::Bool(true), SqlType::Int)).unwrap();
//! assert_eq!(cast.value, Value::Int(1));
//!
//! assert!(engine.cast(&CastRequest::new(Value::Int(300), SqlType::Byte)).is_err());
//! ```

pub mod coerce;
pub mod error;
pub mod policy;
pub mod types;
pub mod value;
pub mod wire;

pub use coerce::{conversion_rule, Cast, CastRequest, CoercionEngine, Rule};
pub use error::{CoercionError, ErrorKind, TransportableError};
pub use policy::{ConversionPolicy, FieldCopy, LobMode, NumberToBoolean, Rounding};
pub use types::{SqlType, WireType};
pub use value::{LargeObject, LobKind, Value, ValueKind};
pub use wire::{
    ColumnMeta, ConnectRequest, DatabaseInfo, EntityDescriptor, EntityKind, ExecuteOutcome,
    ParameterValue, ResultMetadata, RowData, Savepoint,
};
