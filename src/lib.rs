//! dbridge - drive a relational database session remotely over HTTP.
//!
//! The server keeps native connections, statements, cursors and large
//! objects in an [`registry::Registry`] and exposes them as hierarchical
//! references under `/connection/...`. Values cross the wire as the tagged
//! [`dbridge_core::Value`] and are coerced by the session's
//! [`dbridge_core::CoercionEngine`].

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod native;
pub mod permissions;
pub mod registry;
pub mod server;

pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use registry::{Reference, Registry};
pub use server::{create_router, AppState};
