//! dbridge Rust Client
//!
//! Remote object proxies for a dbridge server: connections, statements,
//! cursors, large objects and arrays that behave like their native
//! counterparts while every call travels over HTTP.
//!
//! Cursors cache the whole current row on each positioning call, so column
//! reads cost no round trip and are coerced locally under the session's
//! conversion policy.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbridge_client::RemoteDriverBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dbridge_client::RemoteError> {
//!     let conn = RemoteDriverBuilder::new("http://localhost:6745")
//!         .url("sqlite::memory:")
//!         .connect()
//!         .await?;
//!
//!     let stmt = conn.create_statement().await?;
//!     let mut rs = stmt.execute_query(Some("SELECT 1 AS one")).await?;
//!     while rs.next().await? {
//!         println!("one = {}", rs.get_int(1).await?);
//!     }
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

mod array;
mod builder;
mod connection;
mod cursor;
mod driver;
mod error;
mod handle;
mod lob;
mod statement;
mod stream;
pub mod transport;

pub use array::RemoteArray;
pub use builder::RemoteDriverBuilder;
pub use connection::RemoteConnection;
pub use cursor::{Column, RemoteCursor};
pub use driver::RemoteDriver;
pub use error::{RemoteError, RemoteResult};
pub use lob::RemoteLob;
pub use statement::{Execution, RemoteStatement};
pub use stream::RemoteStream;
pub use transport::{HttpTransport, Transport};

pub use dbridge_core::{ErrorKind, LargeObject, LobKind, SqlType, Value};
