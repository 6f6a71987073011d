pub mod array;
pub mod connection;
pub mod lob;
pub mod resultset;
pub mod statement;
pub mod stream;
pub mod system;

pub use system::*;
