use dbridge_core::Value;
use reqwest::Method;

use crate::error::RemoteResult;
use crate::handle::Handle;
use crate::lob::bytes_of;

/// A reader or writer opened on a server-side large object.
///
/// Streams are entities of their own and stay open until closed, or until
/// the object or connection they belong to is closed.
pub struct RemoteStream {
    handle: Handle,
}

impl RemoteStream {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub fn url(&self) -> &str {
        self.handle.url()
    }

    /// Reads up to `max` bytes; an empty result means end of stream.
    pub async fn read(&self, max: usize) -> RemoteResult<Vec<u8>> {
        bytes_of(self.handle.get(&format!("read/{}", max)).await?)
    }

    pub async fn available(&self) -> RemoteResult<usize> {
        self.handle.get("available").await
    }

    pub async fn skip(&self, n: u64) -> RemoteResult<u64> {
        self.handle.post(&format!("skip/{}", n), ()).await
    }

    pub async fn write(&self, data: &[u8]) -> RemoteResult<()> {
        self.handle.put("write", Value::Bytes(data.to_vec())).await
    }

    pub async fn flush(&self) -> RemoteResult<()> {
        self.handle.send(Method::POST, "flush").await
    }

    pub async fn close(&self) -> RemoteResult<()> {
        self.handle.close().await
    }
}
