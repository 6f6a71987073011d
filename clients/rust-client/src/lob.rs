use dbridge_core::{ErrorKind, LargeObject, LobKind, Value};
use reqwest::Method;
use serde_json::json;

use crate::error::{RemoteError, RemoteResult};
use crate::handle::Handle;
use crate::stream::RemoteStream;

/// Bytes carried by a `bytes` value.
pub(crate) fn bytes_of(value: Value) -> RemoteResult<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b),
        other => Err(RemoteError::Protocol(format!(
            "expected bytes, got {}",
            other.kind()
        ))),
    }
}

enum Content {
    Remote(Handle),
    Inline(LargeObject),
}

/// A BLOB, CLOB or NCLOB.
///
/// Objects read through a cursor snapshot may be inline, carrying their whole
/// content (or only their length when the policy made them partial); objects
/// created on the connection live on the server and every call is a request.
pub struct RemoteLob {
    kind: LobKind,
    content: Content,
}

impl RemoteLob {
    pub(crate) fn remote(handle: Handle) -> Self {
        let kind = match handle.descriptor().kind.prefix() {
            "clob" => LobKind::Clob,
            "nclob" => LobKind::NClob,
            _ => LobKind::Blob,
        };
        Self {
            kind,
            content: Content::Remote(handle),
        }
    }

    pub(crate) fn inline(lob: LargeObject) -> Self {
        Self {
            kind: lob.kind,
            content: Content::Inline(lob),
        }
    }

    pub fn kind(&self) -> LobKind {
        self.kind
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.content, Content::Remote(_))
    }

    /// Length in bytes, or in characters for CLOB and NCLOB.
    pub async fn length(&self) -> RemoteResult<u64> {
        match &self.content {
            Content::Remote(h) => h.get("length").await,
            Content::Inline(lob) => Ok(lob.length()),
        }
    }

    /// Up to `len` bytes from 1-based position `pos`.
    pub async fn bytes(&self, pos: u64, len: usize) -> RemoteResult<Vec<u8>> {
        match &self.content {
            Content::Remote(h) => bytes_of(h.get(&format!("bytes/{}/{}", pos, len)).await?),
            Content::Inline(lob) => Ok(lob.bytes(pos, len)?),
        }
    }

    /// Up to `len` characters from 1-based position `pos`.
    pub async fn sub_string(&self, pos: u64, len: usize) -> RemoteResult<String> {
        match &self.content {
            Content::Remote(h) => h.get(&format!("substring/{}/{}", pos, len)).await,
            Content::Inline(lob) => Ok(lob.sub_string(pos, len)?),
        }
    }

    /// The whole object.
    pub async fn content(&self) -> RemoteResult<LargeObject> {
        match &self.content {
            Content::Remote(h) => match h.get("content").await? {
                Value::Lob(lob) => Ok(lob),
                other => Err(RemoteError::Protocol(format!(
                    "expected a large object, got {}",
                    other.kind()
                ))),
            },
            Content::Inline(lob) => {
                lob.all_bytes()?;
                Ok(lob.clone())
            }
        }
    }

    pub async fn text(&self) -> RemoteResult<String> {
        Ok(self.content().await?.text()?)
    }

    /// 1-based position of `pattern` at or after `start`.
    pub async fn position(&self, pattern: &[u8], start: u64) -> RemoteResult<Option<u64>> {
        match &self.content {
            Content::Remote(h) => {
                h.post(
                    "position",
                    json!({ "pattern": Value::Bytes(pattern.to_vec()), "start": start }),
                )
                .await
            }
            Content::Inline(lob) => Ok(lob.position(pattern, start)?),
        }
    }

    pub async fn set_bytes(&mut self, pos: u64, data: &[u8]) -> RemoteResult<usize> {
        match &mut self.content {
            Content::Remote(h) => {
                h.call(
                    Method::PUT,
                    &format!("bytes/{}", pos),
                    Some(serde_json::to_value(Value::Bytes(data.to_vec()))?),
                )
                .await
            }
            Content::Inline(lob) => Ok(lob.write_at(pos, data)?),
        }
    }

    pub async fn set_string(&mut self, pos: u64, text: &str) -> RemoteResult<usize> {
        match &mut self.content {
            Content::Remote(h) => {
                h.call(
                    Method::PUT,
                    &format!("string/{}", pos),
                    Some(serde_json::to_value(Value::String(text.to_string()))?),
                )
                .await
            }
            Content::Inline(lob) => Ok(lob.write_at(pos, text.as_bytes())?),
        }
    }

    pub async fn truncate(&mut self, len: u64) -> RemoteResult<()> {
        match &mut self.content {
            Content::Remote(h) => h.send(Method::POST, &format!("truncate/{}", len)).await,
            Content::Inline(lob) => Ok(lob.truncate(len)?),
        }
    }

    fn server_side(&self, operation: &str) -> RemoteResult<&Handle> {
        match &self.content {
            Content::Remote(h) => Ok(h),
            Content::Inline(_) => Err(RemoteError::local(
                ErrorKind::UnsupportedOperation,
                format!("{} on an inline large object", operation),
            )),
        }
    }

    /// Opens a server-side reader over the object.
    pub async fn stream(&self) -> RemoteResult<RemoteStream> {
        let handle = self.server_side("stream")?;
        let desc = handle.post("stream", ()).await?;
        Ok(RemoteStream::new(handle.child(desc)))
    }

    /// Opens a server-side writer starting at 1-based position `pos`.
    pub async fn writer(&self, pos: u64) -> RemoteResult<RemoteStream> {
        let handle = self.server_side("writer")?;
        let desc = handle.post(&format!("writer/{}", pos), ()).await?;
        Ok(RemoteStream::new(handle.child(desc)))
    }

    /// The value to bind when passing this object as a parameter.
    pub fn to_value(&self) -> Value {
        match &self.content {
            Content::Remote(h) => Value::Ref(h.descriptor().clone()),
            Content::Inline(lob) => Value::Lob(lob.clone()),
        }
    }

    pub async fn free(&self) -> RemoteResult<()> {
        match &self.content {
            Content::Remote(h) => h.free().await,
            Content::Inline(_) => Ok(()),
        }
    }
}
