use dbridge_core::{ErrorKind, Value};

use crate::cursor::RemoteCursor;
use crate::error::{RemoteError, RemoteResult};
use crate::handle::Handle;

enum Elements {
    Remote(Handle),
    Inline(Vec<Value>),
}

/// A SQL ARRAY, either held by the server or carried inline in a row.
pub struct RemoteArray {
    base_type: String,
    elements: Elements,
}

impl RemoteArray {
    pub(crate) fn remote(handle: Handle) -> Self {
        let base_type = handle
            .descriptor()
            .field("baseType")
            .unwrap_or_default();
        Self {
            base_type,
            elements: Elements::Remote(handle),
        }
    }

    pub(crate) fn inline(base_type: String, elements: Vec<Value>) -> Self {
        Self {
            base_type,
            elements: Elements::Inline(elements),
        }
    }

    pub fn base_type_name(&self) -> &str {
        &self.base_type
    }

    pub async fn elements(&self) -> RemoteResult<Vec<Value>> {
        match &self.elements {
            Elements::Remote(h) => h.get("elements").await,
            Elements::Inline(items) => Ok(items.clone()),
        }
    }

    /// `count` elements from 1-based `index`.
    pub async fn slice(&self, index: usize, count: usize) -> RemoteResult<Vec<Value>> {
        match &self.elements {
            Elements::Remote(h) => h.get(&format!("elements/{}/{}", index, count)).await,
            Elements::Inline(items) => {
                if index == 0 || index > items.len() + 1 {
                    return Err(RemoteError::local(
                        ErrorKind::Protocol,
                        format!("array index {} out of range (1..={})", index, items.len()),
                    ));
                }
                Ok(items.iter().skip(index - 1).take(count).cloned().collect())
            }
        }
    }

    /// A cursor over `(INDEX, VALUE)` rows, opened on the server.
    pub async fn result_set(&self) -> RemoteResult<RemoteCursor> {
        match &self.elements {
            Elements::Remote(h) => {
                let desc = h.post("resultset", ()).await?;
                Ok(RemoteCursor::new(h.child(desc)))
            }
            Elements::Inline(_) => Err(RemoteError::local(
                ErrorKind::UnsupportedOperation,
                "result set over an inline array",
            )),
        }
    }

    pub fn to_value(&self) -> Value {
        match &self.elements {
            Elements::Remote(h) => Value::Ref(h.descriptor().clone()),
            Elements::Inline(items) => Value::Array(items.clone()),
        }
    }

    pub async fn free(&self) -> RemoteResult<()> {
        match &self.elements {
            Elements::Remote(h) => h.free().await,
            Elements::Inline(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inline_slice_bounds() {
        let array = RemoteArray::inline(
            "INTEGER".into(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        );
        assert_eq!(array.base_type_name(), "INTEGER");
        assert_eq!(
            array.slice(2, 5).await.unwrap(),
            vec![Value::Int(2), Value::Int(3)]
        );
        assert!(array.slice(4, 1).await.unwrap().is_empty());
        assert!(array.slice(0, 1).await.is_err());
        assert_eq!(array.to_value(), Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }
}
