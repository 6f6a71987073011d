//! Generic entity dispatcher for `/connection/{*path}`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
    response::Json,
};
use dbridge_core::{EntityDescriptor, EntityKind};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;

use super::handlers::{array, connection, lob, resultset, statement, stream, AppState};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::Reference;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn from_method(method: &Method) -> BridgeResult<Verb> {
        if *method == Method::GET {
            Ok(Verb::Get)
        } else if *method == Method::POST {
            Ok(Verb::Post)
        } else if *method == Method::PUT {
            Ok(Verb::Put)
        } else if *method == Method::DELETE {
            Ok(Verb::Delete)
        } else {
            Err(BridgeError::Protocol(format!("method {} is not supported", method)))
        }
    }
}

/// One request against an entity, after path parsing.
#[derive(Debug)]
pub struct ApiCall {
    pub verb: Verb,
    pub reference: Reference,
    pub action: Vec<String>,
    pub query: HashMap<String, String>,
    pub body: JsonValue,
}

impl ApiCall {
    pub fn action(&self) -> Vec<&str> {
        self.action.iter().map(String::as_str).collect()
    }

    pub fn body<T: DeserializeOwned>(&self) -> BridgeResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| BridgeError::Protocol(format!("invalid request body: {}", e)))
    }

    /// Request body, or `T::default()` when none was sent.
    pub fn body_or_default<T: DeserializeOwned + Default>(&self) -> BridgeResult<T> {
        if self.body.is_null() {
            return Ok(T::default());
        }
        self.body()
    }

    pub fn no_such_action(&self) -> BridgeError {
        BridgeError::Protocol(format!(
            "no {:?} action '{}' on {}",
            self.verb,
            self.action.join("/"),
            self.reference.key().kind
        ))
    }
}

/// Parses a numeric path segment.
pub fn number<T: FromStr>(segment: &str) -> BridgeResult<T> {
    segment
        .parse()
        .map_err(|_| BridgeError::Protocol(format!("'{}' is not a number", segment)))
}

pub fn json<T: Serialize>(value: T) -> BridgeResult<JsonValue> {
    Ok(serde_json::to_value(value)?)
}

pub fn descriptor(created: Option<EntityDescriptor>) -> BridgeResult<JsonValue> {
    match created {
        Some(d) => json(d),
        None => Ok(JsonValue::Null),
    }
}

pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<JsonValue>, BridgeError> {
    let verb = Verb::from_method(&method)?;
    let (reference, action) = Reference::parse_path(&format!("/connection/{}", path))?;
    let body = if body.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&body)?
    };

    let call = ApiCall {
        verb,
        reference,
        action,
        query,
        body,
    };
    tracing::debug!("{:?} {} {:?}", call.verb, call.reference, call.action);

    if call.verb == Verb::Delete && call.action.is_empty() {
        state.registry.close(&call.reference)?;
        return Ok(Json(JsonValue::Null));
    }

    if let Some(function) = call.action.first() {
        let (session, _) = state.registry.resolve(&call.reference)?;
        if !session.engine.policy().is_supported(function) {
            return Err(BridgeError::Unsupported(function.clone()));
        }
    }

    let result = match call.reference.key().kind {
        EntityKind::Connection => connection::handle(&state, &call)?,
        EntityKind::Statement | EntityKind::PreparedStatement => statement::handle(&state, &call)?,
        EntityKind::ResultSet => resultset::handle(&state, &call)?,
        EntityKind::Blob | EntityKind::Clob | EntityKind::NClob => lob::handle(&state, &call)?,
        EntityKind::Array => array::handle(&state, &call)?,
        EntityKind::Stream => stream::handle(&state, &call)?,
    };
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_from_method() {
        assert_eq!(Verb::from_method(&Method::PUT).unwrap(), Verb::Put);
        assert!(Verb::from_method(&Method::PATCH).is_err());
    }

    #[test]
    fn test_number_segment() {
        assert_eq!(number::<i64>("-3").unwrap(), -3);
        assert!(matches!(
            number::<usize>("x"),
            Err(BridgeError::Protocol(_))
        ));
    }
}
