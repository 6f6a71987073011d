use dbridge_core::{EntityKind, Value};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::AppState;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::Entity;
use crate::server::dispatch::{descriptor, json, number, ApiCall, Verb};

#[derive(Debug, Deserialize)]
struct PositionRequest {
    pattern: Value,
    #[serde(default = "first_position")]
    start: u64,
}

fn first_position() -> u64 {
    1
}

/// Raw bytes of a pattern or write payload: bytes as-is, text as UTF-8.
fn payload(value: Value) -> BridgeResult<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b),
        Value::String(s) => Ok(s.into_bytes()),
        Value::Lob(lob) => Ok(lob.all_bytes()?.to_vec()),
        other => Err(BridgeError::Protocol(format!(
            "expected bytes or text, got {}",
            other.kind()
        ))),
    }
}

pub fn handle(state: &AppState, call: &ApiCall) -> BridgeResult<JsonValue> {
    let registry = &state.registry;
    let reference = &call.reference;

    match (call.verb, call.action().as_slice()) {
        (Verb::Get, ["length"]) => registry.with_entity(reference, |_, e| json(e.lob()?.length()?)),
        (Verb::Get, ["bytes", pos, len]) => {
            let (pos, len): (u64, usize) = (number(pos)?, number(len)?);
            registry.with_entity(reference, |_, e| json(Value::Bytes(e.lob()?.read(pos, len)?)))
        }
        (Verb::Get, ["substring", pos, len]) => {
            let (pos, len): (u64, usize) = (number(pos)?, number(len)?);
            registry.with_entity(reference, |_, e| {
                let bytes = e.lob()?.read(pos, len)?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| BridgeError::Protocol("object does not hold text".into()))?;
                json(text)
            })
        }
        (Verb::Get, ["content"]) => {
            registry.with_entity(reference, |_, e| json(Value::Lob(e.lob()?.snapshot()?)))
        }
        (Verb::Post, ["position"]) => {
            let request: PositionRequest = call.body()?;
            let pattern = payload(request.pattern)?;
            registry.with_entity(reference, |_, e| {
                json(e.lob()?.position(&pattern, request.start)?)
            })
        }

        (Verb::Put, ["bytes" | "string", pos]) => {
            let pos: u64 = number(pos)?;
            let data = payload(call.body()?)?;
            registry.with_entity(reference, |_, e| json(e.lob()?.write(pos, &data)?))
        }
        (Verb::Post, ["truncate", len]) => {
            let len: u64 = number(len)?;
            registry.with_entity(reference, |_, e| json(e.lob()?.truncate(len)?))
        }

        (Verb::Post, ["stream"]) => descriptor(registry.create(
            reference,
            EntityKind::Stream,
            |_, e| Ok(Some(Entity::InputStream(e.lob()?.reader()?))),
        )?),
        (Verb::Post, ["writer", pos]) => {
            let pos: u64 = number(pos)?;
            descriptor(registry.create(reference, EntityKind::Stream, |_, e| {
                Ok(Some(Entity::OutputStream(e.lob()?.writer(pos)?)))
            })?)
        }

        (Verb::Delete, ["free"]) => {
            registry.close(reference)?;
            Ok(JsonValue::Null)
        }
        _ => Err(call.no_such_action()),
    }
}
