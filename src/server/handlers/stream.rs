use dbridge_core::Value;
use serde_json::Value as JsonValue;

use super::AppState;
use crate::error::{BridgeError, BridgeResult};
use crate::server::dispatch::{json, number, ApiCall, Verb};

pub fn handle(state: &AppState, call: &ApiCall) -> BridgeResult<JsonValue> {
    let registry = &state.registry;
    let reference = &call.reference;

    match (call.verb, call.action().as_slice()) {
        (Verb::Get, ["read", max]) => {
            let max: usize = number(max)?;
            registry.with_entity(reference, |_, e| json(Value::Bytes(e.input_stream()?.read(max)?)))
        }
        (Verb::Get, ["available"]) => {
            registry.with_entity(reference, |_, e| json(e.input_stream()?.available()?))
        }
        (Verb::Post, ["skip", n]) => {
            let n: u64 = number(n)?;
            registry.with_entity(reference, |_, e| json(e.input_stream()?.skip(n)?))
        }
        (Verb::Put, ["write"]) => {
            let data = match call.body::<Value>()? {
                Value::Bytes(b) => b,
                Value::String(s) => s.into_bytes(),
                other => {
                    return Err(BridgeError::Protocol(format!(
                        "expected bytes, got {}",
                        other.kind()
                    )))
                }
            };
            registry.with_entity(reference, |_, e| json(e.output_stream()?.write(&data)?))
        }
        (Verb::Post, ["flush"]) => {
            registry.with_entity(reference, |_, e| json(e.output_stream()?.flush()?))
        }
        _ => Err(call.no_such_action()),
    }
}
