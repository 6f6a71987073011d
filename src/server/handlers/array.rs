use dbridge_core::EntityKind;
use serde_json::Value as JsonValue;

use super::AppState;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::Entity;
use crate::server::dispatch::{descriptor, json, number, ApiCall, Verb};

pub fn handle(state: &AppState, call: &ApiCall) -> BridgeResult<JsonValue> {
    let registry = &state.registry;
    let reference = &call.reference;

    match (call.verb, call.action().as_slice()) {
        (Verb::Get, ["basetype"]) => {
            registry.with_entity(reference, |_, e| json(e.array()?.base_type_name()))
        }
        (Verb::Get, ["elements"]) => {
            registry.with_entity(reference, |_, e| json(e.array()?.elements()?))
        }
        (Verb::Get, ["elements", index, count]) => {
            let (index, count): (usize, usize) = (number(index)?, number(count)?);
            registry.with_entity(reference, |_, e| {
                let elements = e.array()?.elements()?;
                if index == 0 || index > elements.len() + 1 {
                    return Err(BridgeError::Protocol(format!(
                        "array index {} out of range (1..={})",
                        index,
                        elements.len()
                    )));
                }
                let slice: Vec<_> = elements.into_iter().skip(index - 1).take(count).collect();
                json(slice)
            })
        }
        (Verb::Post, ["resultset"]) => descriptor(registry.create(
            reference,
            EntityKind::ResultSet,
            |_, e| Ok(Some(Entity::Cursor(e.array()?.result_set()?))),
        )?),
        (Verb::Delete, ["free"]) => {
            registry.close(reference)?;
            Ok(JsonValue::Null)
        }
        _ => Err(call.no_such_action()),
    }
}
