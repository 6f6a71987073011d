use dbridge_core::{CastRequest, EntityKind, ExecuteOutcome, ParameterValue, Value};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::AppState;
use crate::error::{BridgeError, BridgeResult};
use crate::native::NativeStatement;
use crate::registry::{Entity, Reference, Session};
use crate::server::dispatch::{descriptor, json, ApiCall, Verb};

#[derive(Debug, Default, Deserialize)]
struct SqlRequest {
    #[serde(default)]
    sql: Option<String>,
}

/// Runs the validator on the SQL about to execute: the request text for
/// plain statements, the prepared text otherwise.
fn checked_sql(
    state: &AppState,
    session: &Session,
    stmt: &dyn NativeStatement,
    requested: Option<&str>,
) -> BridgeResult<String> {
    let sql = stmt
        .sql()
        .or(requested)
        .ok_or_else(|| BridgeError::Protocol("no SQL text given".into()))?;
    state.validator.validate(sql, &session.info.subject)
}

/// Replaces references to server-side LOBs and arrays by their content and
/// applies the declared parameter type.
fn bind_value(state: &AppState, session: &Session, param: ParameterValue) -> BridgeResult<Value> {
    let value = match param.value {
        Value::Ref(desc) => {
            let (reference, _) = Reference::parse_path(&desc.url)?;
            state.registry.with_entity(&reference, |_, e| match e {
                Entity::Lob(lob) => Ok(Value::Lob(lob.snapshot()?)),
                Entity::Array(array) => Ok(Value::Array(array.elements()?)),
                other => Err(BridgeError::Protocol(format!(
                    "a {} cannot be bound as a parameter",
                    other.name()
                ))),
            })?
        }
        other => other,
    };

    match param.declared {
        Some(declared) if !value.is_null() && value.natural_type() != declared => {
            Ok(session.engine.cast(&CastRequest::new(value, declared))?.value)
        }
        _ => Ok(value),
    }
}

pub fn handle(state: &AppState, call: &ApiCall) -> BridgeResult<JsonValue> {
    let registry = &state.registry;
    let reference = &call.reference;

    match (call.verb, call.action().as_slice()) {
        (Verb::Post, ["query"]) => {
            let request: SqlRequest = call.body_or_default()?;
            descriptor(registry.create(reference, EntityKind::ResultSet, |session, e| {
                let stmt = e.statement()?;
                let sql = checked_sql(state, session, stmt, request.sql.as_deref())?;
                Ok(Some(Entity::Cursor(stmt.execute_query(Some(&sql))?)))
            })?)
        }
        (Verb::Post, ["update"]) => {
            let request: SqlRequest = call.body_or_default()?;
            registry.with_entity(reference, |session, e| {
                let stmt = e.statement()?;
                let sql = checked_sql(state, session, stmt, request.sql.as_deref())?;
                json(stmt.execute_update(Some(&sql))?)
            })
        }
        (Verb::Post, ["execute"]) => {
            let request: SqlRequest = call.body_or_default()?;
            let cursor = registry.create(reference, EntityKind::ResultSet, |session, e| {
                let stmt = e.statement()?;
                let sql = checked_sql(state, session, stmt, request.sql.as_deref())?;
                if stmt.execute(Some(&sql))? {
                    Ok(stmt.result_set()?.map(Entity::Cursor))
                } else {
                    Ok(None)
                }
            })?;
            let outcome = match cursor {
                Some(cursor) => ExecuteOutcome::ResultSet { cursor },
                None => ExecuteOutcome::UpdateCount {
                    count: registry.with_entity(reference, |_, e| Ok(e.statement()?.update_count()))?,
                },
            };
            json(outcome)
        }
        (Verb::Get, ["resultset"]) => descriptor(registry.create(
            reference,
            EntityKind::ResultSet,
            |_, e| Ok(e.statement()?.result_set()?.map(Entity::Cursor)),
        )?),
        (Verb::Get, ["updatecount"]) => {
            registry.with_entity(reference, |_, e| json(e.statement()?.update_count()))
        }

        (Verb::Post, ["batch"]) => {
            let request: SqlRequest = call.body_or_default()?;
            registry.with_entity(reference, |session, e| {
                let stmt = e.statement()?;
                let sql = checked_sql(state, session, stmt, request.sql.as_deref())?;
                json(stmt.add_batch(Some(&sql))?)
            })
        }
        (Verb::Delete, ["batch"]) => registry.with_entity(reference, |_, e| {
            e.statement()?.clear_batch();
            Ok(JsonValue::Null)
        }),
        (Verb::Post, ["executebatch"]) => {
            registry.with_entity(reference, |_, e| json(e.statement()?.execute_batch()?))
        }

        (Verb::Put, ["parameter"]) => {
            let param: ParameterValue = call.body()?;
            let index = param.index;
            let (session, _) = registry.resolve(reference)?;
            let value = bind_value(state, &session, param)?;
            registry.with_entity(reference, |_, e| {
                json(e.statement()?.set_parameter(index, value)?)
            })
        }
        (Verb::Delete, ["parameters"]) => registry.with_entity(reference, |_, e| {
            e.statement()?.clear_parameters();
            Ok(JsonValue::Null)
        }),

        (Verb::Get, ["generatedkeys"]) => descriptor(registry.create(
            reference,
            EntityKind::ResultSet,
            |_, e| Ok(e.statement()?.generated_keys()?.map(Entity::Cursor)),
        )?),

        (Verb::Post, ["cancel"]) => {
            // Runs without the entity lock, which the executing request holds.
            let (_, slot) = registry.resolve(reference)?;
            let canceller = slot
                .canceller()
                .ok_or_else(|| BridgeError::Unsupported("cancel".into()))?;
            tracing::info!("Cancelling {}", reference);
            canceller.cancel();
            Ok(JsonValue::Null)
        }
        (Verb::Get, ["querytimeout"]) => {
            registry.with_entity(reference, |_, e| json(e.statement()?.query_timeout()))
        }
        (Verb::Put, ["querytimeout"]) => {
            let seconds: u32 = call.body()?;
            registry.with_entity(reference, |_, e| {
                e.statement()?.set_query_timeout(seconds);
                Ok(JsonValue::Null)
            })
        }
        (Verb::Get, ["maxrows"]) => {
            registry.with_entity(reference, |_, e| json(e.statement()?.max_rows()))
        }
        (Verb::Put, ["maxrows"]) => {
            let rows: usize = call.body()?;
            registry.with_entity(reference, |_, e| {
                e.statement()?.set_max_rows(rows);
                Ok(JsonValue::Null)
            })
        }
        (Verb::Get, ["sql"]) => {
            registry.with_entity(reference, |_, e| json(e.statement()?.sql()))
        }

        _ => Err(call.no_such_action()),
    }
}
