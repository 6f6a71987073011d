use dbridge_core::{EntityKind, LobKind, Savepoint, Value};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::AppState;
use crate::error::{BridgeError, BridgeResult};
use crate::native::{NativeConnection, NativeCursor};
use crate::registry::{lob_entity_kind, Entity};
use crate::server::dispatch::{descriptor, json, number, ApiCall, Verb};

#[derive(Debug, Deserialize)]
struct PrepareRequest {
    sql: String,
    #[serde(default)]
    generated_keys: bool,
}

#[derive(Debug, Deserialize)]
struct ArrayRequest {
    type_name: String,
    #[serde(default)]
    elements: Vec<Value>,
}

/// Database metadata cursors, picked by the action's last segment.
fn catalog(
    conn: &mut dyn NativeConnection,
    which: &str,
    query: &HashMap<String, String>,
) -> BridgeResult<Box<dyn NativeCursor>> {
    let param = |name: &str| query.get(name).map(String::as_str);
    let table = || {
        param("table")
            .ok_or_else(|| BridgeError::Protocol(format!("metadata/{} needs a table", which)))
    };
    Ok(match which {
        "tables" => conn.tables(param("pattern"))?,
        "columns" => conn.columns(param("table"), param("column"))?,
        "primarykeys" => conn.primary_keys(table()?)?,
        "importedkeys" => conn.imported_keys(table()?)?,
        "typeinfo" => conn.type_info()?,
        "schemas" => conn.schemas()?,
        _ => conn.catalogs()?,
    })
}

pub fn handle(state: &AppState, call: &ApiCall) -> BridgeResult<JsonValue> {
    let registry = &state.registry;
    let reference = &call.reference;

    match (call.verb, call.action().as_slice()) {
        (Verb::Post, ["statement"]) => descriptor(registry.create(
            reference,
            EntityKind::Statement,
            |_, entity| Ok(Some(Entity::Statement(entity.connection()?.create_statement()?))),
        )?),

        (Verb::Post, ["prepared-statement"]) => {
            let request: PrepareRequest = call.body()?;
            descriptor(registry.create(
                reference,
                EntityKind::PreparedStatement,
                |session, entity| {
                    let sql = state.validator.validate(&request.sql, &session.info.subject)?;
                    let stmt = entity.connection()?.prepare(&sql, request.generated_keys)?;
                    Ok(Some(Entity::Statement(stmt)))
                },
            )?)
        }

        (Verb::Get, ["autocommit"]) => {
            registry.with_entity(reference, |_, e| json(e.connection()?.auto_commit()?))
        }
        (Verb::Put, ["autocommit"]) => {
            let enabled: bool = call.body()?;
            registry.with_entity(reference, |_, e| json(e.connection()?.set_auto_commit(enabled)?))
        }
        (Verb::Post, ["commit"]) => {
            registry.with_entity(reference, |_, e| json(e.connection()?.commit()?))
        }
        (Verb::Post, ["rollback"]) => {
            let savepoint: Option<Savepoint> = call.body()?;
            registry.with_entity(reference, |_, e| {
                json(e.connection()?.rollback(savepoint.as_ref())?)
            })
        }
        (Verb::Post, ["savepoint"]) => {
            let name: Option<String> = call.body()?;
            registry.with_entity(reference, |_, e| {
                json(e.connection()?.set_savepoint(name.as_deref())?)
            })
        }
        (Verb::Delete, ["savepoint", id]) => {
            let savepoint = Savepoint {
                id: number(id)?,
                name: None,
            };
            registry.with_entity(reference, |_, e| {
                json(e.connection()?.release_savepoint(&savepoint)?)
            })
        }

        (Verb::Get, ["readonly"]) => {
            registry.with_entity(reference, |_, e| json(e.connection()?.read_only()?))
        }
        (Verb::Put, ["readonly"]) => {
            let read_only: bool = call.body()?;
            registry.with_entity(reference, |_, e| json(e.connection()?.set_read_only(read_only)?))
        }
        (Verb::Get, ["isolation"]) => {
            registry.with_entity(reference, |_, e| json(e.connection()?.transaction_isolation()?))
        }
        (Verb::Put, ["isolation"]) => {
            let level: i32 = call.body()?;
            registry.with_entity(reference, |_, e| {
                json(e.connection()?.set_transaction_isolation(level)?)
            })
        }

        (Verb::Get, ["metadata"]) => registry.with_entity(reference, |session, e| {
            let mut info = e.connection()?.database_info()?;
            info.user_name = Some(session.info.subject.clone());
            json(info)
        }),
        (
            Verb::Post,
            [
                "metadata",
                which @ ("tables" | "columns" | "primarykeys" | "importedkeys" | "typeinfo"
                | "schemas" | "catalogs"),
            ],
        ) => descriptor(registry.create(reference, EntityKind::ResultSet, |_, e| {
            Ok(Some(Entity::Cursor(catalog(e.connection()?, which, &call.query)?)))
        })?),
        (Verb::Get, ["policy"]) => {
            let (session, _) = registry.resolve(reference)?;
            json(session.info.policy.as_ref())
        }

        (Verb::Post, ["nativesql"]) => {
            let sql: String = call.body()?;
            registry.with_entity(reference, |_, e| json(e.connection()?.native_sql(&sql)?))
        }
        (Verb::Get, ["valid"]) => {
            registry.with_entity(reference, |_, e| json(e.connection()?.is_valid()))
        }

        (Verb::Post, [kind @ ("blob" | "clob" | "nclob")]) => {
            let lob_kind = match *kind {
                "blob" => LobKind::Blob,
                "clob" => LobKind::Clob,
                _ => LobKind::NClob,
            };
            descriptor(registry.create(reference, lob_entity_kind(lob_kind), |_, e| {
                Ok(Some(Entity::Lob(e.connection()?.create_lob(lob_kind)?)))
            })?)
        }
        (Verb::Post, ["array"]) => {
            let request: ArrayRequest = call.body()?;
            descriptor(registry.create(reference, EntityKind::Array, |_, e| {
                Ok(Some(Entity::Array(
                    e.connection()?
                        .create_array(&request.type_name, request.elements)?,
                )))
            })?)
        }

        _ => Err(call.no_such_action()),
    }
}
