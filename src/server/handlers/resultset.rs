//! Cursor positioning and column reads.
//!
//! The `*row` positioning actions answer with the whole current row as a
//! `RowData` snapshot so the client can serve column reads locally. LOB and
//! array cells found in a row are registered as children of the cursor and
//! travel as `ref` values.

use dbridge_core::{CastRequest, EntityDescriptor, RowData, SqlType, Value};
use serde_json::Value as JsonValue;

use super::AppState;
use crate::error::{BridgeError, BridgeResult};
use crate::native::{Cell, NativeCursor, NativeResult};
use crate::registry::{Entity, Reference};
use crate::server::dispatch::{json, number, ApiCall, Verb};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Next,
    Previous,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
}

impl Motion {
    /// Parses `next`, `absolute/3`, ... and their `*row` snapshot variants.
    fn parse(action: &[&str]) -> BridgeResult<Option<(Motion, bool)>> {
        let (name, arg) = match action {
            [name] => (*name, None),
            [name, arg] => (*name, Some(*arg)),
            _ => return Ok(None),
        };
        let (base, with_row) = match name.strip_suffix("row") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let motion = match (base, arg) {
            ("next", None) => Motion::Next,
            ("previous", None) => Motion::Previous,
            ("first", None) => Motion::First,
            ("last", None) => Motion::Last,
            ("absolute", Some(n)) => Motion::Absolute(number(n)?),
            ("relative", Some(n)) => Motion::Relative(number(n)?),
            _ => return Ok(None),
        };
        Ok(Some((motion, with_row)))
    }

    fn apply(self, cursor: &mut dyn NativeCursor) -> NativeResult<bool> {
        match self {
            Motion::Next => cursor.next(),
            Motion::Previous => cursor.previous(),
            Motion::First => cursor.first(),
            Motion::Last => cursor.last(),
            Motion::Absolute(row) => cursor.absolute(row),
            Motion::Relative(rows) => cursor.relative(rows),
        }
    }
}

/// Turns a cell into a wire value, registering LOB and array cells under the
/// cursor.
fn cell_value(state: &AppState, cursor: &Reference, cell: Cell) -> BridgeResult<Value> {
    match Entity::from_cell(cell) {
        Ok((kind, entity)) => {
            let desc: EntityDescriptor = state.registry.register_value(cursor, kind, entity)?;
            Ok(Value::Ref(desc))
        }
        Err(value) => Ok(value),
    }
}

fn position(state: &AppState, call: &ApiCall, motion: Motion, with_row: bool) -> BridgeResult<JsonValue> {
    let (moved, cells) = state.registry.with_entity(&call.reference, |_, e| {
        let cursor = e.cursor()?;
        let moved = motion.apply(cursor)?;
        let mut cells = Vec::new();
        if moved && with_row {
            for column in 1..=cursor.metadata().column_count() {
                cells.push(cursor.cell(column)?);
            }
        }
        Ok((moved, cells))
    })?;

    if !with_row {
        return json(moved);
    }
    if !moved {
        return json(RowData::not_moved());
    }
    let row = cells
        .into_iter()
        .map(|cell| cell_value(state, &call.reference, cell))
        .collect::<BridgeResult<Vec<_>>>()?;
    json(RowData::moved(row))
}

/// Reads one column, coerced to `target` with the session engine.
fn read_column(state: &AppState, call: &ApiCall, target: &str, column: ColumnRef) -> BridgeResult<JsonValue> {
    let target: SqlType = target
        .parse()
        .map_err(|e: String| BridgeError::Protocol(e))?;

    let (cell, meta, engine) = state.registry.with_entity(&call.reference, |session, e| {
        let cursor = e.cursor()?;
        let index = match &column {
            ColumnRef::Index(i) => *i,
            ColumnRef::Label(label) => cursor.metadata().find_column(label)?,
        };
        let meta = cursor.metadata().column(index)?.clone();
        Ok((cursor.cell(index)?, meta, session.engine.clone()))
    })?;

    let value = match cell {
        Cell::Value(v) => v,
        lob_or_array => {
            if matches!(
                target,
                SqlType::Blob | SqlType::Clob | SqlType::NClob | SqlType::Array | SqlType::Object
            ) {
                return json(cell_value(state, &call.reference, lob_or_array)?);
            }
            match lob_or_array {
                Cell::Lob(lob) => Value::Lob(lob.snapshot()?),
                Cell::Array(array) => Value::Array(array.elements()?),
                Cell::Value(v) => v,
            }
        }
    };

    let request = CastRequest::new(value, target)
        .declared(meta.declared_type())
        .wire(meta.wire_type);
    json(engine.cast(&request)?.value)
}

enum ColumnRef {
    Index(usize),
    Label(String),
}

pub fn handle(state: &AppState, call: &ApiCall) -> BridgeResult<JsonValue> {
    let registry = &state.registry;
    let reference = &call.reference;
    let action = call.action();

    if call.verb == Verb::Post {
        if let Some((motion, with_row)) = Motion::parse(&action)? {
            return position(state, call, motion, with_row);
        }
    }

    match (call.verb, action.as_slice()) {
        (Verb::Post, ["beforefirst"]) => {
            registry.with_entity(reference, |_, e| json(e.cursor()?.before_first()?))
        }
        (Verb::Post, ["afterlast"]) => {
            registry.with_entity(reference, |_, e| json(e.cursor()?.after_last()?))
        }
        (Verb::Get, ["beforefirst"]) => {
            registry.with_entity(reference, |_, e| json(e.cursor()?.is_before_first()))
        }
        (Verb::Get, ["afterlast"]) => {
            registry.with_entity(reference, |_, e| json(e.cursor()?.is_after_last()))
        }
        (Verb::Get, ["row"]) => registry.with_entity(reference, |_, e| json(e.cursor()?.row())),
        (Verb::Get, ["metadata"]) => {
            registry.with_entity(reference, |_, e| json(e.cursor()?.metadata()))
        }

        (Verb::Get, [target, "index", index]) => {
            read_column(state, call, target, ColumnRef::Index(number(index)?))
        }
        (Verb::Get, [target, "label", label]) => {
            read_column(state, call, target, ColumnRef::Label(label.to_string()))
        }
        (Verb::Get, ["wasnull"]) => {
            registry.with_entity(reference, |_, e| json(e.cursor()?.was_null()))
        }
        (Verb::Get, ["findcolumn", label]) => registry.with_entity(reference, |_, e| {
            json(e.cursor()?.metadata().find_column(label)?)
        }),

        (Verb::Get, ["fetchsize"]) => {
            registry.with_entity(reference, |_, e| json(e.cursor()?.fetch_size()))
        }
        (Verb::Put, ["fetchsize"]) => {
            let rows: usize = call.body()?;
            registry.with_entity(reference, |_, e| {
                e.cursor()?.set_fetch_size(rows);
                Ok(JsonValue::Null)
            })
        }

        _ => Err(call.no_such_action()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_parse() {
        assert_eq!(
            Motion::parse(&["nextrow"]).unwrap(),
            Some((Motion::Next, true))
        );
        assert_eq!(
            Motion::parse(&["absolute", "-2"]).unwrap(),
            Some((Motion::Absolute(-2), false))
        );
        assert_eq!(
            Motion::parse(&["relativerow", "3"]).unwrap(),
            Some((Motion::Relative(3), true))
        );
        assert_eq!(Motion::parse(&["beforefirst"]).unwrap(), None);
        assert_eq!(Motion::parse(&["int", "index", "1"]).unwrap(), None);
        assert!(Motion::parse(&["absoluterow", "x"]).is_err());
    }
}
