use super::numeric::cast_number;
use crate::error::CoercionError;
use crate::policy::{ConversionPolicy, LobMode};
use crate::types::SqlType;
use crate::value::{LargeObject, LobKind, Value};

/// Byte encoding of a value for its declared type.
///
/// Numbers use big-endian encodings of the declared width after the same
/// range check a numeric cast applies, text is UTF-8, a char is one UTF-16
/// code unit and anything else falls back to its JSON serialization.
pub fn encode_bytes(
    value: &Value,
    declared: SqlType,
    policy: &ConversionPolicy,
) -> Result<Vec<u8>, CoercionError> {
    let numeric = matches!(
        value,
        Value::Int(_) | Value::Float(_) | Value::Decimal(_) | Value::Bool(_)
    );

    let encoded = match (declared, value) {
        (_, Value::Bytes(b)) => Some(b.clone()),
        (_, Value::String(s)) if declared != SqlType::Char => Some(s.as_bytes().to_vec()),
        (SqlType::Boolean, Value::Bool(b)) => Some(vec![*b as u8]),
        (
            SqlType::Byte
            | SqlType::Short
            | SqlType::Int
            | SqlType::Long
            | SqlType::Float
            | SqlType::Double
            | SqlType::Decimal,
            _,
        ) if numeric => {
            // decimals have no fixed width and travel as doubles
            let width = if declared == SqlType::Decimal {
                SqlType::Double
            } else {
                declared
            };
            fixed_width(cast_number(value, width, policy)?, width)
        }
        (SqlType::Char, Value::String(s)) => {
            let mut units = [0u16; 2];
            s.chars()
                .next()
                .map(|c| c.encode_utf16(&mut units)[0].to_be_bytes().to_vec())
        }
        _ => None,
    };

    Ok(encoded.unwrap_or_else(|| serde_json::to_vec(value).unwrap_or_default()))
}

/// Encodes a number already range-checked for `width`.
fn fixed_width(number: Value, width: SqlType) -> Option<Vec<u8>> {
    match (width, number) {
        (SqlType::Byte, Value::Int(i)) => Some((i as i8).to_be_bytes().to_vec()),
        (SqlType::Short, Value::Int(i)) => Some((i as i16).to_be_bytes().to_vec()),
        (SqlType::Int, Value::Int(i)) => Some((i as i32).to_be_bytes().to_vec()),
        (SqlType::Long, Value::Int(i)) => Some(i.to_be_bytes().to_vec()),
        (SqlType::Float, Value::Float(f)) => Some((f as f32).to_be_bytes().to_vec()),
        (SqlType::Double, Value::Float(f)) => Some(f.to_be_bytes().to_vec()),
        _ => None,
    }
}

pub(crate) fn to_blob(
    value: &Value,
    declared: SqlType,
    policy: &ConversionPolicy,
) -> Result<Value, CoercionError> {
    match value {
        Value::Lob(lob) if lob.kind == LobKind::Blob => Ok(value.clone()),
        Value::Lob(lob) => Ok(Value::Lob(LargeObject {
            kind: LobKind::Blob,
            content: lob.content.clone(),
            partial: lob.partial,
        })),
        Value::Bytes(bytes) => Ok(Value::Lob(LargeObject::blob(bytes.clone()))),
        _ => {
            let mode = policy.blobable.get(&declared).ok_or_else(|| CoercionError::Disabled {
                from: declared.to_string(),
                target: SqlType::Blob,
            })?;
            let lob = LargeObject::blob(encode_bytes(value, declared, policy)?);
            Ok(Value::Lob(match mode {
                LobMode::Partial => lob.into_partial(),
                LobMode::Full | LobMode::Nullable => lob,
            }))
        }
    }
}

/// Character object of the requested flavour with the same content.
pub(crate) fn retag(lob: &LargeObject, nclob: bool) -> LargeObject {
    LargeObject {
        kind: if nclob { LobKind::NClob } else { LobKind::Clob },
        content: lob.content.clone(),
        partial: lob.partial,
    }
}
