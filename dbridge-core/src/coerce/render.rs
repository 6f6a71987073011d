use chrono::{NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use std::fmt::Write as _;

use crate::error::CoercionError;
use crate::policy::ConversionPolicy;
use crate::types::SqlType;
use crate::value::{LobKind, Value};

pub(crate) fn render(
    value: &Value,
    declared: SqlType,
    zoned: bool,
    zone: Option<Tz>,
    policy: &ConversionPolicy,
) -> Result<String, CoercionError> {
    if let Some(template) = policy.string_formats.get(&declared) {
        if let Some(text) = with_template(value, template)? {
            return Ok(text);
        }
    }

    let text = match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => policy.literal(*b).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => hex::encode(b),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Time(t) => t.format("%H:%M:%S").to_string(),
        Value::Timestamp(ts) => timestamp(*ts, zoned, zone, policy.timestamp_with_millis),
        Value::Lob(lob) => match lob.kind {
            LobKind::Blob => hex::encode(lob.all_bytes()?),
            LobKind::Clob | LobKind::NClob => lob.text()?,
        },
        Value::Array(items) => {
            let rendered = items
                .iter()
                .map(|item| render(item, item.natural_type(), false, None, policy))
                .collect::<Result<Vec<_>, _>>()?;
            format!("[{}]", rendered.join(", "))
        }
        Value::Ref(_) => {
            return Err(CoercionError::NotConvertible {
                value: value.describe(),
                from: value.kind(),
                target: SqlType::String,
            })
        }
    };
    Ok(text)
}

/// `yyyy-mm-dd hh:mm:ss[.f][+zz]`.
///
/// The fraction is kept (at least one digit) when millis are enabled. Zoned
/// values are taken as UTC and shown in `zone` (UTC when none) with the
/// offset minutes dropped when they are zero.
fn timestamp(ts: NaiveDateTime, zoned: bool, zone: Option<Tz>, with_millis: bool) -> String {
    let (local, offset) = if zoned {
        let tz = zone.unwrap_or(Tz::UTC);
        let dt = tz.from_utc_datetime(&ts);
        let mut offset = dt.format("%z").to_string();
        if offset.ends_with("00") {
            offset.truncate(offset.len() - 2);
        }
        (dt.naive_local(), offset)
    } else {
        (ts, String::new())
    };

    let mut text = local.format("%Y-%m-%d %H:%M:%S").to_string();
    if with_millis {
        let nanos = local.nanosecond() % 1_000_000_000;
        let fraction = format!("{:09}", nanos);
        let trimmed = fraction.trim_end_matches('0');
        text.push('.');
        text.push_str(if trimmed.is_empty() { "0" } else { trimmed });
    }
    text.push_str(&offset);
    text
}

/// Apply a format template; `None` when the template does not concern this value.
fn with_template(value: &Value, template: &str) -> Result<Option<String>, CoercionError> {
    let mut out = String::new();
    let written = match value {
        Value::Date(d) => write!(out, "{}", d.format(template)),
        Value::Time(t) => write!(out, "{}", t.format(template)),
        Value::Timestamp(ts) => write!(out, "{}", ts.format(template)),
        Value::Int(_) | Value::Float(_) | Value::Decimal(_) => {
            return decimal_places(template).map(|places| Some(fixed(value, places)));
        }
        _ => return Ok(None),
    };
    written.map_err(|_| CoercionError::InvalidFormat(template.to_string()))?;
    Ok(Some(out))
}

/// Number of decimal places of a `0.00` style template.
fn decimal_places(template: &str) -> Result<usize, CoercionError> {
    if template.is_empty() || !template.chars().all(|c| matches!(c, '0' | '#' | '.')) {
        return Err(CoercionError::InvalidFormat(template.to_string()));
    }
    match template.split_once('.') {
        Some((_, fraction)) if fraction.contains('.') => {
            Err(CoercionError::InvalidFormat(template.to_string()))
        }
        Some((_, fraction)) => Ok(fraction.len()),
        None => Ok(0),
    }
}

fn fixed(value: &Value, places: usize) -> String {
    match value {
        Value::Int(i) if places == 0 => i.to_string(),
        Value::Int(i) => format!("{}.{}", i, "0".repeat(places)),
        Value::Float(f) => format!("{:.*}", places, f),
        Value::Decimal(d) => format!("{:.*}", places, d),
        other => other.describe(),
    }
}
