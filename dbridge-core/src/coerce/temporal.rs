use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::error::CoercionError;
use crate::policy::{ConversionPolicy, FieldCopy};
use crate::types::SqlType;
use crate::value::Value;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Widen a temporal value to a date-time, shifting UTC values into `zone` when given.
pub(crate) fn to_datetime(value: &Value, zone: Option<Tz>) -> Result<NaiveDateTime, CoercionError> {
    let naive = match value {
        Value::Date(d) => d.and_time(NaiveTime::MIN),
        Value::Time(t) => epoch_date().and_time(*t),
        Value::Timestamp(ts) => *ts,
        other => {
            return Err(CoercionError::NotConvertible {
                value: other.describe(),
                from: other.kind(),
                target: SqlType::Timestamp,
            })
        }
    };
    Ok(shift(naive, zone))
}

fn shift(naive: NaiveDateTime, zone: Option<Tz>) -> NaiveDateTime {
    match zone {
        Some(tz) => tz.from_utc_datetime(&naive).naive_local(),
        None => naive,
    }
}

/// Keep the calendar fields the policy allows for `target`.
pub(crate) fn project(
    datetime: NaiveDateTime,
    target: SqlType,
    policy: &ConversionPolicy,
) -> Result<Value, CoercionError> {
    let projected = match policy.field_copy(target) {
        FieldCopy::Date => datetime.date().and_time(NaiveTime::MIN),
        FieldCopy::Time => epoch_date().and_time(datetime.time()),
        FieldCopy::All => datetime,
        FieldCopy::Reject => {
            return Err(CoercionError::Disabled {
                from: datetime.to_string(),
                target,
            })
        }
    };
    match target {
        SqlType::Date => Ok(Value::Date(projected.date())),
        SqlType::Time => Ok(Value::Time(projected.time())),
        _ => Ok(Value::Timestamp(projected)),
    }
}

pub(crate) fn parse(
    text: &str,
    target: SqlType,
    policy: &ConversionPolicy,
) -> Result<Value, CoercionError> {
    let trimmed = text.trim();
    let parsed = if target == SqlType::Time {
        NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .ok()
            .map(|t| epoch_date().and_time(t))
            .or_else(|| parse_datetime(trimmed))
    } else {
        parse_datetime(trimmed)
    };
    let datetime = parsed.ok_or_else(|| CoercionError::NotConvertible {
        value: format!("'{}'", text),
        from: crate::value::ValueKind::String,
        target,
    })?;
    project(datetime, target, policy)
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Milliseconds since the epoch to a temporal target, or a temporal value to milliseconds.
pub(crate) fn epoch(
    value: &Value,
    target: SqlType,
    zone: Option<Tz>,
    policy: &ConversionPolicy,
) -> Result<Value, CoercionError> {
    match value {
        Value::Int(millis) => {
            let utc = DateTime::from_timestamp_millis(*millis).ok_or_else(|| {
                CoercionError::OutOfRange {
                    value: millis.to_string(),
                    target,
                }
            })?;
            project(shift(utc.naive_utc(), zone), target, policy)
        }
        other => {
            let datetime = to_datetime(other, None)?;
            Ok(Value::Int(datetime.and_utc().timestamp_millis()))
        }
    }
}
