use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::CoercionError;
use crate::policy::{ConversionPolicy, NumberToBoolean, Rounding};
use crate::types::SqlType;
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
    Decimal(Decimal),
}

impl Number {
    fn describe(&self) -> String {
        match self {
            Number::Int(i) => i.to_string(),
            Number::Float(f) => f.to_string(),
            Number::Decimal(d) => d.to_string(),
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
            Number::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        }
    }

    fn is_positive(&self) -> bool {
        match self {
            Number::Int(i) => *i > 0,
            Number::Float(f) => *f > 0.0,
            Number::Decimal(d) => d.is_sign_positive() && !d.is_zero(),
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Number::Int(i) => *i == 0,
            Number::Float(f) => *f == 0.0,
            Number::Decimal(d) => d.is_zero(),
        }
    }
}

fn number_of(value: &Value, target: SqlType, policy: &ConversionPolicy) -> Result<Number, CoercionError> {
    match value {
        Value::Int(i) => Ok(Number::Int(*i)),
        Value::Float(f) => Ok(Number::Float(*f)),
        Value::Decimal(d) => Ok(Number::Decimal(*d)),
        Value::Bool(b) => {
            if !policy.boolean_to_number {
                return Err(CoercionError::Disabled {
                    from: "bool".to_string(),
                    target,
                });
            }
            Ok(Number::Int(*b as i64))
        }
        other => Err(CoercionError::NotConvertible {
            value: other.describe(),
            from: other.kind(),
            target,
        }),
    }
}

pub(crate) fn cast_number(
    value: &Value,
    target: SqlType,
    policy: &ConversionPolicy,
) -> Result<Value, CoercionError> {
    let number = number_of(value, target, policy)?;
    convert(number, target, policy.float_to_int)
}

fn convert(number: Number, target: SqlType, rounding: Rounding) -> Result<Value, CoercionError> {
    let out_of_range = || CoercionError::OutOfRange {
        value: number.describe(),
        target,
    };
    match target {
        SqlType::Byte | SqlType::Short | SqlType::Int | SqlType::Long => {
            let (min, max) = target.integral_range().ok_or_else(out_of_range)?;
            let whole = match number {
                Number::Int(i) => i,
                Number::Float(f) => {
                    let rounded = rounding.apply(f);
                    // `max as f64 + 1.0` is exact for every integral width up to 2^63.
                    if !rounded.is_finite() || rounded < min as f64 || rounded >= max as f64 + 1.0 {
                        return Err(out_of_range());
                    }
                    rounded as i64
                }
                Number::Decimal(d) => round_decimal(d, rounding)
                    .to_i64()
                    .ok_or_else(out_of_range)?,
            };
            if whole < min || whole > max {
                return Err(out_of_range());
            }
            Ok(Value::Int(whole))
        }
        SqlType::Float => {
            let f = number.to_f64();
            if f.is_finite() && f.abs() > f32::MAX as f64 {
                return Err(out_of_range());
            }
            Ok(Value::Float(f as f32 as f64))
        }
        SqlType::Double => Ok(Value::Float(number.to_f64())),
        SqlType::Decimal => {
            let decimal = match number {
                Number::Int(i) => Decimal::from(i),
                Number::Float(f) => Decimal::from_f64(f).ok_or_else(out_of_range)?,
                Number::Decimal(d) => d,
            };
            Ok(Value::Decimal(decimal))
        }
        other => Err(CoercionError::NotConvertible {
            value: number.describe(),
            from: crate::value::ValueKind::Float,
            target: other,
        }),
    }
}

fn round_decimal(d: Decimal, rounding: Rounding) -> Decimal {
    match rounding {
        Rounding::Ceiling => d.ceil(),
        Rounding::Floor => d.floor(),
        Rounding::Nearest => d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        Rounding::Truncate => d.trunc(),
    }
}

pub(crate) fn parse_number(
    text: &str,
    target: SqlType,
    policy: &ConversionPolicy,
) -> Result<Value, CoercionError> {
    let trimmed = text.trim();
    let parsed = if let Ok(i) = trimmed.parse::<i64>() {
        Some(Number::Int(i))
    } else if let Ok(d) = trimmed.parse::<Decimal>() {
        Some(Number::Decimal(d))
    } else {
        trimmed.parse::<f64>().ok().map(Number::Float)
    };

    if let Some(number) = parsed {
        return convert(number, target, policy.float_to_int);
    }

    let mut chars = text.chars();
    if let (Some(c), None, SqlType::Byte) = (chars.next(), chars.next(), target) {
        if !policy.char_to_byte {
            return Err(CoercionError::Disabled {
                from: "char".to_string(),
                target,
            });
        }
        return convert(Number::Int(c as u32 as i64), target, policy.float_to_int);
    }

    Err(CoercionError::NotConvertible {
        value: format!("'{}'", text),
        from: crate::value::ValueKind::String,
        target,
    })
}

pub(crate) fn to_boolean(value: &Value, policy: &ConversionPolicy) -> Result<bool, CoercionError> {
    let truthy = |n: Number| match policy.number_to_boolean {
        NumberToBoolean::Nonzero => !n.is_zero(),
        NumberToBoolean::Positive => n.is_positive(),
    };
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(i) => Ok(truthy(Number::Int(*i))),
        Value::Float(f) => Ok(truthy(Number::Float(*f))),
        Value::Decimal(d) => Ok(truthy(Number::Decimal(*d))),
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case(policy.literal(true)) || s.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if s.eq_ignore_ascii_case(policy.literal(false)) || s.eq_ignore_ascii_case("false") {
                Ok(false)
            } else if let Ok(d) = s.parse::<Decimal>() {
                Ok(truthy(Number::Decimal(d)))
            } else {
                Err(CoercionError::NotConvertible {
                    value: format!("'{}'", s),
                    from: value.kind(),
                    target: SqlType::Boolean,
                })
            }
        }
        other => Err(CoercionError::NotConvertible {
            value: other.describe(),
            from: other.kind(),
            target: SqlType::Boolean,
        }),
    }
}
