//! Value coercion engine.
//!
//! [`conversion_rule`] decides, for every pair of source value kind and
//! requested type, which family of conversion applies. [`CoercionEngine`]
//! runs that rule under a session's [`ConversionPolicy`].

mod lob;
mod numeric;
mod render;
mod temporal;

use chrono_tz::Tz;
use std::sync::Arc;

use crate::error::CoercionError;
use crate::policy::{ConversionPolicy, LobMode};
use crate::types::{SqlType, WireType};
use crate::value::{LargeObject, Value, ValueKind};

pub use lob::encode_bytes;

/// Conversion families of the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Value is already acceptable as is.
    Identity,
    /// Null source: the target's zero value, flagged as null.
    Zero,
    /// Number to number, range checked.
    Numeric,
    /// Text parsed as a number or a temporal value.
    Parse,
    Boolean,
    Render,
    /// Calendar field projection between temporal types.
    Temporal,
    /// Milliseconds since the epoch to or from a temporal value.
    Epoch,
    Binary,
    Lob,
    /// Single element array synthesized around a scalar.
    Array,
    Reject,
}

/// The rule applying to a `(source kind, target type)` pair.
pub fn conversion_rule(from: ValueKind, to: SqlType) -> Rule {
    use SqlType as T;
    use ValueKind as K;

    match from {
        K::Null => Rule::Zero,
        K::Bool => match to {
            T::Boolean | T::Object => Rule::Identity,
            T::Byte | T::Short | T::Int | T::Long | T::Float | T::Double | T::Decimal => {
                Rule::Numeric
            }
            T::Char | T::String | T::NString => Rule::Render,
            T::Bytes => Rule::Binary,
            T::Blob | T::Clob | T::NClob => Rule::Lob,
            T::Array => Rule::Array,
            T::Date | T::Time | T::Timestamp => Rule::Reject,
        },
        K::Int => match to {
            T::Boolean => Rule::Boolean,
            T::Byte | T::Short | T::Int | T::Long | T::Float | T::Double | T::Decimal => {
                Rule::Numeric
            }
            T::Char | T::String | T::NString => Rule::Render,
            T::Bytes => Rule::Binary,
            T::Date | T::Time | T::Timestamp => Rule::Epoch,
            T::Blob | T::Clob | T::NClob => Rule::Lob,
            T::Array => Rule::Array,
            T::Object => Rule::Identity,
        },
        K::Float | K::Decimal => match to {
            T::Boolean => Rule::Boolean,
            T::Byte | T::Short | T::Int | T::Long | T::Float | T::Double | T::Decimal => {
                Rule::Numeric
            }
            T::Char | T::String | T::NString => Rule::Render,
            T::Bytes => Rule::Binary,
            T::Blob | T::Clob | T::NClob => Rule::Lob,
            T::Array => Rule::Array,
            T::Object => Rule::Identity,
            T::Date | T::Time | T::Timestamp => Rule::Reject,
        },
        K::String => match to {
            T::Boolean => Rule::Boolean,
            T::Byte | T::Short | T::Int | T::Long | T::Float | T::Double | T::Decimal => {
                Rule::Parse
            }
            T::Date | T::Time | T::Timestamp => Rule::Parse,
            T::Char | T::String | T::NString => Rule::Render,
            T::Bytes => Rule::Binary,
            T::Blob | T::Clob | T::NClob => Rule::Lob,
            T::Array => Rule::Array,
            T::Object => Rule::Identity,
        },
        K::Bytes => match to {
            T::Bytes | T::Object => Rule::Identity,
            T::Char | T::String | T::NString => Rule::Render,
            T::Blob | T::Clob | T::NClob => Rule::Lob,
            T::Array => Rule::Array,
            T::Boolean
            | T::Byte
            | T::Short
            | T::Int
            | T::Long
            | T::Float
            | T::Double
            | T::Decimal
            | T::Date
            | T::Time
            | T::Timestamp => Rule::Reject,
        },
        K::Date | K::Time | K::Timestamp => match to {
            T::Date | T::Time | T::Timestamp => Rule::Temporal,
            T::Long => Rule::Epoch,
            T::Char | T::String | T::NString => Rule::Render,
            T::Blob | T::Clob | T::NClob => Rule::Lob,
            T::Array => Rule::Array,
            T::Object => Rule::Identity,
            T::Boolean
            | T::Byte
            | T::Short
            | T::Int
            | T::Float
            | T::Double
            | T::Decimal
            | T::Bytes => Rule::Reject,
        },
        K::Lob => match to {
            T::Blob | T::Clob | T::NClob => Rule::Lob,
            T::Bytes => Rule::Binary,
            T::Char | T::String | T::NString => Rule::Render,
            T::Array => Rule::Array,
            T::Object => Rule::Identity,
            T::Boolean
            | T::Byte
            | T::Short
            | T::Int
            | T::Long
            | T::Float
            | T::Double
            | T::Decimal
            | T::Date
            | T::Time
            | T::Timestamp => Rule::Reject,
        },
        K::Array => match to {
            T::Array | T::Object => Rule::Identity,
            T::Char | T::String | T::NString => Rule::Render,
            T::Blob | T::Clob | T::NClob => Rule::Lob,
            T::Boolean
            | T::Byte
            | T::Short
            | T::Int
            | T::Long
            | T::Float
            | T::Double
            | T::Decimal
            | T::Bytes
            | T::Date
            | T::Time
            | T::Timestamp => Rule::Reject,
        },
        // Server side handles stay handles; the client resolves them.
        K::Ref => match to {
            T::Blob | T::Clob | T::NClob | T::Array | T::Object => Rule::Identity,
            T::Boolean
            | T::Byte
            | T::Short
            | T::Int
            | T::Long
            | T::Float
            | T::Double
            | T::Decimal
            | T::Char
            | T::String
            | T::NString
            | T::Bytes
            | T::Date
            | T::Time
            | T::Timestamp => Rule::Reject,
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastRequest {
    pub value: Value,
    /// Narrow type the value was declared with (column or parameter type).
    pub declared: Option<SqlType>,
    pub target: SqlType,
    /// Backend type the value originates from.
    pub wire_type: Option<WireType>,
}

impl CastRequest {
    pub fn new(value: Value, target: SqlType) -> Self {
        Self {
            value,
            declared: None,
            target,
            wire_type: None,
        }
    }

    pub fn declared(mut self, declared: SqlType) -> Self {
        self.declared = Some(declared);
        self
    }

    /// Record the originating wire type; also fixes the declared type when none is set.
    pub fn wire(mut self, wire_type: WireType) -> Self {
        self.wire_type = Some(wire_type);
        if self.declared.is_none() {
            self.declared = Some(wire_type.declared_type());
        }
        self
    }

    fn declared_or_natural(&self) -> SqlType {
        match self.declared {
            Some(SqlType::Object) | None => self.value.natural_type(),
            Some(ty) => ty,
        }
    }

    fn carries_timezone(&self) -> bool {
        self.wire_type.map(|w| w.carries_timezone()).unwrap_or(false)
    }
}

/// Result of a cast.
#[derive(Debug, Clone, PartialEq)]
pub struct Cast {
    pub value: Value,
    pub was_null: bool,
}

impl Cast {
    fn of(value: Value) -> Self {
        Self {
            value,
            was_null: false,
        }
    }

    pub fn int(&self) -> i64 {
        match self.value {
            Value::Int(i) => i,
            _ => 0,
        }
    }

    pub fn float(&self) -> f64 {
        match self.value {
            Value::Float(f) => f,
            Value::Int(i) => i as f64,
            _ => 0.0,
        }
    }

    pub fn bool(&self) -> bool {
        matches!(self.value, Value::Bool(true))
    }

    pub fn into_string(self) -> Option<String> {
        match self.value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Applies the rule table under one session policy.
#[derive(Debug, Clone)]
pub struct CoercionEngine {
    policy: Arc<ConversionPolicy>,
    zone: Option<Tz>,
}

impl CoercionEngine {
    pub fn new(policy: ConversionPolicy) -> Result<Self, CoercionError> {
        Self::shared(Arc::new(policy))
    }

    pub fn shared(policy: Arc<ConversionPolicy>) -> Result<Self, CoercionError> {
        let zone = policy.zone()?;
        Ok(Self { policy, zone })
    }

    pub fn policy(&self) -> &ConversionPolicy {
        &self.policy
    }

    pub fn cast(&self, req: &CastRequest) -> Result<Cast, CoercionError> {
        let value = &req.value;
        match conversion_rule(value.kind(), req.target) {
            Rule::Identity => Ok(Cast::of(value.clone())),
            Rule::Zero => Ok(Cast {
                value: self.zero_value(req),
                was_null: true,
            }),
            Rule::Numeric => numeric::cast_number(value, req.target, &self.policy).map(Cast::of),
            Rule::Parse => {
                let text = match value {
                    Value::String(s) => s.as_str(),
                    _ => return self.reject(req),
                };
                if req.target.is_temporal() {
                    temporal::parse(text, req.target, &self.policy).map(Cast::of)
                } else {
                    numeric::parse_number(text, req.target, &self.policy).map(Cast::of)
                }
            }
            Rule::Boolean => numeric::to_boolean(value, &self.policy).map(|b| Cast::of(Value::Bool(b))),
            Rule::Render => self.render(req).map(|s| Cast::of(Value::String(s))),
            Rule::Temporal => temporal::project(
                temporal::to_datetime(value, self.shift_zone(req))?,
                req.target,
                &self.policy,
            )
            .map(Cast::of),
            Rule::Epoch => temporal::epoch(value, req.target, self.shift_zone(req), &self.policy)
                .map(Cast::of),
            Rule::Binary => self.binary(req).map(|b| Cast::of(Value::Bytes(b))),
            Rule::Lob => self.lob(req).map(Cast::of),
            Rule::Array => {
                if !self.policy.any_array {
                    return Err(CoercionError::Disabled {
                        from: value.kind().to_string(),
                        target: SqlType::Array,
                    });
                }
                Ok(Cast::of(Value::Array(vec![value.clone()])))
            }
            Rule::Reject => self.reject(req),
        }
    }

    /// Render a value the way a string read would.
    pub fn render(&self, req: &CastRequest) -> Result<String, CoercionError> {
        render::render(
            &req.value,
            req.declared_or_natural(),
            req.carries_timezone(),
            self.zone,
            &self.policy,
        )
    }

    fn shift_zone(&self, req: &CastRequest) -> Option<Tz> {
        if req.carries_timezone() {
            self.zone
        } else {
            None
        }
    }

    fn zero_value(&self, req: &CastRequest) -> Value {
        match req.target {
            SqlType::Boolean => Value::Bool(false),
            SqlType::Byte | SqlType::Short | SqlType::Int | SqlType::Long => Value::Int(0),
            SqlType::Float | SqlType::Double => Value::Float(0.0),
            SqlType::Blob => {
                let declared = req.declared.unwrap_or(SqlType::Object);
                match self.policy.blobable.get(&declared) {
                    Some(LobMode::Full) => Value::Lob(LargeObject::blob(Vec::new())),
                    Some(LobMode::Partial) => {
                        Value::Lob(LargeObject::blob(Vec::new()).into_partial())
                    }
                    Some(LobMode::Nullable) | None => Value::Null,
                }
            }
            _ => Value::Null,
        }
    }

    fn binary(&self, req: &CastRequest) -> Result<Vec<u8>, CoercionError> {
        match &req.value {
            Value::String(s) => Ok(s.clone().into_bytes()),
            Value::Lob(lob) => Ok(lob.all_bytes()?.to_vec()),
            other => encode_bytes(other, req.declared_or_natural(), &self.policy),
        }
    }

    fn lob(&self, req: &CastRequest) -> Result<Value, CoercionError> {
        match req.target {
            SqlType::Blob => lob::to_blob(&req.value, req.declared_or_natural(), &self.policy),
            SqlType::Clob | SqlType::NClob => {
                let nclob = req.target == SqlType::NClob;
                if let Value::Lob(existing) = &req.value {
                    if existing.is_character() {
                        return Ok(Value::Lob(lob::retag(existing, nclob)));
                    }
                }
                let enabled = if nclob {
                    self.policy.any_nclob
                } else {
                    self.policy.any_clob
                };
                if !enabled {
                    return Err(CoercionError::Disabled {
                        from: req.value.kind().to_string(),
                        target: req.target,
                    });
                }
                let text = self.render(req)?;
                Ok(Value::Lob(if nclob {
                    LargeObject::nclob(text)
                } else {
                    LargeObject::clob(text)
                }))
            }
            _ => self.reject(req).map(|c| c.value),
        }
    }

    fn reject(&self, req: &CastRequest) -> Result<Cast, CoercionError> {
        if self.policy.untyped_passthrough {
            return Ok(Cast::of(req.value.clone()));
        }
        Err(CoercionError::NotConvertible {
            value: req.value.describe(),
            from: req.value.kind(),
            target: req.target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{NumberToBoolean, Rounding};
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn engine() -> CoercionEngine {
        CoercionEngine::new(ConversionPolicy::default()).unwrap()
    }

    fn engine_with(f: impl FnOnce(&mut ConversionPolicy)) -> CoercionEngine {
        let mut policy = ConversionPolicy::default();
        f(&mut policy);
        CoercionEngine::new(policy).unwrap()
    }

    fn cast(engine: &CoercionEngine, value: Value, target: SqlType) -> Result<Value, CoercionError> {
        engine.cast(&CastRequest::new(value, target)).map(|c| c.value)
    }

    #[test]
    fn test_every_pair_has_a_rule() {
        // Exhaustive by construction; spot check the families.
        assert_eq!(conversion_rule(ValueKind::Null, SqlType::Int), Rule::Zero);
        assert_eq!(conversion_rule(ValueKind::Int, SqlType::Byte), Rule::Numeric);
        assert_eq!(conversion_rule(ValueKind::String, SqlType::Date), Rule::Parse);
        assert_eq!(conversion_rule(ValueKind::Bytes, SqlType::Int), Rule::Reject);
        assert_eq!(conversion_rule(ValueKind::Ref, SqlType::Blob), Rule::Identity);
    }

    #[test]
    fn test_narrowing_checks_range() {
        let err = cast(&engine(), Value::Int(300), SqlType::Byte).unwrap_err();
        match err {
            CoercionError::OutOfRange { value, target } => {
                assert_eq!(value, "300");
                assert_eq!(target, SqlType::Byte);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cast(&engine(), Value::Int(-128), SqlType::Byte).unwrap(), Value::Int(-128));
        assert!(cast(&engine(), Value::Int(i64::MAX), SqlType::Int).is_err());
    }

    #[test]
    fn test_boolean_to_number() {
        assert_eq!(cast(&engine(), Value::Bool(true), SqlType::Int).unwrap(), Value::Int(1));
        let disabled = engine_with(|p| p.boolean_to_number = false);
        assert!(matches!(
            cast(&disabled, Value::Bool(true), SqlType::Int),
            Err(CoercionError::Disabled { .. })
        ));
    }

    #[test]
    fn test_number_to_boolean_policies() {
        assert_eq!(cast(&engine(), Value::Int(-3), SqlType::Boolean).unwrap(), Value::Bool(true));
        let positive = engine_with(|p| p.number_to_boolean = NumberToBoolean::Positive);
        assert_eq!(cast(&positive, Value::Int(-3), SqlType::Boolean).unwrap(), Value::Bool(false));
        assert_eq!(
            cast(&engine(), Value::String("TRUE".into()), SqlType::Boolean).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_null_yields_zero_and_flags() {
        let cast = engine().cast(&CastRequest::new(Value::Null, SqlType::Int)).unwrap();
        assert_eq!(cast.value, Value::Int(0));
        assert!(cast.was_null);
        let cast = engine().cast(&CastRequest::new(Value::Null, SqlType::String)).unwrap();
        assert_eq!(cast.value, Value::Null);
        assert!(cast.was_null);
    }

    #[test]
    fn test_float_to_int_rounding() {
        let cases = [
            (Rounding::Ceiling, 2.1, 3),
            (Rounding::Floor, 2.9, 2),
            (Rounding::Nearest, 2.5, 3),
            (Rounding::Truncate, -2.7, -2),
        ];
        for (mode, input, expected) in cases {
            let engine = engine_with(|p| p.float_to_int = mode);
            assert_eq!(
                cast(&engine, Value::Float(input), SqlType::Int).unwrap(),
                Value::Int(expected),
                "{:?}",
                mode
            );
        }
        let floor = engine_with(|p| p.float_to_int = Rounding::Floor);
        assert_eq!(
            cast(&floor, Value::Decimal(Decimal::from_str("-1.5").unwrap()), SqlType::Long).unwrap(),
            Value::Int(-2)
        );
    }

    #[test]
    fn test_render_boolean_literals() {
        let engine = engine_with(|p| p.boolean_literals = ["no".into(), "yes".into()]);
        assert_eq!(
            cast(&engine, Value::Bool(true), SqlType::String).unwrap(),
            Value::String("yes".into())
        );
    }

    #[test]
    fn test_temporal_field_copy() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(13, 45, 10)
            .unwrap();
        assert_eq!(
            cast(&engine(), Value::Timestamp(ts), SqlType::Date).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
        );
        assert_eq!(
            cast(&engine(), Value::Timestamp(ts), SqlType::Time).unwrap(),
            Value::Time(NaiveTime::from_hms_opt(13, 45, 10).unwrap())
        );
    }

    #[test]
    fn test_timezone_only_for_zoned_wire_types() {
        let engine = engine_with(|p| p.timezone = Some("Asia/Tokyo".into()));
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        let plain = engine
            .cast(&CastRequest::new(Value::Timestamp(ts), SqlType::Timestamp).wire(WireType::Timestamp))
            .unwrap();
        assert_eq!(plain.value, Value::Timestamp(ts));

        let zoned = engine
            .cast(
                &CastRequest::new(Value::Timestamp(ts), SqlType::Timestamp)
                    .wire(WireType::TimestampWithTimezone),
            )
            .unwrap();
        assert_eq!(
            zoned.value,
            Value::Timestamp(ts + chrono::Duration::hours(9))
        );
    }

    #[test]
    fn test_unconvertible_is_an_error_unless_passthrough() {
        let err = cast(&engine(), Value::Bytes(vec![1]), SqlType::Int).unwrap_err();
        assert!(matches!(err, CoercionError::NotConvertible { .. }));

        let lenient = engine_with(|p| p.untyped_passthrough = true);
        assert_eq!(
            cast(&lenient, Value::Bytes(vec![1]), SqlType::Int).unwrap(),
            Value::Bytes(vec![1])
        );
    }

    #[test]
    fn test_any_array_wraps_scalars() {
        assert_eq!(
            cast(&engine(), Value::Int(7), SqlType::Array).unwrap(),
            Value::Array(vec![Value::Int(7)])
        );
        let strict = engine_with(|p| p.any_array = false);
        assert!(cast(&strict, Value::Int(7), SqlType::Array).is_err());
    }

    #[test]
    fn test_clob_synthesis() {
        assert_eq!(
            cast(&engine(), Value::Int(42), SqlType::Clob).unwrap(),
            Value::Lob(LargeObject::clob("42"))
        );
        let strict = engine_with(|p| p.any_clob = false);
        assert!(cast(&strict, Value::Int(42), SqlType::Clob).is_err());
        assert!(cast(&strict, Value::Int(42), SqlType::NClob).is_ok());
    }

    #[test]
    fn test_lob_rule_rejects_other_targets() {
        let req = CastRequest::new(Value::Int(1), SqlType::Int);
        assert!(matches!(
            engine().lob(&req),
            Err(CoercionError::NotConvertible { .. })
        ));

        let lenient = engine_with(|p| p.untyped_passthrough = true);
        assert_eq!(lenient.lob(&req).unwrap(), Value::Int(1));
    }
}
