//! Per-session conversion options.
//!
//! A policy is read from the `[policies.<backend>]` table of the server
//! configuration, optionally overridden by connection properties, and shipped
//! to the client in the connection descriptor so both sides coerce alike.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::CoercionError;
use crate::types::SqlType;

/// How a value of a given declared type may become a BLOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobMode {
    Full,
    /// Length is known but content reads fail.
    Partial,
    /// Null values stay null instead of becoming an empty object.
    Nullable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rounding {
    Ceiling,
    Floor,
    /// Ties away from zero.
    Nearest,
    #[default]
    Truncate,
}

impl Rounding {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Rounding::Ceiling => value.ceil(),
            Rounding::Floor => value.floor(),
            Rounding::Nearest => value.round(),
            Rounding::Truncate => value.trunc(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberToBoolean {
    #[default]
    Nonzero,
    Positive,
}

/// Which calendar fields survive a temporal cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCopy {
    Date,
    Time,
    All,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionPolicy {
    pub timestamp_with_millis: bool,
    pub any_clob: bool,
    pub any_nclob: bool,
    pub any_array: bool,
    pub blobable: BTreeMap<SqlType, LobMode>,
    pub char_to_byte: bool,
    pub boolean_to_number: bool,
    pub float_to_int: Rounding,
    /// `[false_literal, true_literal]`
    pub boolean_literals: [String; 2],
    pub number_to_boolean: NumberToBoolean,
    pub string_formats: BTreeMap<SqlType, String>,
    pub temporal_fields: BTreeMap<SqlType, FieldCopy>,
    pub timezone: Option<String>,
    pub unsupported_functions: BTreeSet<String>,
    pub untyped_passthrough: bool,
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self {
            timestamp_with_millis: true,
            any_clob: true,
            any_nclob: true,
            any_array: true,
            blobable: BTreeMap::new(),
            char_to_byte: false,
            boolean_to_number: true,
            float_to_int: Rounding::Truncate,
            boolean_literals: ["FALSE".to_string(), "TRUE".to_string()],
            number_to_boolean: NumberToBoolean::Nonzero,
            string_formats: BTreeMap::new(),
            temporal_fields: BTreeMap::new(),
            timezone: None,
            unsupported_functions: BTreeSet::new(),
            untyped_passthrough: false,
        }
    }
}

impl ConversionPolicy {
    pub fn zone(&self) -> Result<Option<Tz>, CoercionError> {
        match &self.timezone {
            None => Ok(None),
            Some(name) => name
                .parse::<Tz>()
                .map(Some)
                .map_err(|_| CoercionError::UnknownTimeZone(name.clone())),
        }
    }

    pub fn literal(&self, value: bool) -> &str {
        &self.boolean_literals[value as usize]
    }

    pub fn is_supported(&self, function: &str) -> bool {
        !self.unsupported_functions.contains(function)
    }

    /// Field copy mode for a temporal target, defaulting to the target's own fields.
    pub fn field_copy(&self, target: SqlType) -> FieldCopy {
        if let Some(mode) = self.temporal_fields.get(&target) {
            return *mode;
        }
        match target {
            SqlType::Date => FieldCopy::Date,
            SqlType::Time => FieldCopy::Time,
            _ => FieldCopy::All,
        }
    }

    /// Apply connection property overrides.
    ///
    /// Recognised keys are `timestampWithMillis`, `anyClob`, `anyNClob`,
    /// `anyArray`, `charToByte`, `booleanToNumber`, `floatToInt`,
    /// `booleanLiterals` (`"F,T"`), `numberToBoolean`, `timezone`,
    /// `unsupportedFunctions` (comma separated) and `blobable`, a comma
    /// separated type list where a trailing `.` marks partial and a trailing
    /// `$` marks nullable. Unknown keys are ignored.
    pub fn with_overrides(
        mut self,
        properties: &BTreeMap<String, String>,
    ) -> Result<Self, CoercionError> {
        for (key, raw) in properties {
            let value = raw.trim();
            match key.as_str() {
                "timestampWithMillis" => self.timestamp_with_millis = parse_flag(key, value)?,
                "anyClob" => self.any_clob = parse_flag(key, value)?,
                "anyNClob" => self.any_nclob = parse_flag(key, value)?,
                "anyArray" => self.any_array = parse_flag(key, value)?,
                "charToByte" => self.char_to_byte = parse_flag(key, value)?,
                "booleanToNumber" => self.boolean_to_number = parse_flag(key, value)?,
                "untypedPassthrough" => self.untyped_passthrough = parse_flag(key, value)?,
                "floatToInt" => {
                    self.float_to_int = match value.to_ascii_lowercase().as_str() {
                        "ceil" | "ceiling" => Rounding::Ceiling,
                        "floor" => Rounding::Floor,
                        "round" | "nearest" => Rounding::Nearest,
                        "int" | "truncate" => Rounding::Truncate,
                        _ => return Err(bad_property(key, value)),
                    }
                }
                "numberToBoolean" => {
                    self.number_to_boolean = match value.to_ascii_lowercase().as_str() {
                        "nonzero" => NumberToBoolean::Nonzero,
                        "positive" => NumberToBoolean::Positive,
                        _ => return Err(bad_property(key, value)),
                    }
                }
                "booleanLiterals" => {
                    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
                    if parts.len() != 2 {
                        return Err(bad_property(key, value));
                    }
                    self.boolean_literals = [parts[0].to_string(), parts[1].to_string()];
                }
                "timezone" => self.timezone = Some(value.to_string()),
                "unsupportedFunctions" => {
                    self.unsupported_functions = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "blobable" => {
                    self.blobable.clear();
                    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        let (name, mode) = if let Some(name) = item.strip_suffix('.') {
                            (name, LobMode::Partial)
                        } else if let Some(name) = item.strip_suffix('$') {
                            (name, LobMode::Nullable)
                        } else {
                            (item, LobMode::Full)
                        };
                        let ty = name
                            .parse::<SqlType>()
                            .map_err(|_| bad_property(key, item))?;
                        self.blobable.insert(ty, mode);
                    }
                }
                _ => {}
            }
        }
        self.zone()?;
        Ok(self)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, CoercionError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(bad_property(key, value)),
    }
}

fn bad_property(key: &str, value: &str) -> CoercionError {
    CoercionError::InvalidFormat(format!("{}={}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = ConversionPolicy::default();
        assert!(policy.timestamp_with_millis);
        assert!(!policy.char_to_byte);
        assert_eq!(policy.float_to_int, Rounding::Truncate);
        assert_eq!(policy.literal(true), "TRUE");
        assert_eq!(policy.field_copy(SqlType::Date), FieldCopy::Date);
        assert_eq!(policy.field_copy(SqlType::Timestamp), FieldCopy::All);
    }

    #[test]
    fn test_from_toml() {
        let policy: ConversionPolicy = toml::from_str(
            r#"
            timestamp_with_millis = false
            float_to_int = "floor"
            boolean_literals = ["0", "1"]
            timezone = "Europe/Paris"

            [blobable]
            int = "full"
            string = "partial"

            [temporal_fields]
            time = "reject"
            "#,
        )
        .unwrap();
        assert!(!policy.timestamp_with_millis);
        assert_eq!(policy.float_to_int, Rounding::Floor);
        assert_eq!(policy.literal(false), "0");
        assert_eq!(policy.blobable.get(&SqlType::String), Some(&LobMode::Partial));
        assert_eq!(policy.field_copy(SqlType::Time), FieldCopy::Reject);
        assert_eq!(policy.zone().unwrap(), Some(chrono_tz::Europe::Paris));
        assert!(policy.any_clob);
    }

    #[test]
    fn test_property_overrides() {
        let mut props = BTreeMap::new();
        props.insert("blobable".to_string(), "int, long., string$".to_string());
        props.insert("floatToInt".to_string(), "CEIL".to_string());
        props.insert("unsupportedFunctions".to_string(), "getRowId,setCursorName".to_string());
        props.insert("somethingElse".to_string(), "ignored".to_string());

        let policy = ConversionPolicy::default().with_overrides(&props).unwrap();
        assert_eq!(policy.blobable.get(&SqlType::Int), Some(&LobMode::Full));
        assert_eq!(policy.blobable.get(&SqlType::Long), Some(&LobMode::Partial));
        assert_eq!(policy.blobable.get(&SqlType::String), Some(&LobMode::Nullable));
        assert_eq!(policy.float_to_int, Rounding::Ceiling);
        assert!(!policy.is_supported("getRowId"));
        assert!(policy.is_supported("getString"));
    }

    #[test]
    fn test_bad_overrides_are_rejected() {
        let mut props = BTreeMap::new();
        props.insert("timezone".to_string(), "Mars/Olympus".to_string());
        assert_eq!(
            ConversionPolicy::default().with_overrides(&props),
            Err(CoercionError::UnknownTimeZone("Mars/Olympus".into()))
        );

        let mut props = BTreeMap::new();
        props.insert("floatToInt".to_string(), "sideways".to_string());
        assert!(ConversionPolicy::default().with_overrides(&props).is_err());
    }

    #[test]
    fn test_rounding_modes() {
        assert_eq!(Rounding::Ceiling.apply(2.1), 3.0);
        assert_eq!(Rounding::Floor.apply(-2.1), -3.0);
        assert_eq!(Rounding::Nearest.apply(2.5), 3.0);
        assert_eq!(Rounding::Truncate.apply(-2.9), -2.0);
    }
}
