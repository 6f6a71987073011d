use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::SqlValidator;
use crate::error::{BridgeError, BridgeResult};

const DEFAULT_SUBJECT: &str = "*";

/// Rules for one subject. An empty `allow` list permits every statement kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionRule {
    /// Leading SQL keywords, e.g. `SELECT`, `INSERT`.
    pub allow: Vec<String>,
    /// Regular expressions; a match rejects the statement.
    pub deny: Vec<String>,
}

struct CompiledRule {
    allow: HashSet<String>,
    deny: Vec<Regex>,
}

/// Validator driven by `[permissions.<subject>]` tables, with `*` as the
/// fallback subject. Subjects without any rule are unrestricted.
pub struct RuleValidator {
    rules: HashMap<String, CompiledRule>,
}

impl RuleValidator {
    pub fn new(rules: &BTreeMap<String, PermissionRule>) -> Result<Self, regex::Error> {
        let mut compiled = HashMap::new();
        for (subject, rule) in rules {
            let deny = rule
                .deny
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<Vec<_>, _>>()?;
            compiled.insert(
                subject.clone(),
                CompiledRule {
                    allow: rule.allow.iter().map(|k| k.to_ascii_uppercase()).collect(),
                    deny,
                },
            );
        }
        Ok(Self { rules: compiled })
    }
}

/// First keyword of a statement, skipping leading comments and parentheses.
pub fn statement_kind(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(stripped) = rest.strip_prefix('(') {
            rest = stripped.trim_start();
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}

impl SqlValidator for RuleValidator {
    fn validate(&self, sql: &str, subject: &str) -> BridgeResult<String> {
        let Some(rule) = self.rules.get(subject).or_else(|| self.rules.get(DEFAULT_SUBJECT)) else {
            return Ok(sql.to_string());
        };

        let kind = statement_kind(sql);
        if !rule.allow.is_empty() && !rule.allow.contains(&kind) {
            tracing::info!("Denied {} statement for '{}'", kind, subject);
            return Err(BridgeError::PermissionDenied(format!(
                "{} statements are not allowed for '{}'",
                if kind.is_empty() { "empty" } else { kind.as_str() },
                subject
            )));
        }

        if let Some(pattern) = rule.deny.iter().find(|re| re.is_match(sql)) {
            tracing::info!("Statement for '{}' matched deny rule {}", subject, pattern);
            return Err(BridgeError::PermissionDenied(format!(
                "statement matches denied pattern '{}'",
                pattern
            )));
        }

        Ok(sql.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RuleValidator {
        let mut rules = BTreeMap::new();
        rules.insert(
            "reporter".to_string(),
            PermissionRule {
                allow: vec!["select".to_string()],
                deny: vec![r"(?i)\bsecrets\b".to_string()],
            },
        );
        rules.insert(
            "*".to_string(),
            PermissionRule {
                allow: vec![],
                deny: vec![r"(?i)^\s*drop\b".to_string()],
            },
        );
        RuleValidator::new(&rules).unwrap()
    }

    #[test]
    fn test_statement_kind() {
        assert_eq!(statement_kind("  select 1"), "SELECT");
        assert_eq!(statement_kind("-- note\n/* x */ (SELECT 1)"), "SELECT");
        assert_eq!(statement_kind("insert into t values (1)"), "INSERT");
        assert_eq!(statement_kind(""), "");
    }

    #[test]
    fn test_disallowed_kind_is_denied() {
        let v = validator();
        assert!(v.validate("SELECT * FROM t", "reporter").is_ok());
        let err = v.validate("DELETE FROM t", "reporter").unwrap_err();
        assert!(matches!(err, BridgeError::PermissionDenied(_)));
    }

    #[test]
    fn test_deny_pattern() {
        let v = validator();
        assert!(v.validate("SELECT * FROM Secrets", "reporter").is_err());
        assert!(v.validate("drop table t", "someone").is_err());
        assert_eq!(
            v.validate("delete from t", "someone").unwrap(),
            "delete from t"
        );
    }

    #[test]
    fn test_invalid_pattern_is_rejected_at_load() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "*".to_string(),
            PermissionRule {
                allow: vec![],
                deny: vec!["(unclosed".to_string()],
            },
        );
        assert!(RuleValidator::new(&rules).is_err());
    }
}
