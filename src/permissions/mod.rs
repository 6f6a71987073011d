//! SQL permission checks, run before every statement execution.

pub mod rules;

pub use rules::{PermissionRule, RuleValidator};

use crate::error::BridgeResult;

pub trait SqlValidator: Send + Sync {
    /// Returns the SQL to execute, or `PermissionDenied`.
    fn validate(&self, sql: &str, subject: &str) -> BridgeResult<String>;
}

/// Accepts everything unchanged.
pub struct AllowAll;

impl SqlValidator for AllowAll {
    fn validate(&self, sql: &str, _subject: &str) -> BridgeResult<String> {
        Ok(sql.to_string())
    }
}
