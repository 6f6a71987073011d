use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::SqlType;
use crate::value::ValueKind;

/// Error categories shared by server and client.
///
/// Every kind has a fixed ancestry ending at [`ErrorKind::Database`]. The server
/// sends the whole chain so a client that does not know the most specific kind
/// can still rebuild the nearest one it does know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Database,
    Transient,
    NonTransient,
    InvalidAuthorization,
    Connectivity,
    LoginFailure,
    UnmappedUser,
    DataError,
    Coercion,
    UnsupportedOperation,
    ReferenceNotFound,
    PermissionDenied,
    Protocol,
    InvalidColumn,
    SyntaxError,
    ConstraintViolation,
    Timeout,
    Cancelled,
}

const ALL_KINDS: [ErrorKind; 18] = [
    ErrorKind::Database,
    ErrorKind::Transient,
    ErrorKind::NonTransient,
    ErrorKind::InvalidAuthorization,
    ErrorKind::Connectivity,
    ErrorKind::LoginFailure,
    ErrorKind::UnmappedUser,
    ErrorKind::DataError,
    ErrorKind::Coercion,
    ErrorKind::UnsupportedOperation,
    ErrorKind::ReferenceNotFound,
    ErrorKind::PermissionDenied,
    ErrorKind::Protocol,
    ErrorKind::InvalidColumn,
    ErrorKind::SyntaxError,
    ErrorKind::ConstraintViolation,
    ErrorKind::Timeout,
    ErrorKind::Cancelled,
];

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Database => "DatabaseError",
            ErrorKind::Transient => "TransientError",
            ErrorKind::NonTransient => "NonTransientError",
            ErrorKind::InvalidAuthorization => "InvalidAuthorizationError",
            ErrorKind::Connectivity => "ConnectivityError",
            ErrorKind::LoginFailure => "LoginFailure",
            ErrorKind::UnmappedUser => "UnmappedUser",
            ErrorKind::DataError => "DataError",
            ErrorKind::Coercion => "CoercionError",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::ReferenceNotFound => "ReferenceNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::Protocol => "ProtocolError",
            ErrorKind::InvalidColumn => "InvalidColumn",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ConstraintViolation => "ConstraintViolation",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    pub fn from_name(name: &str) -> Option<ErrorKind> {
        ALL_KINDS.iter().copied().find(|k| k.name() == name)
    }

    /// The direct parent, `None` only for the root.
    pub fn parent(&self) -> Option<ErrorKind> {
        use ErrorKind::*;
        match self {
            Database => None,
            Transient | NonTransient => Some(Database),
            Connectivity | Timeout | Cancelled => Some(Transient),
            InvalidAuthorization
            | DataError
            | UnsupportedOperation
            | ReferenceNotFound
            | Protocol
            | InvalidColumn
            | SyntaxError
            | ConstraintViolation => Some(NonTransient),
            LoginFailure | PermissionDenied => Some(InvalidAuthorization),
            UnmappedUser => Some(LoginFailure),
            Coercion => Some(DataError),
        }
    }

    /// The kind followed by all of its ancestors, most specific first.
    pub fn ancestry(&self) -> Vec<ErrorKind> {
        let mut chain = vec![*self];
        let mut current = *self;
        while let Some(parent) = current.parent() {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Nearest known kind for an ancestry chain of names, falling back to the root.
    pub fn nearest<S: AsRef<str>>(ancestry: &[S]) -> ErrorKind {
        ancestry
            .iter()
            .find_map(|name| ErrorKind::from_name(name.as_ref()))
            .unwrap_or(ErrorKind::Database)
    }

    pub fn is_a(&self, other: ErrorKind) -> bool {
        self.ancestry().contains(&other)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serializable form of an error crossing the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportableError {
    /// Type names, most specific first, ending at `DatabaseError`.
    pub ancestry: Vec<String>,
    pub message: String,
}

impl TransportableError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ancestry: kind.ancestry().iter().map(|k| k.name().to_string()).collect(),
            message: message.into(),
        }
    }

    /// Prepend a backend specific type name in front of the kind's chain.
    pub fn with_leaf(leaf: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut err = Self::new(kind, message);
        err.ancestry.insert(0, leaf.into());
        err
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::nearest(&self.ancestry)
    }
}

impl fmt::Display for TransportableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ancestry.first() {
            Some(name) => write!(f, "{}: {}", name, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportableError {}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoercionError {
    #[error("value {value} is out of range for {target}")]
    OutOfRange { value: String, target: SqlType },

    #[error("cannot convert {value} ({from}) to {target}")]
    NotConvertible {
        value: String,
        from: ValueKind,
        target: SqlType,
    },

    #[error("conversion of {from} to {target} is disabled")]
    Disabled { from: String, target: SqlType },

    #[error("cannot retrieve value of a partial large object")]
    PartialLob,

    #[error("position {0} is outside the large object")]
    LobPosition(u64),

    #[error("invalid format template '{0}'")]
    InvalidFormat(String),

    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
}

impl CoercionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoercionError::InvalidFormat(_) | CoercionError::UnknownTimeZone(_) => {
                ErrorKind::Protocol
            }
            _ => ErrorKind::Coercion,
        }
    }
}

impl From<CoercionError> for TransportableError {
    fn from(err: CoercionError) -> Self {
        TransportableError::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_ancestry_ends_at_database() {
        for kind in ALL_KINDS {
            assert_eq!(kind.ancestry().last(), Some(&ErrorKind::Database));
        }
    }

    #[test]
    fn test_unmapped_user_is_login_failure() {
        assert!(ErrorKind::UnmappedUser.is_a(ErrorKind::LoginFailure));
        assert!(ErrorKind::UnmappedUser.is_a(ErrorKind::InvalidAuthorization));
        assert!(!ErrorKind::LoginFailure.is_a(ErrorKind::UnmappedUser));
    }

    #[test]
    fn test_nearest_skips_unknown_leaf() {
        let err = TransportableError::with_leaf(
            "SQLITE_CONSTRAINT_UNIQUE",
            ErrorKind::ConstraintViolation,
            "UNIQUE constraint failed",
        );
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(err.ancestry[0], "SQLITE_CONSTRAINT_UNIQUE");
    }

    #[test]
    fn test_nearest_falls_back_to_database() {
        let names = vec!["VendorThing".to_string(), "OtherThing".to_string()];
        assert_eq!(ErrorKind::nearest(&names), ErrorKind::Database);
        let empty: Vec<String> = vec![];
        assert_eq!(ErrorKind::nearest(&empty), ErrorKind::Database);
    }

    #[test]
    fn test_coercion_error_transports_as_coercion() {
        let err = CoercionError::OutOfRange {
            value: "300".into(),
            target: SqlType::Byte,
        };
        let transported: TransportableError = err.into();
        assert_eq!(transported.kind(), ErrorKind::Coercion);
        assert!(transported.message.contains("300"));
        assert_eq!(
            transported.ancestry,
            vec!["CoercionError", "DataError", "NonTransientError", "DatabaseError"]
        );
    }
}
