use dbridge_core::{CoercionError, ErrorKind, TransportableError};
use thiserror::Error;

/// Errors surfaced by remote proxies.
///
/// `Database` is rebuilt from the ancestry the server sent: `kind` is the most
/// specific entry this client knows, `ancestry` keeps the full chain including
/// backend specific names.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("{kind}: {message}")]
    Database {
        kind: ErrorKind,
        ancestry: Vec<String>,
        message: String,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl RemoteError {
    /// Error raised locally, without a server round trip.
    pub fn local(kind: ErrorKind, message: impl Into<String>) -> Self {
        TransportableError::new(kind, message).into()
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Database { kind, .. } => *kind,
            RemoteError::Connection(_) => ErrorKind::Connectivity,
            RemoteError::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// True when the error is `kind` or one of its descendants.
    pub fn is_a(&self, kind: ErrorKind) -> bool {
        self.kind().is_a(kind)
    }
}

impl From<TransportableError> for RemoteError {
    fn from(err: TransportableError) -> Self {
        RemoteError::Database {
            kind: err.kind(),
            ancestry: err.ancestry,
            message: err.message,
        }
    }
}

impl From<CoercionError> for RemoteError {
    fn from(err: CoercionError) -> Self {
        TransportableError::from(err).into()
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Protocol(format!("Failed to decode response: {}", err))
    }
}
