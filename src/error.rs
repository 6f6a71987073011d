use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use dbridge_core::{CoercionError, ErrorKind, TransportableError};
use thiserror::Error;

use crate::native::NativeError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Reference '{0}' not found")]
    ReferenceNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Malformed request: {0}")]
    Protocol(String),

    #[error("Operation '{0}' is not supported")]
    Unsupported(String),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("Login failed: {0}")]
    LoginFailure(String),

    #[error("No connection mapped for user '{0}'")]
    UnmappedUser(String),

    #[error("Cannot reach backend: {0}")]
    Connectivity(String),

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::ReferenceNotFound(_) => ErrorKind::ReferenceNotFound,
            BridgeError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            BridgeError::Protocol(_) | BridgeError::Json(_) => ErrorKind::Protocol,
            BridgeError::Unsupported(_) => ErrorKind::UnsupportedOperation,
            BridgeError::Coercion(e) => e.kind(),
            BridgeError::LoginFailure(_) => ErrorKind::LoginFailure,
            BridgeError::UnmappedUser(_) => ErrorKind::UnmappedUser,
            BridgeError::Connectivity(_) => ErrorKind::Connectivity,
            BridgeError::Native(e) => e.kind,
            BridgeError::Internal(_) => ErrorKind::Database,
        }
    }

    pub fn to_transportable(&self) -> TransportableError {
        match self {
            BridgeError::Native(NativeError {
                kind,
                leaf: Some(leaf),
                message,
            }) => TransportableError::with_leaf(leaf.clone(), *kind, message.clone()),
            BridgeError::Native(e) => TransportableError::new(e.kind, e.message.clone()),
            other => TransportableError::new(other.kind(), other.to_string()),
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::ReferenceNotFound => StatusCode::NOT_FOUND,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::LoginFailure | ErrorKind::UnmappedUser => StatusCode::UNAUTHORIZED,
            ErrorKind::Protocol | ErrorKind::InvalidColumn => StatusCode::BAD_REQUEST,
            ErrorKind::UnsupportedOperation => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::Coercion => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Connectivity => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TransportableError> for BridgeError {
    fn from(err: TransportableError) -> Self {
        BridgeError::Native(NativeError::new(err.kind(), err.message))
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }
        let body = Json(serde_json::json!({ "error": self.to_transportable() }));
        (status, body).into_response()
    }
}
