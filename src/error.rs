// Store error taxonomy. Retry decisions go through Error::is_transient, never message matching.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// SQLite primary result codes that mean "try again later".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied a payload or option the store cannot act on. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Network or timeout class failure; safe to retry for idempotent reads.
    #[error("transient store error: {0}")]
    Transient(TransientKind),

    /// Constraint, decode or unknown failure. Never retried.
    #[error("store error: {0}")]
    Permanent(String),
}

#[derive(Debug, Error)]
pub enum TransientKind {
    #[error("network: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("database busy: {0}")]
    Busy(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => Error::Transient(TransientKind::Network(e.to_string())),
            sqlx::Error::PoolTimedOut => {
                Error::Transient(TransientKind::Network("pool timed out".into()))
            }
            sqlx::Error::PoolClosed => {
                Error::Transient(TransientKind::Network("pool closed".into()))
            }
            sqlx::Error::WorkerCrashed => {
                Error::Transient(TransientKind::Network("sqlite worker crashed".into()))
            }
            sqlx::Error::Database(db) => {
                let primary = db
                    .code()
                    .and_then(|c| c.parse::<i32>().ok())
                    .map(|c| c & 0xff);
                match primary {
                    Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => {
                        Error::Transient(TransientKind::Busy(db.message().to_string()))
                    }
                    _ => Error::Permanent(db.message().to_string()),
                }
            }
            other => Error::Permanent(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Permanent(format!("serialization: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Permanent(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
