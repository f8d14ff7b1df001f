//! Unified error type for the sync engine (spec.md §7).
//!
//! Each variant maps to exactly one entry of the error taxonomy; the server
//! crate is responsible for turning a `SyncError` into an HTTP response
//! (including the domain codes 441/443/445).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed id, bad UUID, illegal enum. Never retried.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Missing or invalid token.
    #[error("auth denied: {0}")]
    AuthDenied(String),

    /// Token valid, user lacks permission for the operation.
    #[error("permission denied: {0}")]
    PermDenied(String),

    /// Object or repo missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Repo metadata inconsistent, or an object failed its id check.
    #[error("corrupted: {0}")]
    Corrupted(String),

    /// Usage would exceed the effective quota.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// CAS lost, or a merge could not be completed automatically.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Underlying storage failure.
    #[error("io error: {0}")]
    Io(String),

    /// Anything else unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn bad_input(msg: impl Into<String>) -> Self {
        SyncError::BadInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        SyncError::NotFound(msg.into())
    }

    pub fn auth_denied(msg: impl Into<String>) -> Self {
        SyncError::AuthDenied(msg.into())
    }

    pub fn perm_denied(msg: impl Into<String>) -> Self {
        SyncError::PermDenied(msg.into())
    }

    pub fn corrupted(msg: impl Into<String>) -> Self {
        SyncError::Corrupted(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        SyncError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }

    /// True for errors the push-merge retry loop should not retry on.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncError::Conflict(_) | SyncError::Io(_))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SyncError::NotFound(err.to_string()),
            _ => SyncError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Corrupted(format!("invalid json: {err}"))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Internal(format!("db error: {err}"))
    }
}

impl From<uuid::Error> for SyncError {
    fn from(err: uuid::Error) -> Self {
        SyncError::BadInput(format!("invalid uuid: {err}"))
    }
}
