//! `SyncError` → HTTP response mapping (spec.md §6.2, §7), including the
//! domain status codes 441/443/445 that don't correspond 1:1 to a
//! `SyncError` variant (they depend on repo lifecycle state a controller
//! checks explicitly, not just on the error taxonomy).

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use syncwerk::error::SyncError;

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

impl StatusMessage {
    pub fn error(message: impl Into<String>) -> Self {
        StatusMessage {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("repo deleted")]
    RepoDeleted,
    #[error("quota exceeded")]
    NoQuota,
    #[error("repo corrupted")]
    RepoCorrupted,
    #[error(transparent)]
    Core(#[from] SyncError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RepoDeleted => StatusCode::from_u16(syncwerk::constants::HTTP_REPO_DELETED).unwrap(),
            ApiError::NoQuota => StatusCode::from_u16(syncwerk::constants::HTTP_NOQUOTA).unwrap(),
            ApiError::RepoCorrupted => StatusCode::from_u16(syncwerk::constants::HTTP_REPO_CORRUPTED).unwrap(),
            ApiError::Core(err) => match err {
                SyncError::BadInput(_) => StatusCode::BAD_REQUEST,
                SyncError::AuthDenied(_) => StatusCode::FORBIDDEN,
                SyncError::PermDenied(_) => StatusCode::FORBIDDEN,
                SyncError::NotFound(_) => StatusCode::NOT_FOUND,
                SyncError::Corrupted(_) => StatusCode::from_u16(syncwerk::constants::HTTP_REPO_CORRUPTED).unwrap(),
                SyncError::QuotaExceeded => StatusCode::from_u16(syncwerk::constants::HTTP_NOQUOTA).unwrap(),
                SyncError::Conflict(_) => StatusCode::CONFLICT,
                SyncError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        log::warn!("request failed: {self}");
        HttpResponse::build(self.status_code()).json(StatusMessage::error(self.to_string()))
    }
}
