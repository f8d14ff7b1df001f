//! Path/header extraction shared by every controller: repo id segments and
//! the `Seafile-Repo-Token` header (spec.md §6.2).

use actix_web::HttpRequest;
use syncwerk::error::SyncError;
use syncwerk::model::RepoId;

use crate::errors::ApiError;

pub const TOKEN_HEADER: &str = "Seafile-Repo-Token";

pub fn parse_repo_id(raw: &str) -> Result<RepoId, ApiError> {
    RepoId::parse(raw).map_err(ApiError::from)
}

/// Read and validate the `Seafile-Repo-Token` header.
pub fn extract_token(req: &HttpRequest) -> Result<String, ApiError> {
    req.headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::from(SyncError::auth_denied("missing repo token header")))
}

/// `user@host:client_id:client_name:client_ver`-ish client identity headers
/// sent alongside the token (spec.md §4.8 client-info recording). Any of
/// these being absent just means nothing gets recorded.
pub struct ClientInfo {
    pub client_id: Option<String>,
    pub client_ver: Option<String>,
    pub client_name: Option<String>,
}

impl ClientInfo {
    pub fn from_request(req: &HttpRequest) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        ClientInfo {
            client_id: header("X-Seafile-Client-Id"),
            client_ver: header("X-Seafile-Client-Version"),
            client_name: header("X-Seafile-Client-Name"),
        }
    }
}
