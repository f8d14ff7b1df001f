//! `permission-check` and `quota-check` (spec.md §6.2, §4.9).

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use syncwerk::quota::QuotaCheck;

use crate::app_data::AppState;
use crate::errors::ApiError;
use crate::middleware::token_auth::{check_repo_alive, require_write_permission, validate_token};
use crate::params::{parse_repo_id, ClientInfo};

#[derive(Debug, Deserialize)]
pub struct PermissionQuery {
    pub op: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_ver: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
}

pub async fn permission_check(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PermissionQuery>,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let repo_id = parse_repo_id(&path)?;
    let token = crate::params::extract_token(&req)?;

    let info = validate_token(engine, &token, &repo_id).await?;
    check_repo_alive(engine, &repo_id).await?;

    if query.op == "upload" {
        require_write_permission(engine, &repo_id, &info.user_email).await?;
    } else {
        let perm = match engine.caches.permission(&repo_id, &info.user_email, false) {
            Some(perm) => Some(perm),
            None => {
                let perm = engine.auth.permission(&repo_id, &info.user_email).await?;
                if let Some(perm) = perm {
                    engine.caches.put_permission(&repo_id, &info.user_email, perm);
                }
                perm
            }
        };
        if perm.is_none() {
            return Err(syncwerk::error::SyncError::perm_denied("no access to repo").into());
        }
    }

    let client = ClientInfo::from_request(&req);
    if let (Some(id), Some(ver), Some(name)) = (&client.client_id, &client.client_ver, &client.client_name) {
        engine.auth.record_client_info(&repo_id, &info.user_email, id, ver, name).await?;
    }

    Ok(HttpResponse::Ok().finish())
}

#[derive(Debug, Deserialize)]
pub struct QuotaQuery {
    pub delta: i64,
}

pub async fn quota_check(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<QuotaQuery>,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let repo_id = parse_repo_id(&path)?;
    let token = crate::params::extract_token(&req)?;
    validate_token(engine, &token, &repo_id).await?;

    match engine.quota.check_quota(&repo_id, query.delta).await? {
        QuotaCheck::WithinLimit => Ok(HttpResponse::Ok().finish()),
        QuotaCheck::Exceeded => Err(ApiError::NoQuota),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/repo/{repo_id}/permission-check/", web::get().to(permission_check))
        .route("/repo/{repo_id}/quota-check/", web::get().to(quota_check));
}
