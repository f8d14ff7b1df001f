//! Token/permission checks every authenticated endpoint performs before
//! touching a repo (spec.md §4.9: "every authenticated endpoint first
//! calls `validate_token`... then `check_permission` for write ops").
//!
//! Not an `actix_web` `Transform` middleware: the check needs the repo id
//! out of the path and feeds the resolved user back to the handler, so a
//! plain helper called at the top of each controller reads more directly,
//! matching the teacher's `helpers::get_repo` style.

use syncwerk::cache::TokenInfo;
use syncwerk::error::SyncError;
use syncwerk::model::RepoId;
use syncwerk::Engine;

use crate::errors::ApiError;

/// Validate the `Seafile-Repo-Token` header against `repo_id`, consulting
/// the token cache before falling back to the directory (spec.md §4.8).
pub async fn validate_token(engine: &Engine, token: &str, repo_id: &RepoId) -> Result<TokenInfo, ApiError> {
    let info = match engine.caches.token(token, false) {
        Some(info) => info,
        None => {
            let info = engine
                .auth
                .lookup_token(token)
                .await?
                .ok_or_else(|| SyncError::auth_denied("unknown token"))?;
            engine.caches.put_token(token, info.clone());
            info
        }
    };
    if &info.repo_id != repo_id {
        return Err(SyncError::auth_denied("token does not match repo").into());
    }
    Ok(info)
}

/// Require write (`rw`) permission for `user` on `repo_id`, consulting the
/// permission cache first.
pub async fn require_write_permission(engine: &Engine, repo_id: &RepoId, user: &str) -> Result<(), ApiError> {
    let perm = match engine.caches.permission(repo_id, user, false) {
        Some(perm) => perm,
        None => {
            let perm = engine
                .auth
                .permission(repo_id, user)
                .await?
                .ok_or_else(|| SyncError::perm_denied("no access to repo"))?;
            engine.caches.put_permission(repo_id, user, perm);
            perm
        }
    };
    if !perm.can_write() {
        return Err(SyncError::perm_denied("read-only access").into());
    }
    Ok(())
}

/// Reject a repo that has been deleted or flagged corrupted, ahead of any
/// object-store access (the 441/445 domain codes of spec.md §6.2).
pub async fn check_repo_alive(engine: &Engine, repo_id: &RepoId) -> Result<(), ApiError> {
    if !engine.auth.repo_exists(repo_id).await? {
        return Err(ApiError::RepoDeleted);
    }
    if engine.auth.is_repo_corrupted(repo_id).await? {
        return Err(ApiError::RepoCorrupted);
    }
    Ok(())
}
