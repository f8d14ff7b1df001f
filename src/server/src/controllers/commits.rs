//! Commit HEAD get/put, batched head lookup, and individual commit
//! object transfer (spec.md §6.2, §4.4, §4.5).

use std::collections::BTreeMap;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use syncwerk::branch::push_with_merge;
use syncwerk::constants::MASTER_BRANCH;
use syncwerk::error::SyncError;
use syncwerk::events::Event;
use syncwerk::model::{ObjectId, RepoId};
use syncwerk::quota::QuotaCheck;

use crate::app_data::AppState;
use crate::errors::ApiError;
use crate::middleware::token_auth::{check_repo_alive, require_write_permission, validate_token};
use crate::params::{extract_token, parse_repo_id};

pub async fn get_head(req: HttpRequest, state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let repo_id = parse_repo_id(&path)?;
    let token = extract_token(&req)?;
    validate_token(engine, &token, &repo_id).await?;

    if !engine.auth.repo_exists(&repo_id).await? {
        return Err(ApiError::RepoDeleted);
    }
    if engine.auth.is_repo_corrupted(&repo_id).await? {
        return Ok(HttpResponse::Ok().json(json!({ "is_corrupted": 1 })));
    }

    let head = engine
        .branches
        .get_branch(&repo_id, MASTER_BRANCH)
        .await?
        .ok_or_else(|| SyncError::not_found("repo has no head commit"))?;

    Ok(HttpResponse::Ok().json(json!({ "is_corrupted": 0, "head_commit_id": head.to_string() })))
}

#[derive(Debug, Deserialize)]
pub struct PushQuery {
    pub head: String,
}

/// Usage delta projected by replacing `old_root` with `new_root`, used to
/// gate the push against quota before any branch mutation happens.
async fn projected_delta(
    engine: &syncwerk::Engine,
    store: &syncwerk::model::StoreId,
    version: i32,
    old_root: &ObjectId,
    new_root: &ObjectId,
) -> Result<i64, ApiError> {
    let fs = engine.fs.clone();
    let store = store.clone();
    let old_root = old_root.clone();
    let new_root = new_root.clone();
    let (old_size, new_size) = engine
        .io_sched
        .run(move || {
            let old_size = fs.get_file_count_info(&store, version, &old_root)?.total_size;
            let new_size = fs.get_file_count_info(&store, version, &new_root)?.total_size;
            Ok((old_size, new_size))
        })
        .await?;
    Ok(new_size as i64 - old_size as i64)
}

pub async fn put_head(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PushQuery>,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let repo_id = parse_repo_id(&path)?;
    let token = extract_token(&req)?;
    let info = validate_token(engine, &token, &repo_id).await?;
    require_write_permission(engine, &repo_id, &info.user_email).await?;
    check_repo_alive(engine, &repo_id).await?;

    let new_head_id = ObjectId::parse(query.head.clone())?;
    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;

    let new_head_commit = {
        let commits = &engine.commits;
        commits.get_commit(&store, version, &new_head_id)?
    };

    let current_head = engine.branches.get_branch(&repo_id, MASTER_BRANCH).await?;
    let old_root = match &current_head {
        Some(id) => engine.commits.get_commit(&store, version, id)?.root_id,
        None => ObjectId::empty(),
    };

    let delta = projected_delta(engine, &store, version, &old_root, &new_head_commit.root_id).await?;
    if engine.quota.check_quota(&repo_id, delta).await? == QuotaCheck::Exceeded {
        return Err(ApiError::NoQuota);
    }

    match current_head {
        None => {
            engine.branches.set_branch(&repo_id, MASTER_BRANCH, &new_head_id).await?;
        }
        Some(_) => {
            let base = new_head_commit.parent_id.clone().unwrap_or_else(ObjectId::empty);
            push_with_merge(
                &engine.branches,
                &engine.commits,
                &engine.merge,
                &store,
                &repo_id,
                MASTER_BRANCH,
                &base,
                &new_head_commit,
                Some(&info.user_email),
            )
            .await?;
        }
    }

    engine.events.emit(Event::QuotaRecompute { repo_id: repo_id.clone() });
    engine.events.emit(Event::VirtualRepoCleanup { repo_id: repo_id.clone() });
    engine.events.emit(Event::CommitCreated {
        repo_id,
        commit_id: new_head_id,
        creator_name: new_head_commit.creator_name,
    });

    Ok(HttpResponse::Ok().finish())
}

pub async fn head_commits_multi(state: web::Data<AppState>, body: web::Json<Vec<String>>) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let mut out: BTreeMap<String, Option<String>> = BTreeMap::new();

    for raw in body.into_inner() {
        let repo_id = match RepoId::parse(&raw) {
            Ok(id) => id,
            Err(_) => continue,
        };
        if !engine.auth.repo_exists(&repo_id).await? || engine.auth.is_repo_corrupted(&repo_id).await? {
            out.insert(raw, None);
            continue;
        }
        let head = engine.branches.get_branch(&repo_id, MASTER_BRANCH).await?;
        out.insert(raw, head.map(|id| id.to_string()));
    }

    Ok(HttpResponse::Ok().json(out))
}

pub async fn get_commit(req: HttpRequest, state: web::Data<AppState>, path: web::Path<(String, String)>) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let (repo_id_raw, commit_id_raw) = path.into_inner();
    let repo_id = parse_repo_id(&repo_id_raw)?;
    let commit_id = ObjectId::parse(commit_id_raw)?;
    let token = extract_token(&req)?;
    validate_token(engine, &token, &repo_id).await?;

    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;
    let commit = engine.commits.get_commit(&store, version, &commit_id)?;
    let (_, bytes) = syncwerk::commit::encode_commit(&commit)?;

    Ok(HttpResponse::Ok().content_type("application/json").body(bytes))
}

pub async fn put_commit(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let (repo_id_raw, commit_id_raw) = path.into_inner();
    let repo_id = parse_repo_id(&repo_id_raw)?;
    let commit_id = ObjectId::parse(commit_id_raw)?;
    let token = extract_token(&req)?;
    let info = validate_token(engine, &token, &repo_id).await?;
    require_write_permission(engine, &repo_id, &info.user_email).await?;

    let commit = syncwerk::commit::decode_commit(&body, Some(&commit_id))?;
    let store = engine.quota.store_id_for(&repo_id).await?;
    engine.commits.add_commit(&store, &commit)?;

    Ok(HttpResponse::Ok().finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/repo/{repo_id}/commit/HEAD", web::get().to(get_head))
        .route("/repo/{repo_id}/commit/HEAD", web::put().to(put_head))
        .route("/repo/head-commits-multi", web::post().to(head_commits_multi))
        .route("/repo/{repo_id}/commit/{commit_id}", web::get().to(get_commit))
        .route("/repo/{repo_id}/commit/{commit_id}", web::put().to(put_commit));
}
