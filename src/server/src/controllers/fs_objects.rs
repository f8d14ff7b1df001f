//! Bulk fs-object transfer and diffing: `fs-id-list`, `check-fs`,
//! `recv-fs`, `pack-fs`, `block-map` (spec.md §6.2, §4.3).

use std::collections::HashSet;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use syncwerk::constants::PACK_FS_SIZE_LIMIT;
use syncwerk::model::ObjectId;

use crate::app_data::AppState;
use crate::errors::ApiError;
use crate::middleware::token_auth::validate_token;
use crate::params::{extract_token, parse_repo_id};

#[derive(Debug, Deserialize)]
pub struct FsIdListQuery {
    #[serde(rename = "server-head")]
    pub server_head: String,
    #[serde(rename = "client-head", default)]
    pub client_head: Option<String>,
    #[serde(rename = "dir-only", default)]
    pub dir_only: Option<u8>,
}

pub async fn fs_id_list(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<FsIdListQuery>,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let repo_id = parse_repo_id(&path)?;
    let token = extract_token(&req)?;
    validate_token(engine, &token, &repo_id).await?;

    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;
    let dir_only = query.dir_only.unwrap_or(0) != 0;

    let server_head_id = ObjectId::parse(query.server_head.clone())?;
    let server_commit = engine.commits.get_commit(&store, version, &server_head_id)?;

    let fs = engine.fs.clone();
    let store_for_task = store.clone();
    let server_root = server_commit.root_id.clone();
    let client_root = match &query.client_head {
        Some(raw) => {
            let client_id = ObjectId::parse(raw.clone())?;
            Some(engine.commits.get_commit(&store, version, &client_id)?.root_id)
        }
        None => None,
    };

    let missing = engine
        .io_sched
        .run(move || {
            let server_ids = fs.reachable_ids(&store_for_task, version, &server_root, dir_only)?;
            let client_ids = match &client_root {
                Some(root) => fs.reachable_ids(&store_for_task, version, root, dir_only)?,
                None => HashSet::new(),
            };
            Ok(server_ids.difference(&client_ids).map(|id| id.to_string()).collect::<Vec<_>>())
        })
        .await?;

    Ok(HttpResponse::Ok().json(missing))
}

pub async fn check_fs(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Vec<String>>,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let repo_id = parse_repo_id(&path)?;
    let token = extract_token(&req)?;
    validate_token(engine, &token, &repo_id).await?;

    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;

    let ids = body.into_inner();
    let fs = engine.fs.clone();
    let missing = engine
        .io_sched
        .run(move || {
            let mut missing = Vec::new();
            for raw in ids {
                let id = ObjectId::parse(raw.clone())?;
                if !fs.exists(&store, version, &id) {
                    missing.push(raw);
                }
            }
            Ok(missing)
        })
        .await?;
    Ok(HttpResponse::Ok().json(missing))
}

/// Decode the `{char[40] id, be32 size, bytes[size]}*` wire records shared
/// by `recv-fs` and `pack-fs`.
fn decode_records(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ApiError> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        if cursor + 44 > bytes.len() {
            return Err(syncwerk::error::SyncError::bad_input("truncated fs record").into());
        }
        let id = String::from_utf8(bytes[cursor..cursor + 40].to_vec())
            .map_err(|_| syncwerk::error::SyncError::bad_input("fs record id is not utf8"))?;
        cursor += 40;
        let size = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if cursor + size > bytes.len() {
            return Err(syncwerk::error::SyncError::bad_input("truncated fs record body").into());
        }
        out.push((id, bytes[cursor..cursor + size].to_vec()));
        cursor += size;
    }
    Ok(out)
}

fn encode_record(id: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(id.as_bytes());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

pub async fn recv_fs(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let repo_id = parse_repo_id(&path)?;
    let token = extract_token(&req)?;
    let info = validate_token(engine, &token, &repo_id).await?;
    crate::middleware::token_auth::require_write_permission(engine, &repo_id, &info.user_email).await?;

    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;

    let records = decode_records(&body)?;
    let fs = engine.fs.clone();
    engine
        .io_sched
        .run(move || {
            for (raw_id, data) in records {
                let id = ObjectId::parse(raw_id)?;
                fs.put_raw_verified(&store, version, &id, &data)?;
            }
            Ok(())
        })
        .await?;

    Ok(HttpResponse::Ok().finish())
}

pub async fn pack_fs(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Vec<String>>,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let repo_id = parse_repo_id(&path)?;
    let token = extract_token(&req)?;
    validate_token(engine, &token, &repo_id).await?;

    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;

    let ids = body.into_inner();
    let fs = engine.fs.clone();
    let packed = engine
        .io_sched
        .run(move || {
            let mut packed = Vec::new();
            let mut queued = 0usize;
            let mut skipped = 0usize;
            for raw in ids {
                if queued >= PACK_FS_SIZE_LIMIT {
                    skipped += 1;
                    continue;
                }
                let id = ObjectId::parse(raw.clone())?;
                let data = fs.get_raw(&store, version, &id)?;
                queued += data.len();
                packed.extend(encode_record(&raw, &data));
            }
            if skipped > 0 {
                log::info!("pack-fs: {skipped} object(s) dropped past the {PACK_FS_SIZE_LIMIT}-byte limit");
            }
            Ok(packed)
        })
        .await?;

    Ok(HttpResponse::Ok().content_type("application/octet-stream").body(packed))
}

pub async fn block_map(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let (repo_id_raw, file_id_raw) = path.into_inner();
    let repo_id = parse_repo_id(&repo_id_raw)?;
    let file_id = ObjectId::parse(file_id_raw)?;
    let token = extract_token(&req)?;
    validate_token(engine, &token, &repo_id).await?;

    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;

    let file = engine.fs.get_syncwerk(&store, version, &file_id)?;
    let mut sizes = Vec::with_capacity(file.block_ids.len());
    for block_id in &file.block_ids {
        sizes.push(engine.blocks.stat_block(&store, version, block_id.as_str())?);
    }

    Ok(HttpResponse::Ok().json(sizes))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/repo/{repo_id}/fs-id-list/", web::get().to(fs_id_list))
        .route("/repo/{repo_id}/check-fs", web::post().to(check_fs))
        .route("/repo/{repo_id}/recv-fs", web::post().to(recv_fs))
        .route("/repo/{repo_id}/pack-fs", web::post().to(pack_fs))
        .route("/repo/{repo_id}/block-map/{file_id}", web::get().to(block_map));
}
