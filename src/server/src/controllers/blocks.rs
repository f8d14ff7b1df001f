//! Block download/upload and the `check-blocks` existence probe
//! (spec.md §6.2, §4.2).

use actix_web::{web, HttpRequest, HttpResponse};

use syncwerk::store::BlockMode;

use crate::app_data::AppState;
use crate::errors::ApiError;
use crate::middleware::token_auth::{require_write_permission, validate_token};
use crate::params::{extract_token, parse_repo_id};

pub async fn get_block(req: HttpRequest, state: web::Data<AppState>, path: web::Path<(String, String)>) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let (repo_id_raw, block_id) = path.into_inner();
    let repo_id = parse_repo_id(&repo_id_raw)?;
    let token = extract_token(&req)?;
    validate_token(engine, &token, &repo_id).await?;

    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;

    let blocks = &engine.blocks;
    let mut handle = blocks.open_block(&store, version, &block_id, BlockMode::Read)?;
    let mut data = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = handle.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }

    engine.events.emit(syncwerk::events::Event::BytesTransferred {
        repo_id,
        bytes: data.len() as u64,
        upload: false,
    });

    Ok(HttpResponse::Ok().content_type("application/octet-stream").body(data))
}

pub async fn put_block(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let engine = &state.engine;
    let (repo_id_raw, block_id) = path.into_inner();
    let repo_id = parse_repo_id(&repo_id_raw)?;
    let token = extract_token(&req)?;
    let info = validate_token(engine, &token, &repo_id).await?;
    require_write_permission(engine, &repo_id, &info.user_email).await?;

    let version = engine.auth.repo_version(&repo_id).await?;
    let store = engine.quota.store_id_for(&repo_id).await?;

    let mut handle = engine.blocks.open_block(&store, version, &block_id, BlockMode::Write)?;
    handle.write(&body)?;
    engine.blocks.commit_block(handle)?;

    if !engine.blocks.verify_block(&store, version, &block_id)? {
        engine.blocks.remove_block(&store, version, &block_id)?;
        return Err(syncwerk::error::SyncError::bad_input("block content does not hash to the given id").into());
    }

    engine.events.emit(syncwerk::events::Event::BytesTransferred {
        repo_id,
        bytes: body.len() as u64,
        upload: true,
    });

    Ok(HttpResponse::Ok().finish())
}

pub async fn check_blocks(
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

    let missing: Vec<String> = body
        .into_inner()
        .into_iter()
        .filter(|id| !engine.blocks.block_exists(&store, version, id))
        .collect();

    Ok(HttpResponse::Ok().json(missing))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/repo/{repo_id}/block/{block_id}", web::get().to(get_block))
        .route("/repo/{repo_id}/block/{block_id}", web::put().to(put_block))
        .route("/repo/{repo_id}/check-blocks", web::post().to(check_blocks));
}
