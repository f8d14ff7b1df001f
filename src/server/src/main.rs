//! Binary entry point: the "small launcher" of spec.md §6.3. Reads
//! `(central_config_dir, data_dir)` from the command line, wires up the
//! `sqlx`-backed directory/quota implementations, builds the `Engine`,
//! and serves the HTTP surface.

pub mod app_data;
pub mod controllers;
pub mod errors;
pub mod middleware;
pub mod params;
pub mod routes;
pub mod tasks;

use std::io::Write;
use std::path::PathBuf;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer};
use env_logger::Env;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

use syncwerk::auth::SqlAuthDirectory;
use syncwerk::config::ServerConfig;
use syncwerk::quota::{SqlQuotaStore, SqlUserStore};
use syncwerk::Engine;

const USAGE: &str = "Usage: syncwerk-server <central_config_dir> <data_dir>";

async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE TABLE IF NOT EXISTS branch (repo_id TEXT, name TEXT, commit_id TEXT, PRIMARY KEY (repo_id, name))")
        .execute(pool)
        .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS repo (repo_id TEXT PRIMARY KEY, version INTEGER, is_corrupted INTEGER)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS repo_owner (repo_id TEXT PRIMARY KEY, owner_id TEXT)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS repo_size (repo_id TEXT PRIMARY KEY, size INTEGER)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS virtual_repo (repo_id TEXT PRIMARY KEY, origin_repo TEXT)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS user_quota (user TEXT PRIMARY KEY, quota INTEGER)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS org_quota (org_id INTEGER PRIMARY KEY, quota INTEGER)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS org_user_quota (org_id INTEGER, user TEXT, quota INTEGER, PRIMARY KEY (org_id, user))",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS repo_token (token TEXT PRIMARY KEY, repo_id TEXT, user_email TEXT)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS repo_user_perm (repo_id TEXT, user_email TEXT, permission TEXT, PRIMARY KEY (repo_id, user_email))",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS repo_client_info (repo_id TEXT, user_email TEXT, client_id TEXT, client_ver TEXT, client_name TEXT,
         PRIMARY KEY (repo_id, user_email, client_id))",
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}: {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (central_config_dir, data_dir) = match args.as_slice() {
        [_, config_dir, data_dir] => (PathBuf::from(config_dir), PathBuf::from(data_dir)),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    let config = ServerConfig::load(&central_config_dir).map_err(std::io::Error::other)?;

    if config.database.db_type != "sqlite" {
        log::warn!(
            "database.type = \"{}\" is not supported by this build, falling back to sqlite",
            config.database.db_type
        );
    }

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("syncwerk.db");
    let connect_opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .map_err(std::io::Error::other)?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(connect_opts).await.map_err(std::io::Error::other)?;

    if config.database.create_tables {
        create_tables(&pool).await.map_err(std::io::Error::other)?;
    }

    let users = Box::new(SqlUserStore::new(pool.clone()));
    let quotas = Box::new(SqlQuotaStore::new(pool.clone()));
    let auth = Box::new(SqlAuthDirectory::new(pool.clone()));

    let host = config.fileserver.host.clone();
    let port = config.fileserver.port;
    let workers = config.fileserver.worker_threads;

    let engine = std::sync::Arc::new(Engine::new(config, &data_dir, pool, users, quotas, auth).map_err(std::io::Error::other)?);

    engine.spawn_background_tasks();
    tasks::post_push_complete::spawn(engine.clone());

    log::info!("syncwerk-server listening on {host}:{port}");

    let app_state = app_data::AppState::data(engine);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
            .wrap(Logger::default())
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
