//! `server.conf` parsing (spec.md §6.2). TOML, mirroring the teacher's
//! `UserConfig` idiom: a `#[derive(Deserialize)]` struct per section with
//! `serde(default)` filling in the spec's documented defaults.

use std::path::Path;

use serde::Deserialize;

use crate::constants::{DEFAULT_FIXED_BLOCK_SIZE, DEFAULT_WEB_TOKEN_EXPIRE_SECS};
use crate::error::SyncError;

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8082
}
fn default_worker_threads() -> usize {
    10
}
fn default_fixed_block_size_mb() -> u64 {
    8
}
fn default_web_token_expire_time() -> u64 {
    DEFAULT_WEB_TOKEN_EXPIRE_SECS
}
fn default_max_indexing_threads() -> usize {
    1
}
fn default_max_index_processing_threads() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// MiB in the config file; `fixed_block_size_bytes` converts.
    #[serde(default = "default_fixed_block_size_mb")]
    pub fixed_block_size: u64,
    #[serde(default = "default_web_token_expire_time")]
    pub web_token_expire_time: u64,
    #[serde(default = "default_max_indexing_threads")]
    pub max_indexing_threads: usize,
    #[serde(default = "default_max_index_processing_threads")]
    pub max_index_processing_threads: usize,
}

impl FileServerConfig {
    pub fn fixed_block_size_bytes(&self) -> u64 {
        self.fixed_block_size * 1024 * 1024
    }
}

impl Default for FileServerConfig {
    fn default() -> Self {
        FileServerConfig {
            host: default_host(),
            port: default_port(),
            worker_threads: default_worker_threads(),
            fixed_block_size: default_fixed_block_size_mb(),
            web_token_expire_time: default_web_token_expire_time(),
            max_indexing_threads: default_max_indexing_threads(),
            max_index_processing_threads: default_max_index_processing_threads(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZipConfig {
    pub windows_encoding: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type", default = "default_db_type")]
    pub db_type: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub unix_socket: Option<String>,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub connection_charset: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub create_tables: bool,
}

fn default_db_type() -> String {
    "sqlite".to_string()
}
fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            db_type: default_db_type(),
            host: None,
            port: None,
            user: None,
            password: None,
            db_name: None,
            unix_socket: None,
            use_ssl: false,
            connection_charset: None,
            max_connections: default_max_connections(),
            create_tables: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaConfig {
    /// Raw config string (e.g. `"2g"`), parsed via
    /// `crate::quota::parse_quota_config`.
    #[serde(default)]
    pub default: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadPoolSizeConfig {
    #[serde(default = "default_rpc_pool_size")]
    pub rpc: usize,
    #[serde(default = "default_sync_pool_size")]
    pub sync: usize,
}

fn default_rpc_pool_size() -> usize {
    10
}
fn default_sync_pool_size() -> usize {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "fileserver", default)]
    pub fileserver: FileServerConfig,
    #[serde(default)]
    pub zip: ZipConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(rename = "thread pool size", default)]
    pub thread_pool_size: ThreadPoolSizeConfig,
}

impl ServerConfig {
    pub fn load(central_config_dir: &Path) -> Result<Self, SyncError> {
        let path = central_config_dir.join("server.conf");
        let raw = std::fs::read_to_string(&path)
            .map_err(|err| SyncError::bad_input(format!("cannot read {}: {err}", path.display())))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        toml::from_str(raw).map_err(|err| SyncError::bad_input(format!("invalid server.conf: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_fills_in_documented_defaults() {
        let cfg = ServerConfig::parse("").unwrap();
        assert_eq!(cfg.fileserver.host, "0.0.0.0");
        assert_eq!(cfg.fileserver.port, 8082);
        assert_eq!(cfg.fileserver.worker_threads, 10);
        assert_eq!(cfg.fileserver.fixed_block_size_bytes(), 8 * 1024 * 1024);
        assert_eq!(cfg.fileserver.web_token_expire_time, 3600);
        assert_eq!(cfg.thread_pool_size.rpc, 10);
    }

    #[test]
    fn parses_overridden_sections() {
        let raw = r#"
            [fileserver]
            host = "127.0.0.1"
            port = 9000
            fixed_block_size = 4

            [database]
            type = "mysql"
            host = "db.internal"
            max_connections = 50

            [quota]
            default = "2g"

            [thread pool size]
            rpc = 4
            sync = 2
        "#;
        let cfg = ServerConfig::parse(raw).unwrap();
        assert_eq!(cfg.fileserver.host, "127.0.0.1");
        assert_eq!(cfg.fileserver.port, 9000);
        assert_eq!(cfg.fileserver.fixed_block_size_bytes(), 4 * 1024 * 1024);
        assert_eq!(cfg.database.db_type, "mysql");
        assert_eq!(cfg.database.max_connections, 50);
        assert_eq!(cfg.quota.default, "2g");
        assert_eq!(cfg.thread_pool_size.rpc, 4);
        assert_eq!(cfg.thread_pool_size.sync, 2);
    }
}
