//! Content-addressed object store and sync engine core for the syncwerk
//! fileserver (spec.md §1). Everything here is a plain library: the
//! `syncwerk-server` binary crate owns the HTTP surface and process
//! lifecycle.

pub mod auth;
pub mod cache;
pub mod commit;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod fs;
pub mod io_sched;
pub mod merge;
pub mod model;
pub mod quota;
pub mod store;
pub mod token;

use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::SqlitePool;

use auth::AuthDirectory;
use branch::BranchManager;
use cache::Caches;
use commit::CommitManager;
use constants::{BLOCKS_DIR, COMMITS_DIR, FS_DIR, STORAGE_DIR, TMP_DIR};
use error::SyncError;
use events::EventBus;
use fs::FsManager;
use io_sched::IoScheduler;
use merge::MergeEngine;
use quota::{QuotaManager, QuotaStore, UserDirectory};
use store::{BlockManager, FsObjectStoreBackend};
use token::WebTokenManager;

pub mod branch;

/// Everything a request handler needs, constructed once at startup and
/// shared behind an `Arc` (spec.md §9: "pass a context / engine struct
/// explicitly; avoid a process-wide mutable singleton").
pub struct Engine {
    pub blocks: BlockManager,
    pub fs: Arc<FsManager>,
    pub commits: CommitManager,
    pub branches: BranchManager,
    pub merge: MergeEngine,
    pub quota: QuotaManager,
    pub caches: Arc<Caches>,
    pub io_sched: IoScheduler,
    pub events: Arc<EventBus>,
    pub web_tokens: WebTokenManager,
    pub config: config::ServerConfig,
    pub auth: Box<dyn AuthDirectory>,
}

impl Engine {
    /// Build the engine from the data directory layout of spec.md §6.3:
    /// `storage/{blocks,fs,commits}/` plus a `tmp/` spool, and the pool's
    /// `server.conf`-driven config.
    pub fn new(
        config: config::ServerConfig,
        data_dir: &Path,
        pool: SqlitePool,
        users: Box<dyn UserDirectory>,
        quotas: Box<dyn QuotaStore>,
        auth: Box<dyn AuthDirectory>,
    ) -> Result<Self, SyncError> {
        let storage = data_dir.join(STORAGE_DIR);
        let tmp = data_dir.join(TMP_DIR);
        let blocks_root = storage.join(BLOCKS_DIR);

        let block_backend = Arc::new(FsObjectStoreBackend::new(blocks_root.clone(), tmp.clone())?);
        let fs_backend = Arc::new(FsObjectStoreBackend::new(storage.join(FS_DIR), tmp.clone())?);
        let commit_backend = Arc::new(FsObjectStoreBackend::new(storage.join(COMMITS_DIR), tmp.clone())?);

        let fs = Arc::new(FsManager::new(fs_backend));

        Ok(Engine {
            blocks: BlockManager::new(block_backend, blocks_root, tmp),
            fs: fs.clone(),
            commits: CommitManager::new(commit_backend),
            branches: BranchManager::new(pool),
            merge: MergeEngine::new(fs),
            quota: QuotaManager::new(users, quotas, &config.quota.default),
            caches: Caches::new(),
            io_sched: IoScheduler::new(config.fileserver.max_index_processing_threads.max(1)),
            events: Arc::new(EventBus::new()),
            web_tokens: WebTokenManager::new(config.fileserver.web_token_expire_time),
            config,
            auth,
        })
    }

    /// Spawn the cache sweeper. Call once after construction.
    pub fn spawn_background_tasks(&self) -> tokio::task::JoinHandle<()> {
        self.caches.spawn_sweeper()
    }
}
