//! Token/permission/repo-metadata directory: the identity and repo
//! bookkeeping the original system keeps in `CcnetDB`/`SeafileDB` and
//! consults over RPC (spec.md §1, §4.8). Modeled as an async trait seam
//! like `quota::{UserDirectory, QuotaStore}`, with a concrete `sqlx`
//! implementation for tests and single-node runs.

mod sql_store;

use async_trait::async_trait;

pub use sql_store::SqlAuthDirectory;

use crate::cache::TokenInfo;
use crate::error::SyncError;
use crate::model::{Permission, RepoId};

#[async_trait]
pub trait AuthDirectory: Send + Sync {
    /// Resolve a `Seafile-Repo-Token` value to the repo/user it was issued
    /// for. `None` means the token is unknown (auth denied).
    async fn lookup_token(&self, token: &str) -> Result<Option<TokenInfo>, SyncError>;

    /// Permission level `user` holds on `repo_id`. `None` means no access.
    async fn permission(&self, repo_id: &RepoId, user: &str) -> Result<Option<Permission>, SyncError>;

    async fn repo_exists(&self, repo_id: &RepoId) -> Result<bool, SyncError>;

    async fn is_repo_corrupted(&self, repo_id: &RepoId) -> Result<bool, SyncError>;

    /// The repo's data-format version, selecting its storage namespace.
    async fn repo_version(&self, repo_id: &RepoId) -> Result<i32, SyncError>;

    /// Record client identity on a permission-check call (spec.md §4.9
    /// "record client info").
    async fn record_client_info(
        &self,
        repo_id: &RepoId,
        user: &str,
        client_id: &str,
        client_ver: &str,
        client_name: &str,
    ) -> Result<(), SyncError>;
}
