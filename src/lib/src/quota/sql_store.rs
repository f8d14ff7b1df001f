//! Concrete `UserDirectory`/`QuotaStore` backed by `sqlx`, standing in for
//! the external identity-service RPC the original system makes (spec.md
//! §1). Good enough for tests and single-node local runs.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::{QuotaStore, UserDirectory};
use crate::error::SyncError;
use crate::model::RepoId;

pub struct SqlUserStore {
    pool: SqlitePool,
}

impl SqlUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqlUserStore { pool }
    }
}

#[async_trait]
impl UserDirectory for SqlUserStore {
    async fn repo_owner(&self, repo_id: &RepoId) -> Result<Option<String>, SyncError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT owner_id FROM repo_owner WHERE repo_id = ?")
            .bind(repo_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(owner,)| owner))
    }

    async fn origin_repo(&self, repo_id: &RepoId) -> Result<Option<RepoId>, SyncError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT origin_repo FROM virtual_repo WHERE repo_id = ?")
            .bind(repo_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(id,)| RepoId::parse(&id)).transpose()
    }

    async fn owned_repo_sizes(&self, user: &str) -> Result<Vec<(RepoId, u64)>, SyncError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT ro.repo_id, rs.size FROM repo_owner ro
             JOIN repo_size rs ON rs.repo_id = ro.repo_id
             WHERE ro.owner_id = ? AND ro.repo_id NOT IN (SELECT repo_id FROM virtual_repo)",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, size)| Ok((RepoId::parse(&id)?, size.max(0) as u64)))
            .collect()
    }

    async fn set_repo_size(&self, repo_id: &RepoId, size: u64) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO repo_size (repo_id, size) VALUES (?, ?)
             ON CONFLICT(repo_id) DO UPDATE SET size = excluded.size",
        )
        .bind(repo_id.to_string())
        .bind(size as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn descendant_virtual_repos(&self, origin_repo_id: &RepoId) -> Result<Vec<RepoId>, SyncError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT repo_id FROM virtual_repo WHERE origin_repo = ?")
            .bind(origin_repo_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|(id,)| RepoId::parse(&id)).collect()
    }
}

pub struct SqlQuotaStore {
    pool: SqlitePool,
}

impl SqlQuotaStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqlQuotaStore { pool }
    }
}

#[async_trait]
impl QuotaStore for SqlQuotaStore {
    async fn user_quota(&self, user: &str) -> Result<Option<i64>, SyncError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT quota FROM user_quota WHERE user = ?")
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(q,)| q))
    }

    async fn org_quota(&self, org_id: i64) -> Result<Option<i64>, SyncError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT quota FROM org_quota WHERE org_id = ?")
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(q,)| q))
    }

    async fn org_user_quota(&self, org_id: i64, user: &str) -> Result<Option<i64>, SyncError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT quota FROM org_user_quota WHERE org_id = ? AND user = ?")
            .bind(org_id)
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(q,)| q))
    }
}
