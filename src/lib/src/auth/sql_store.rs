use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::AuthDirectory;
use crate::cache::TokenInfo;
use crate::error::SyncError;
use crate::model::{Permission, RepoId};

pub struct SqlAuthDirectory {
    pool: SqlitePool,
}

impl SqlAuthDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        SqlAuthDirectory { pool }
    }
}

#[async_trait]
impl AuthDirectory for SqlAuthDirectory {
    async fn lookup_token(&self, token: &str) -> Result<Option<TokenInfo>, SyncError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT repo_id, user_email FROM repo_token WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((repo_id, user_email)) => Ok(Some(TokenInfo {
                repo_id: RepoId::parse(&repo_id)?,
                user_email,
            })),
            None => Ok(None),
        }
    }

    async fn permission(&self, repo_id: &RepoId, user: &str) -> Result<Option<Permission>, SyncError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT permission FROM repo_user_perm WHERE repo_id = ? AND user_email = ?")
                .bind(repo_id.to_string())
                .bind(user)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(p,)| Permission::parse(&p)))
    }

    async fn repo_exists(&self, repo_id: &RepoId) -> Result<bool, SyncError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM repo WHERE repo_id = ?")
            .bind(repo_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn is_repo_corrupted(&self, repo_id: &RepoId) -> Result<bool, SyncError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT is_corrupted FROM repo WHERE repo_id = ?")
            .bind(repo_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(c,)| c != 0).unwrap_or(false))
    }

    async fn repo_version(&self, repo_id: &RepoId) -> Result<i32, SyncError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM repo WHERE repo_id = ?")
            .bind(repo_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(v,)| v as i32)
            .ok_or_else(|| SyncError::not_found(format!("repo {repo_id} not found")))
    }

    async fn record_client_info(
        &self,
        repo_id: &RepoId,
        user: &str,
        client_id: &str,
        client_ver: &str,
        client_name: &str,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO repo_client_info (repo_id, user_email, client_id, client_ver, client_name)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(repo_id, user_email, client_id) DO UPDATE SET
                client_ver = excluded.client_ver, client_name = excluded.client_name",
        )
        .bind(repo_id.to_string())
        .bind(user)
        .bind(client_id)
        .bind(client_ver)
        .bind(client_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE repo_token (token TEXT PRIMARY KEY, repo_id TEXT, user_email TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE repo_user_perm (repo_id TEXT, user_email TEXT, permission TEXT, PRIMARY KEY (repo_id, user_email))")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE repo (repo_id TEXT PRIMARY KEY, version INTEGER, is_corrupted INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE repo_client_info (repo_id TEXT, user_email TEXT, client_id TEXT, client_ver TEXT, client_name TEXT,
             PRIMARY KEY (repo_id, user_email, client_id))",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn lookup_token_resolves_repo_and_user() {
        let pool = test_pool().await;
        let repo = RepoId::new_v4();
        sqlx::query("INSERT INTO repo_token VALUES ('tok-1', ?, 'alice@example.com')")
            .bind(repo.to_string())
            .execute(&pool)
            .await
            .unwrap();
        let dir = SqlAuthDirectory::new(pool);
        let info = dir.lookup_token("tok-1").await.unwrap().unwrap();
        assert_eq!(info.repo_id, repo);
        assert_eq!(info.user_email, "alice@example.com");
        assert!(dir.lookup_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn permission_round_trips() {
        let pool = test_pool().await;
        let repo = RepoId::new_v4();
        sqlx::query("INSERT INTO repo_user_perm VALUES (?, 'alice@example.com', 'rw')")
            .bind(repo.to_string())
            .execute(&pool)
            .await
            .unwrap();
        let dir = SqlAuthDirectory::new(pool);
        assert_eq!(dir.permission(&repo, "alice@example.com").await.unwrap(), Some(Permission::ReadWrite));
        assert_eq!(dir.permission(&repo, "bob@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn repo_corruption_and_version_lookup() {
        let pool = test_pool().await;
        let repo = RepoId::new_v4();
        sqlx::query("INSERT INTO repo VALUES (?, 1, 1)")
            .bind(repo.to_string())
            .execute(&pool)
            .await
            .unwrap();
        let dir = SqlAuthDirectory::new(pool);
        assert!(dir.repo_exists(&repo).await.unwrap());
        assert!(dir.is_repo_corrupted(&repo).await.unwrap());
        assert_eq!(dir.repo_version(&repo).await.unwrap(), 1);
    }
}
