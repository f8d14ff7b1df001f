//! C5 — branch manager: named refs with compare-and-swap head update, plus
//! the push-merge retry loop (spec.md §4.5).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sqlx::sqlite::SqlitePool;

use crate::commit::CommitManager;
use crate::constants::{CAS_RETRY_BACKOFF_MAX_MS, CAS_RETRY_BACKOFF_MIN_MS, MAX_CAS_RETRIES};
use crate::error::SyncError;
use crate::merge::{MergeEngine, MergeOutcome};
use crate::model::{Commit, ObjectId, RepoId};

/// Outcome of a successful push: either a fast-forward or a real merge.
pub struct PushResult {
    pub merged_commit_id: ObjectId,
    pub conflict: bool,
}

pub struct BranchManager {
    pool: SqlitePool,
}

impl BranchManager {
    pub fn new(pool: SqlitePool) -> Self {
        BranchManager { pool }
    }

    pub async fn get_branch(&self, repo_id: &RepoId, name: &str) -> Result<Option<ObjectId>, SyncError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT commit_id FROM branch WHERE repo_id = ? AND name = ?")
            .bind(repo_id.to_string())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(id,)| ObjectId::parse(id)).transpose()
    }

    pub async fn set_branch(&self, repo_id: &RepoId, name: &str, commit_id: &ObjectId) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO branch (repo_id, name, commit_id) VALUES (?, ?, ?)
             ON CONFLICT(repo_id, name) DO UPDATE SET commit_id = excluded.commit_id",
        )
        .bind(repo_id.to_string())
        .bind(name)
        .bind(commit_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Conditional update: succeeds only if the stored `commit_id` still
    /// equals `expected_old_id`. Returns `Ok(true)` on success, `Ok(false)`
    /// on a lost CAS (the caller must re-read and retry).
    pub async fn cas_update(
        &self,
        repo_id: &RepoId,
        name: &str,
        new_id: &ObjectId,
        expected_old_id: &ObjectId,
    ) -> Result<bool, SyncError> {
        let result = sqlx::query("UPDATE branch SET commit_id = ? WHERE repo_id = ? AND name = ? AND commit_id = ?")
            .bind(new_id.as_str())
            .bind(repo_id.to_string())
            .bind(name)
            .bind(expected_old_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// Run the push-merge loop of spec.md §4.5: load the current head, fast
/// forward or three-way merge, then race the CAS up to `MAX_CAS_RETRIES`
/// times before giving up.
pub async fn push_with_merge(
    branches: &BranchManager,
    commits: &CommitManager,
    merge: &MergeEngine,
    store: &crate::model::StoreId,
    repo_id: &RepoId,
    branch_name: &str,
    base: &ObjectId,
    new_head_commit: &Commit,
    committer_email: Option<&str>,
) -> Result<PushResult, SyncError> {
    let mut attempt = 0;
    loop {
        let current_head_id = branches
            .get_branch(repo_id, branch_name)
            .await?
            .ok_or_else(|| SyncError::not_found("branch has no head"))?;

        let (merged_commit, conflict) = if &current_head_id == base {
            (new_head_commit.clone(), false)
        } else {
            let current_head = commits.get_commit(store, new_head_commit.version, &current_head_id)?;
            let base_commit = commits.get_commit(store, new_head_commit.version, base)?;

            let MergeOutcome { merged_root_id, conflict } = merge.merge_trees(
                store,
                new_head_commit.version,
                &base_commit.root_id,
                &current_head.root_id,
                &new_head_commit.root_id,
                committer_email,
            )?;

            let description = if conflict {
                "Auto merge by system".to_string()
            } else {
                format!("Merge {branch_name}")
            };

            let merge_commit = Commit {
                commit_id: ObjectId::empty(),
                root_id: merged_root_id,
                repo_id: repo_id.clone(),
                creator_id: new_head_commit.creator_id.clone(),
                creator_name: new_head_commit.creator_name.clone(),
                description,
                ctime: new_head_commit.ctime,
                parent_id: Some(current_head_id.clone()),
                second_parent_id: Some(new_head_commit.commit_id.clone()),
                repo_name: new_head_commit.repo_name.clone(),
                repo_desc: new_head_commit.repo_desc.clone(),
                version: new_head_commit.version,
                encrypted: new_head_commit.encrypted,
                enc_version: new_head_commit.enc_version,
                magic: new_head_commit.magic.clone(),
                random_key: new_head_commit.random_key.clone(),
                conflict,
                new_merge: true,
                repaired: false,
            };
            (merge_commit, conflict)
        };

        let merged_id = commits.add_commit(store, &merged_commit)?;

        if branches.cas_update(repo_id, branch_name, &merged_id, &current_head_id).await? {
            return Ok(PushResult {
                merged_commit_id: merged_id,
                conflict,
            });
        }

        attempt += 1;
        if attempt >= MAX_CAS_RETRIES {
            return Err(SyncError::internal("push-merge CAS retries exhausted (SERVERR)"));
        }
        let backoff_ms = rand::thread_rng().gen_range(CAS_RETRY_BACKOFF_MIN_MS..=CAS_RETRY_BACKOFF_MAX_MS);
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE branch (repo_id TEXT, name TEXT, commit_id TEXT, PRIMARY KEY (repo_id, name))")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn set_then_get_branch_round_trips() {
        let pool = test_pool().await;
        let mgr = BranchManager::new(pool);
        let repo = RepoId::new_v4();
        let id = ObjectId::parse("a".repeat(40)).unwrap();

        assert!(mgr.get_branch(&repo, "master").await.unwrap().is_none());
        mgr.set_branch(&repo, "master", &id).await.unwrap();
        assert_eq!(mgr.get_branch(&repo, "master").await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn cas_update_fails_on_stale_expected_id() {
        let pool = test_pool().await;
        let mgr = BranchManager::new(pool);
        let repo = RepoId::new_v4();
        let old = ObjectId::parse("a".repeat(40)).unwrap();
        let stale = ObjectId::parse("b".repeat(40)).unwrap();
        let new = ObjectId::parse("c".repeat(40)).unwrap();

        mgr.set_branch(&repo, "master", &old).await.unwrap();
        assert!(!mgr.cas_update(&repo, "master", &new, &stale).await.unwrap());
        assert!(mgr.cas_update(&repo, "master", &new, &old).await.unwrap());
        assert_eq!(mgr.get_branch(&repo, "master").await.unwrap(), Some(new));
    }
}
