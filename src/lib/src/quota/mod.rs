//! C7 — quota manager: effective per-user/per-org quota and live usage
//! (spec.md §4.7). Identity and quota storage are modeled as async trait
//! seams, matching the "external identity service... via RPC" boundary
//! of spec.md §1.

mod sql_store;

use async_trait::async_trait;

pub use sql_store::{SqlQuotaStore, SqlUserStore};

use crate::error::SyncError;
use crate::model::{RepoId, StoreId};

/// No quota configured: unlimited.
pub const INFINITE_QUOTA: i64 = -2;

/// `0` within limit, `1` exceeded, `-1` internal error (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCheck {
    WithinLimit,
    Exceeded,
}

/// Looks up who owns a repo and which repos belong to a user — the
/// external identity service of spec.md §1, consulted via RPC in the
/// original system.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn repo_owner(&self, repo_id: &RepoId) -> Result<Option<String>, SyncError>;
    async fn origin_repo(&self, repo_id: &RepoId) -> Result<Option<RepoId>, SyncError>;
    /// Non-virtual repos owned by `user`, with their current sizes.
    async fn owned_repo_sizes(&self, user: &str) -> Result<Vec<(RepoId, u64)>, SyncError>;
    /// Persist a freshly recomputed total size for `repo_id` (spec.md
    /// §4.5 step 6 / §4.7): the write side of `owned_repo_sizes`, called
    /// after a quota-recompute event so subsequent `check_quota` calls see
    /// this push's effect.
    async fn set_repo_size(&self, repo_id: &RepoId, size: u64) -> Result<(), SyncError>;
    /// Virtual repos whose origin is `origin_repo_id` — the inverse of
    /// `origin_repo`, used by the post-push virtual-repo cleanup hook
    /// (spec.md §4.5 step 6) to find repos that need their derived state
    /// refreshed after the origin's head moves.
    async fn descendant_virtual_repos(&self, origin_repo_id: &RepoId) -> Result<Vec<RepoId>, SyncError>;
}

/// Per-user/org configured quota overrides — opaque key/value queries
/// against what the original treats as the accounts schema (spec.md §1).
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn user_quota(&self, user: &str) -> Result<Option<i64>, SyncError>;
    async fn org_quota(&self, org_id: i64) -> Result<Option<i64>, SyncError>;
    async fn org_user_quota(&self, org_id: i64, user: &str) -> Result<Option<i64>, SyncError>;
}

/// Parse a config value like `"10"`, `"10g"`, `"500M"`. Suffix is decimal
/// (K/M/G/T = 10^3/10^6/10^9/10^12), matching `original_source/server/quota-mgr.c`.
/// Absent/invalid → `INFINITE_QUOTA`.
pub fn parse_quota_config(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return INFINITE_QUOTA;
    }
    let (digits, suffix) = match raw.find(|c: char| !c.is_ascii_digit() && c != '-') {
        Some(idx) => raw.split_at(idx),
        None => (raw, ""),
    };
    let value: i64 = match digits.parse() {
        Ok(v) => v,
        Err(_) => return INFINITE_QUOTA,
    };
    let multiplier: i64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        _ => return INFINITE_QUOTA,
    };
    value.saturating_mul(multiplier)
}

pub struct QuotaManager {
    users: Box<dyn UserDirectory>,
    quotas: Box<dyn QuotaStore>,
    default_quota: i64,
}

impl QuotaManager {
    pub fn new(users: Box<dyn UserDirectory>, quotas: Box<dyn QuotaStore>, default_quota_config: &str) -> Self {
        QuotaManager {
            users,
            quotas,
            default_quota: parse_quota_config(default_quota_config),
        }
    }

    /// The physical storage namespace for `repo_id`: its own id, or the
    /// origin repo's id if `repo_id` is a virtual repo.
    pub async fn store_id_for(&self, repo_id: &RepoId) -> Result<StoreId, SyncError> {
        match self.users.origin_repo(repo_id).await? {
            Some(origin) => Ok(StoreId::from_repo(&origin)),
            None => Ok(StoreId::from_repo(repo_id)),
        }
    }

    pub async fn effective_quota(&self, user: &str) -> Result<i64, SyncError> {
        match self.quotas.user_quota(user).await? {
            Some(q) => Ok(q),
            None => Ok(self.default_quota),
        }
    }

    pub async fn effective_org_quota(&self, org_id: i64, user: &str) -> Result<i64, SyncError> {
        if let Some(q) = self.quotas.org_user_quota(org_id, user).await? {
            return Ok(q);
        }
        match self.quotas.org_quota(org_id).await? {
            Some(q) => Ok(q),
            None => Ok(self.default_quota),
        }
    }

    /// Persist a recomputed total size for `repo_id` so later `check_quota`
    /// calls see it (spec.md §4.5 step 6 / §4.7).
    pub async fn record_repo_size(&self, repo_id: &RepoId, size: u64) -> Result<(), SyncError> {
        self.users.set_repo_size(repo_id, size).await
    }

    /// Virtual repos descended from `repo_id`, for the post-push
    /// virtual-repo cleanup hook (spec.md §4.5 step 6).
    pub async fn descendant_virtual_repos(&self, repo_id: &RepoId) -> Result<Vec<RepoId>, SyncError> {
        self.users.descendant_virtual_repos(repo_id).await
    }

    /// Usage across the user's non-virtual repos plus a projected `delta`,
    /// compared to the effective quota (spec.md §4.7).
    pub async fn check_quota(&self, repo_id: &RepoId, delta: i64) -> Result<QuotaCheck, SyncError> {
        let effective_repo = match self.users.origin_repo(repo_id).await? {
            Some(origin) => origin,
            None => repo_id.clone(),
        };

        let owner = match self.users.repo_owner(&effective_repo).await? {
            Some(owner) => owner,
            None => return Err(SyncError::internal("repo has no resolvable owner")),
        };

        let quota = self.effective_quota(&owner).await?;
        if quota == INFINITE_QUOTA {
            return Ok(QuotaCheck::WithinLimit);
        }

        let usage: i64 = self
            .users
            .owned_repo_sizes(&owner)
            .await?
            .into_iter()
            .map(|(_, size)| size as i64)
            .sum();

        if usage + delta < quota {
            Ok(QuotaCheck::WithinLimit)
        } else {
            Ok(QuotaCheck::Exceeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn parses_suffixed_quotas() {
        assert_eq!(parse_quota_config("10"), 10);
        assert_eq!(parse_quota_config("10K"), 10_000);
        assert_eq!(parse_quota_config("2m"), 2_000_000);
        assert_eq!(parse_quota_config("1G"), 1_000_000_000);
        assert_eq!(parse_quota_config("1t"), 1_000_000_000_000);
        assert_eq!(parse_quota_config(""), INFINITE_QUOTA);
        assert_eq!(parse_quota_config("bogus"), INFINITE_QUOTA);
    }

    struct FakeUsers {
        owners: HashMap<String, String>,
        origins: HashMap<String, String>,
        sizes: Mutex<HashMap<String, Vec<(RepoId, u64)>>>,
    }

    #[async_trait]
    impl UserDirectory for FakeUsers {
        async fn repo_owner(&self, repo_id: &RepoId) -> Result<Option<String>, SyncError> {
            Ok(self.owners.get(&repo_id.to_string()).cloned())
        }
        async fn origin_repo(&self, repo_id: &RepoId) -> Result<Option<RepoId>, SyncError> {
            match self.origins.get(&repo_id.to_string()) {
                Some(s) => Ok(Some(RepoId::parse(s)?)),
                None => Ok(None),
            }
        }
        async fn owned_repo_sizes(&self, user: &str) -> Result<Vec<(RepoId, u64)>, SyncError> {
            Ok(self.sizes.lock().unwrap().get(user).cloned().unwrap_or_default())
        }
        async fn set_repo_size(&self, repo_id: &RepoId, size: u64) -> Result<(), SyncError> {
            let mut sizes = self.sizes.lock().unwrap();
            for entries in sizes.values_mut() {
                if let Some(entry) = entries.iter_mut().find(|(id, _)| id == repo_id) {
                    entry.1 = size;
                    return Ok(());
                }
            }
            Ok(())
        }
        async fn descendant_virtual_repos(&self, origin_repo_id: &RepoId) -> Result<Vec<RepoId>, SyncError> {
            Ok(self
                .origins
                .iter()
                .filter(|(_, origin)| *origin == &origin_repo_id.to_string())
                .map(|(virt, _)| RepoId::parse(virt))
                .collect::<Result<Vec<_>, _>>()?)
        }
    }

    struct FakeQuotas {
        user: HashMap<String, i64>,
    }

    #[async_trait]
    impl QuotaStore for FakeQuotas {
        async fn user_quota(&self, user: &str) -> Result<Option<i64>, SyncError> {
            Ok(self.user.get(user).copied())
        }
        async fn org_quota(&self, _org_id: i64) -> Result<Option<i64>, SyncError> {
            Ok(None)
        }
        async fn org_user_quota(&self, _org_id: i64, _user: &str) -> Result<Option<i64>, SyncError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn within_quota_returns_ok() {
        let repo = RepoId::new_v4();
        let users = FakeUsers {
            owners: HashMap::from([(repo.to_string(), "alice".to_string())]),
            origins: HashMap::new(),
            sizes: Mutex::new(HashMap::from([("alice".to_string(), vec![(repo.clone(), 100)])])),
        };
        let quotas = FakeQuotas {
            user: HashMap::from([("alice".to_string(), 1000)]),
        };
        let mgr = QuotaManager::new(Box::new(users), Box::new(quotas), "");
        assert_eq!(mgr.check_quota(&repo, 0).await.unwrap(), QuotaCheck::WithinLimit);
    }

    #[tokio::test]
    async fn exceeding_quota_is_reported() {
        let repo = RepoId::new_v4();
        let users = FakeUsers {
            owners: HashMap::from([(repo.to_string(), "alice".to_string())]),
            origins: HashMap::new(),
            sizes: Mutex::new(HashMap::from([("alice".to_string(), vec![(repo.clone(), 900)])])),
        };
        let quotas = FakeQuotas {
            user: HashMap::from([("alice".to_string(), 1000)]),
        };
        let mgr = QuotaManager::new(Box::new(users), Box::new(quotas), "");
        assert_eq!(mgr.check_quota(&repo, 200).await.unwrap(), QuotaCheck::Exceeded);
    }

    #[tokio::test]
    async fn virtual_repo_checks_origins_usage() {
        let origin = RepoId::new_v4();
        let virt = RepoId::new_v4();
        let users = FakeUsers {
            owners: HashMap::from([(origin.to_string(), "alice".to_string())]),
            origins: HashMap::from([(virt.to_string(), origin.to_string())]),
            sizes: Mutex::new(HashMap::from([("alice".to_string(), vec![(origin.clone(), 50)])])),
        };
        let quotas = FakeQuotas {
            user: HashMap::from([("alice".to_string(), 1000)]),
        };
        let mgr = QuotaManager::new(Box::new(users), Box::new(quotas), "");
        assert_eq!(mgr.check_quota(&virt, 0).await.unwrap(), QuotaCheck::WithinLimit);
    }

    #[tokio::test]
    async fn store_id_for_virtual_repo_resolves_to_origin() {
        let origin = RepoId::new_v4();
        let virt = RepoId::new_v4();
        let users = FakeUsers {
            owners: HashMap::new(),
            origins: HashMap::from([(virt.to_string(), origin.to_string())]),
            sizes: Mutex::new(HashMap::new()),
        };
        let quotas = FakeQuotas { user: HashMap::new() };
        let mgr = QuotaManager::new(Box::new(users), Box::new(quotas), "");
        assert_eq!(mgr.store_id_for(&virt).await.unwrap(), crate::model::StoreId::from_repo(&origin));
        assert_eq!(mgr.store_id_for(&origin).await.unwrap(), crate::model::StoreId::from_repo(&origin));
    }

    #[tokio::test]
    async fn unlimited_default_quota_always_passes() {
        let repo = RepoId::new_v4();
        let users = FakeUsers {
            owners: HashMap::from([(repo.to_string(), "alice".to_string())]),
            origins: HashMap::new(),
            sizes: Mutex::new(HashMap::from([("alice".to_string(), vec![(repo.clone(), u64::MAX / 2)])])),
        };
        let quotas = FakeQuotas { user: HashMap::new() };
        let mgr = QuotaManager::new(Box::new(users), Box::new(quotas), "");
        assert_eq!(mgr.check_quota(&repo, 0).await.unwrap(), QuotaCheck::WithinLimit);
    }
}
