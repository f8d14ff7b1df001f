//! C8 — in-memory caches in front of the permission/token/virtual-repo
//! SQL lookups, with a single sweeper task evicting expired entries
//! (spec.md §4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::constants::{CACHE_SWEEP_INTERVAL_SECS, PERM_CACHE_TTL_SECS, TOKEN_CACHE_TTL_SECS, VIRTUAL_REPO_CACHE_TTL_SECS};
use crate::model::{Permission, RepoId};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A TTL map behind a single mutex. `refresh_on_access` controls whether a
/// cache hit pushes the expiry back out (vir-repo-info does; token and
/// permission do not — spec.md §4.8).
struct TtlMap<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
    refresh_on_access: bool,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> TtlMap<K, V> {
    fn new(ttl_secs: u64, refresh_on_access: bool) -> Self {
        TtlMap {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
            refresh_on_access,
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                if self.refresh_on_access {
                    entry.expires_at = now + self.ttl;
                }
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.lock().insert(key, Entry { value, expires_at });
    }

    fn invalidate(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, entry| entry.expires_at > now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub repo_id: RepoId,
    pub user_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualRepoInfo {
    pub origin_id: Option<RepoId>,
}

/// The three caches of spec.md §4.8, plus a `skip_cache` bypass path for
/// callers that must repopulate straight from the database.
pub struct Caches {
    tokens: TtlMap<String, TokenInfo>,
    permissions: TtlMap<String, Permission>,
    virtual_repo_info: TtlMap<RepoId, VirtualRepoInfo>,
}

impl Default for Caches {
    fn default() -> Self {
        Caches {
            tokens: TtlMap::new(TOKEN_CACHE_TTL_SECS, false),
            permissions: TtlMap::new(PERM_CACHE_TTL_SECS, false),
            virtual_repo_info: TtlMap::new(VIRTUAL_REPO_CACHE_TTL_SECS, true),
        }
    }
}

fn permission_key(repo_id: &RepoId, user: &str) -> String {
    format!("{repo_id}:{user}")
}

impl Caches {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn token(&self, token: &str, skip_cache: bool) -> Option<TokenInfo> {
        if skip_cache {
            return None;
        }
        self.tokens.get(&token.to_string())
    }

    pub fn put_token(&self, token: &str, info: TokenInfo) {
        self.tokens.put(token.to_string(), info);
    }

    pub fn invalidate_token(&self, token: &str) {
        self.tokens.invalidate(&token.to_string());
    }

    pub fn permission(&self, repo_id: &RepoId, user: &str, skip_cache: bool) -> Option<Permission> {
        if skip_cache {
            return None;
        }
        self.permissions.get(&permission_key(repo_id, user))
    }

    pub fn put_permission(&self, repo_id: &RepoId, user: &str, perm: Permission) {
        self.permissions.put(permission_key(repo_id, user), perm);
    }

    pub fn invalidate_permission(&self, repo_id: &RepoId, user: &str) {
        self.permissions.invalidate(&permission_key(repo_id, user));
    }

    pub fn virtual_repo_info(&self, repo_id: &RepoId, skip_cache: bool) -> Option<VirtualRepoInfo> {
        if skip_cache {
            return None;
        }
        self.virtual_repo_info.get(repo_id)
    }

    pub fn put_virtual_repo_info(&self, repo_id: &RepoId, info: VirtualRepoInfo) {
        self.virtual_repo_info.put(repo_id.clone(), info);
    }

    pub fn invalidate_virtual_repo_info(&self, repo_id: &RepoId) {
        self.virtual_repo_info.invalidate(repo_id);
    }

    fn sweep(&self) {
        self.tokens.sweep();
        self.permissions.sweep();
        self.virtual_repo_info.sweep();
    }

    /// Spawn the single periodic sweeper task (spec.md §4.8). The returned
    /// handle can be aborted on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let caches = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                caches.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_cache_round_trips_and_does_not_refresh_on_read() {
        let map: TtlMap<String, i32> = TtlMap::new(3600, false);
        map.put("tok".to_string(), 1);
        assert_eq!(map.get(&"tok".to_string()), Some(1));
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let map: TtlMap<String, i32> = TtlMap::new(0, false);
        map.put("tok".to_string(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(map.get(&"tok".to_string()), None);
    }

    #[test]
    fn skip_cache_bypasses_lookup() {
        let caches = Caches::default();
        let repo = RepoId::new_v4();
        caches.put_permission(&repo, "alice", Permission::ReadWrite);
        assert_eq!(caches.permission(&repo, "alice", false), Some(Permission::ReadWrite));
        assert_eq!(caches.permission(&repo, "alice", true), None);
    }

    #[test]
    fn virtual_repo_info_refreshes_ttl_on_access() {
        let map: TtlMap<String, i32> = TtlMap::new(3600, true);
        map.put("k".to_string(), 7);
        let before = map.entries.lock().get("k").unwrap().expires_at;
        std::thread::sleep(Duration::from_millis(5));
        map.get(&"k".to_string());
        let after = map.entries.lock().get("k").unwrap().expires_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn sweeper_removes_expired_entries() {
        let caches = Arc::new(Caches {
            tokens: TtlMap::new(0, false),
            permissions: TtlMap::new(3600, false),
            virtual_repo_info: TtlMap::new(3600, true),
        });
        caches.put_token("tok", TokenInfo { repo_id: RepoId::new_v4(), user_email: "a@example.com".to_string() });
        tokio::time::sleep(Duration::from_millis(5)).await;
        caches.sweep();
        assert!(caches.tokens.entries.lock().is_empty());
    }
}
