use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::constants::DEFAULT_WEB_TOKEN_EXPIRE_SECS;
use crate::error::SyncError;
use crate::model::{ObjectId, RepoId};

/// What a web token is good for: one specific object, in one specific repo,
/// for one specific operation.
#[derive(Debug, Clone)]
pub struct WebTokenClaim {
    pub repo_id: RepoId,
    pub obj_id: ObjectId,
    pub user_email: String,
    pub upload: bool,
}

struct Entry {
    claim: WebTokenClaim,
    expires_at: Instant,
    onetime: bool,
    used: bool,
}

/// Issues and redeems single-purpose web access tokens. Onetime tokens are
/// consumed on first successful lookup; non-onetime tokens just expire.
pub struct WebTokenManager {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl WebTokenManager {
    pub fn new(ttl_secs: u64) -> Self {
        WebTokenManager {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Mint a token good for `claim`. `onetime` tokens are invalidated the
    /// first time `redeem` succeeds for them.
    pub fn issue(&self, claim: WebTokenClaim, onetime: bool) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.entries.lock().insert(
            token.clone(),
            Entry {
                claim,
                expires_at: Instant::now() + self.ttl,
                onetime,
                used: false,
            },
        );
        token
    }

    /// Look up `token`, failing if it's missing, expired, or an already-used
    /// onetime token. On success for a onetime token, it is consumed so a
    /// second redemption fails even within the TTL window.
    pub fn redeem(&self, token: &str) -> Result<WebTokenClaim, SyncError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(token)
            .ok_or_else(|| SyncError::auth_denied("unknown web token"))?;

        if entry.expires_at <= Instant::now() {
            entries.remove(token);
            return Err(SyncError::auth_denied("web token expired"));
        }
        if entry.onetime && entry.used {
            return Err(SyncError::auth_denied("web token already used"));
        }

        entry.used = true;
        let claim = entry.claim.clone();
        if entry.onetime {
            entries.remove(token);
        }
        Ok(claim)
    }

    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, entry| entry.expires_at > now);
    }
}

impl Default for WebTokenManager {
    fn default() -> Self {
        WebTokenManager::new(DEFAULT_WEB_TOKEN_EXPIRE_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> WebTokenClaim {
        WebTokenClaim {
            repo_id: RepoId::new_v4(),
            obj_id: ObjectId::parse("a".repeat(40)).unwrap(),
            user_email: "alice@example.com".to_string(),
            upload: false,
        }
    }

    #[test]
    fn issued_token_redeems_once_for_onetime() {
        let mgr = WebTokenManager::new(3600);
        let token = mgr.issue(claim(), true);
        assert!(mgr.redeem(&token).is_ok());
        let err = mgr.redeem(&token).unwrap_err();
        assert!(matches!(err, SyncError::AuthDenied(_)));
    }

    #[test]
    fn non_onetime_token_redeems_repeatedly_within_ttl() {
        let mgr = WebTokenManager::new(3600);
        let token = mgr.issue(claim(), false);
        assert!(mgr.redeem(&token).is_ok());
        assert!(mgr.redeem(&token).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mgr = WebTokenManager::new(0);
        let token = mgr.issue(claim(), false);
        std::thread::sleep(Duration::from_millis(5));
        let err = mgr.redeem(&token).unwrap_err();
        assert!(matches!(err, SyncError::AuthDenied(_)));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let mgr = WebTokenManager::new(3600);
        assert!(mgr.redeem("nonexistent").is_err());
    }

    #[test]
    fn sweep_evicts_expired_entries() {
        let mgr = WebTokenManager::new(0);
        mgr.issue(claim(), false);
        std::thread::sleep(Duration::from_millis(5));
        mgr.sweep();
        assert_eq!(mgr.entries.lock().len(), 0);
    }
}
