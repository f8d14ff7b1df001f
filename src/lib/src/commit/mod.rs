//! C4 — commit manager: encode/decode commit objects, existence checks,
//! and time-descending DAG traversal (spec.md §4.4).

use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use sha1::{Digest, Sha1};

use crate::error::SyncError;
use crate::model::{Commit, ObjectId, StoreId};
use crate::store::ObjectStoreBackend;

fn canonical_json(commit: &Commit) -> Result<Vec<u8>, SyncError> {
    let v = serde_json::to_value(commit)?;
    Ok(serde_json::to_vec(&v)?)
}

/// Commit ids are not a hash of the stored JSON blob (unlike fs objects):
/// they're SHA-1 over a fixed field concatenation, so the id stays stable
/// across JSON library/field-ordering changes. Commit objects are also
/// stored uncompressed, unlike fs objects.
fn compute_commit_id(commit: &Commit) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(commit.root_id.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(commit.creator_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(commit.creator_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(commit.description.as_bytes());
    hasher.update([0u8]);
    hasher.update(commit.ctime.to_be_bytes());
    let digest: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
    ObjectId::parse(digest).expect("sha1 digest is always 40 hex chars")
}

/// Reject decoded commits that fail the structural sanity checks of
/// spec.md §4.4 (not a trust check, just malformed-data rejection).
fn sanity_check(commit: &Commit) -> Result<(), SyncError> {
    if commit.creator_id.len() != 40 || !commit.creator_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SyncError::corrupted("commit creator_id is not 40 hex chars"));
    }
    if let Some(enc_version) = commit.enc_version {
        if !(0..=2).contains(&enc_version) {
            return Err(SyncError::corrupted(format!("invalid enc_version {enc_version}")));
        }
        let expected_magic_len = match enc_version {
            1 => Some(crate::constants::ENC_MAGIC_LEN_V1),
            2 => Some(crate::constants::ENC_MAGIC_LEN_V2),
            _ => None,
        };
        if let Some(expected) = expected_magic_len {
            match &commit.magic {
                Some(magic) if magic.len() == expected => {}
                _ => return Err(SyncError::corrupted("commit magic length mismatch for enc_version")),
            }
        }
        if enc_version == 2 {
            match &commit.random_key {
                Some(key) if key.len() == crate::constants::ENC_RANDOM_KEY_LEN_V2 => {}
                _ => return Err(SyncError::corrupted("commit random_key length mismatch for enc_version 2")),
            }
        }
    }
    Ok(())
}

/// Compute a commit's id and the bytes that would be stored for it,
/// without persisting anything. Unlike fs objects, commit JSON is stored
/// uncompressed.
pub fn encode_commit(commit: &Commit) -> Result<(ObjectId, Vec<u8>), SyncError> {
    let id = compute_commit_id(commit);
    let mut with_id = commit.clone();
    with_id.commit_id = id.clone();
    let json = canonical_json(&with_id)?;
    Ok((id, json))
}

pub fn decode_commit(stored_bytes: &[u8], also_check_id: Option<&ObjectId>) -> Result<Commit, SyncError> {
    let commit: Commit = serde_json::from_slice(stored_bytes)?;
    sanity_check(&commit)?;
    let recomputed = compute_commit_id(&commit);
    if recomputed != commit.commit_id {
        return Err(SyncError::corrupted(format!(
            "commit id mismatch: stored {} recomputes to {recomputed}",
            commit.commit_id
        )));
    }
    if let Some(expected) = also_check_id {
        if expected != &commit.commit_id {
            return Err(SyncError::corrupted(format!(
                "commit id mismatch: expected {expected} got {}",
                commit.commit_id
            )));
        }
    }
    Ok(commit)
}

/// A frontier entry ordered by ctime descending (latest first out of the
/// `BinaryHeap`, which is a max-heap).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Frontier {
    ctime: i64,
    id: ObjectId,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ctime.cmp(&other.ctime).then_with(|| self.id.cmp(&other.id))
    }
}
impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub struct TraverseOutcome {
    pub visited: u64,
    /// The remaining single frontier element, if the walk stopped early
    /// because `limit` was reached (spec.md §4.4 "resume point").
    pub resume_point: Option<ObjectId>,
}

pub struct CommitManager {
    backend: Arc<dyn ObjectStoreBackend>,
}

impl CommitManager {
    pub fn new(backend: Arc<dyn ObjectStoreBackend>) -> Self {
        CommitManager { backend }
    }

    fn validate_repo_commit(&self, commit: &Commit) -> Result<(), SyncError> {
        if commit.root_id.as_str().len() != 40 {
            return Err(SyncError::bad_input("commit root_id is malformed"));
        }
        for parent in [&commit.parent_id, &commit.second_parent_id].into_iter().flatten() {
            if parent.as_str().len() != 40 {
                return Err(SyncError::bad_input("commit parent id is malformed"));
            }
        }
        Ok(())
    }

    /// `store_id`'s namespace is selected by `commit.version` (the repo's
    /// data-format version), matching where the repo's fs objects live.
    pub fn add_commit(&self, store_id: &StoreId, commit: &Commit) -> Result<ObjectId, SyncError> {
        self.validate_repo_commit(commit)?;
        let (id, bytes) = encode_commit(commit)?;
        self.backend.put(store_id, commit.version, id.as_str(), &bytes, true)?;
        Ok(id)
    }

    pub fn get_commit(&self, store_id: &StoreId, version: i32, id: &ObjectId) -> Result<Commit, SyncError> {
        let raw = self.backend.get(store_id, version, id.as_str())?;
        decode_commit(&raw, Some(id))
    }

    pub fn commit_exists(&self, store_id: &StoreId, version: i32, id: &ObjectId) -> Result<bool, SyncError> {
        self.backend.exists(store_id, version, id.as_str())
    }

    /// Best-first walk of the commit DAG from `head`, stopping after
    /// `limit` commits have been visited if `limit` is `Some` and the
    /// frontier has shrunk to one element (spec.md §4.4).
    pub fn traverse_commit_tree(
        &self,
        store_id: &StoreId,
        version: i32,
        head: &ObjectId,
        mut cb: impl FnMut(&Commit) -> Result<(), SyncError>,
        limit: Option<u64>,
        skip_errors: bool,
    ) -> Result<TraverseOutcome, SyncError> {
        self.traverse(store_id, version, head, &mut cb, limit, skip_errors, false)
    }

    /// Like `traverse_commit_tree`, but a missing parent is treated as a
    /// natural terminal (shallow history) rather than an error.
    pub fn traverse_commit_tree_truncated(
        &self,
        store_id: &StoreId,
        version: i32,
        head: &ObjectId,
        mut cb: impl FnMut(&Commit) -> Result<(), SyncError>,
        limit: Option<u64>,
    ) -> Result<TraverseOutcome, SyncError> {
        self.traverse(store_id, version, head, &mut cb, limit, false, true)
    }

    fn traverse(
        &self,
        store_id: &StoreId,
        version: i32,
        head: &ObjectId,
        cb: &mut dyn FnMut(&Commit) -> Result<(), SyncError>,
        limit: Option<u64>,
        skip_errors: bool,
        truncate_missing_parents: bool,
    ) -> Result<TraverseOutcome, SyncError> {
        let mut frontier = BinaryHeap::new();
        let mut enqueued: HashSet<ObjectId> = HashSet::new();
        let mut visited: u64 = 0;

        let head_commit = self.get_commit(store_id, version, head)?;
        frontier.push(Frontier {
            ctime: head_commit.ctime,
            id: head.clone(),
        });
        enqueued.insert(head.clone());

        while let Some(Frontier { id, .. }) = frontier.pop() {
            let commit = match self.get_commit(store_id, version, &id) {
                Ok(c) => c,
                Err(err) if skip_errors => {
                    log::warn!("traverse_commit_tree: skipping unreadable commit {id}: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };

            if let Err(err) = cb(&commit) {
                if skip_errors {
                    log::warn!("traverse_commit_tree: callback failed for {id}: {err}");
                } else {
                    return Err(err);
                }
            }
            visited += 1;

            for parent in [&commit.parent_id, &commit.second_parent_id].into_iter().flatten() {
                if enqueued.contains(parent) {
                    continue;
                }
                match self.get_commit(store_id, version, parent) {
                    Ok(parent_commit) => {
                        enqueued.insert(parent.clone());
                        frontier.push(Frontier {
                            ctime: parent_commit.ctime,
                            id: parent.clone(),
                        });
                    }
                    Err(_) if truncate_missing_parents || skip_errors => {
                        log::debug!("traverse_commit_tree: parent {parent} unreachable, treating as terminal");
                    }
                    Err(err) => return Err(err),
                }
            }

            if let Some(limit) = limit {
                if visited >= limit && frontier.len() <= 1 {
                    let resume_point = frontier.pop().map(|f| f.id);
                    return Ok(TraverseOutcome { visited, resume_point });
                }
            }
        }

        Ok(TraverseOutcome { visited, resume_point: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepoId;
    use crate::store::FsObjectStoreBackend;

    fn manager() -> (CommitManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FsObjectStoreBackend::new(dir.path().join("commits"), dir.path().join("tmp")).unwrap());
        (CommitManager::new(backend), dir)
    }

    fn base_commit(repo_id: &RepoId, ctime: i64, parent: Option<ObjectId>) -> Commit {
        Commit {
            commit_id: ObjectId::empty(),
            root_id: ObjectId::parse("a".repeat(40)).unwrap(),
            repo_id: repo_id.clone(),
            creator_id: "b".repeat(40),
            creator_name: "alice".to_string(),
            description: "test commit".to_string(),
            ctime,
            parent_id: parent,
            second_parent_id: None,
            repo_name: "repo".to_string(),
            repo_desc: None,
            version: 1,
            encrypted: None,
            enc_version: None,
            magic: None,
            random_key: None,
            conflict: false,
            new_merge: false,
            repaired: false,
        }
    }

    #[test]
    fn add_and_get_commit_round_trips() {
        let (mgr, _g) = manager();
        let store = StoreId::from_repo(&RepoId::new_v4());
        let commit = base_commit(&RepoId::new_v4(), 1000, None);
        let id = mgr.add_commit(&store, &commit).unwrap();
        let fetched = mgr.get_commit(&store, 1, &id).unwrap();
        assert_eq!(fetched.ctime, 1000);
        assert!(mgr.commit_exists(&store, 1, &id).unwrap());
    }

    #[test]
    fn sanity_check_rejects_bad_creator_id() {
        let mut commit = base_commit(&RepoId::new_v4(), 1, None);
        commit.creator_id = "not-hex".to_string();
        let (id, bytes) = encode_commit(&commit).unwrap();
        let err = decode_commit(&bytes, Some(&id)).unwrap_err();
        assert!(matches!(err, SyncError::Corrupted(_)));
    }

    #[test]
    fn sanity_check_enforces_enc_magic_length() {
        let mut commit = base_commit(&RepoId::new_v4(), 1, None);
        commit.enc_version = Some(1);
        commit.magic = Some("short".to_string());
        let (id, bytes) = encode_commit(&commit).unwrap();
        let err = decode_commit(&bytes, Some(&id)).unwrap_err();
        assert!(matches!(err, SyncError::Corrupted(_)));
    }

    #[test]
    fn traverse_visits_linear_history_newest_first() {
        let (mgr, _g) = manager();
        let store = StoreId::from_repo(&RepoId::new_v4());
        let repo = RepoId::new_v4();

        let c1 = base_commit(&repo, 100, None);
        let id1 = mgr.add_commit(&store, &c1).unwrap();
        let c2 = base_commit(&repo, 200, Some(id1.clone()));
        let id2 = mgr.add_commit(&store, &c2).unwrap();
        let c3 = base_commit(&repo, 300, Some(id2.clone()));
        let id3 = mgr.add_commit(&store, &c3).unwrap();

        let mut order = Vec::new();
        let outcome = mgr
            .traverse_commit_tree(&store, 1, &id3, |c| { order.push(c.ctime); Ok(()) }, None, false)
            .unwrap();

        assert_eq!(order, vec![300, 200, 100]);
        assert_eq!(outcome.visited, 3);
        assert!(outcome.resume_point.is_none());
    }

    #[test]
    fn traverse_with_limit_returns_resume_point() {
        let (mgr, _g) = manager();
        let store = StoreId::from_repo(&RepoId::new_v4());
        let repo = RepoId::new_v4();

        let c1 = base_commit(&repo, 100, None);
        let id1 = mgr.add_commit(&store, &c1).unwrap();
        let c2 = base_commit(&repo, 200, Some(id1.clone()));
        let id2 = mgr.add_commit(&store, &c2).unwrap();

        let mut order = Vec::new();
        let outcome = mgr
            .traverse_commit_tree(&store, 1, &id2, |c| { order.push(c.ctime); Ok(()) }, Some(1), false)
            .unwrap();

        assert_eq!(order, vec![200]);
        assert_eq!(outcome.resume_point, Some(id1));
    }

    #[test]
    fn truncated_traverse_tolerates_missing_parent() {
        let (mgr, _g) = manager();
        let store = StoreId::from_repo(&RepoId::new_v4());
        let repo = RepoId::new_v4();

        let missing_parent = ObjectId::parse("9".repeat(40)).unwrap();
        let commit = base_commit(&repo, 50, Some(missing_parent));
        let id = mgr.add_commit(&store, &commit).unwrap();

        let mut order = Vec::new();
        let outcome = mgr
            .traverse_commit_tree_truncated(&store, 1, &id, |c| { order.push(c.ctime); Ok(()) }, None)
            .unwrap();
        assert_eq!(order, vec![50]);
        assert_eq!(outcome.visited, 1);
    }
}
