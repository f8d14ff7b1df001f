//! Object ids, repo ids and store ids.
//!
//! All object ids are 40 lowercase hex characters (a SHA-1 digest). Repo and
//! store ids are UUIDs. Validation happens once at the boundary so the rest
//! of the codebase can treat these as already-checked.

use crate::constants::{EMPTY_SHA1, OBJECT_ID_LEN};
use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A validated 40-hex-character object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    pub fn parse(s: impl Into<String>) -> Result<Self, SyncError> {
        let s = s.into();
        if s.len() != OBJECT_ID_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(SyncError::bad_input(format!("invalid object id: {s}")));
        }
        Ok(ObjectId(s))
    }

    pub fn empty() -> Self {
        ObjectId(EMPTY_SHA1.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == EMPTY_SHA1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectId {
    type Error = SyncError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        ObjectId::parse(value)
    }
}

impl From<ObjectId> for String {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A repository identifier (UUID, hyphenated lowercase string form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId(Uuid);

impl RepoId {
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        Uuid::parse_str(s).map(RepoId).map_err(SyncError::from)
    }

    pub fn new_v4() -> Self {
        RepoId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The physical storage namespace of a repo. Equal to the repo's own id
/// unless the repo is a virtual repo, in which case it equals the origin
/// repo's id (spec.md §3 "Repo").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(Uuid);

impl StoreId {
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        Uuid::parse_str(s).map(StoreId).map_err(SyncError::from)
    }

    pub fn from_repo(repo_id: &RepoId) -> Self {
        StoreId(repo_id.as_uuid())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_or_uppercase_ids() {
        assert!(ObjectId::parse("abc").is_err());
        assert!(ObjectId::parse("A".repeat(40)).is_err());
        assert!(ObjectId::parse("0".repeat(40)).is_ok());
    }

    #[test]
    fn empty_id_round_trips() {
        let id = ObjectId::empty();
        assert!(id.is_empty());
        assert_eq!(id.as_str(), "0".repeat(40));
    }

    #[test]
    fn store_id_defaults_to_repo_id() {
        let repo = RepoId::new_v4();
        let store = StoreId::from_repo(&repo);
        assert_eq!(store.as_uuid(), repo.as_uuid());
    }
}
