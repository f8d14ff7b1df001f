//! Repo and branch records (spec.md §3 "Repo", "Branch").

use serde::{Deserialize, Serialize};

use super::id::{ObjectId, RepoId, StoreId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub repo_id: RepoId,
    pub name: String,
    /// `None` for an origin repo (store_id == repo_id); `Some(origin_id)`
    /// for a virtual repo sharing the origin's object namespace.
    pub origin_repo_id: Option<RepoId>,
    pub version: i32,
}

impl Repo {
    pub fn store_id(&self) -> StoreId {
        match &self.origin_repo_id {
            Some(origin) => StoreId::from_repo(origin),
            None => StoreId::from_repo(&self.repo_id),
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.origin_repo_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub repo_id: RepoId,
    pub name: String,
    pub commit_id: ObjectId,
}
