//! The commit object (spec.md §3 "Commit").

use serde::{Deserialize, Serialize};

use super::id::{ObjectId, RepoId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub commit_id: ObjectId,
    pub root_id: ObjectId,
    pub repo_id: RepoId,
    /// 40-hex creator id.
    pub creator_id: String,
    pub creator_name: String,
    pub description: String,
    pub ctime: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_parent_id: Option<ObjectId>,
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_desc: Option<String>,
    pub version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enc_version: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_key: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub conflict: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new_merge: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub repaired: bool,
}

impl Commit {
    /// A merge commit has a second parent.
    pub fn is_merge(&self) -> bool {
        self.second_parent_id.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.second_parent_id.is_none()
    }
}
