//! The two content-addressed tree object shapes: file manifests
//! (`Syncwerk`) and directory manifests (`SyncwDir`). See spec.md §3.

use serde::{Deserialize, Serialize};

use super::id::ObjectId;

/// A file manifest: the ordered list of block ids whose concatenation
/// reconstructs the file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syncwerk {
    pub version: i32,
    pub file_size: u64,
    pub block_ids: Vec<ObjectId>,
}

impl Syncwerk {
    /// The manifest synthesized in memory for the reserved empty id: zero
    /// blocks, zero size. Never persisted.
    pub fn empty(version: i32) -> Self {
        Syncwerk {
            version,
            file_size: 0,
            block_ids: Vec::new(),
        }
    }
}

/// File mode bits for a dirent, matching the on-disk `mode` field.
pub const MODE_DIR: u32 = 0o040000;
pub const MODE_FILE: u32 = 0o100644;
pub const MODE_FILE_EXEC: u32 = 0o100755;

pub fn is_dir_mode(mode: u32) -> bool {
    mode & 0o170000 == MODE_DIR
}

/// One entry of a directory manifest. Regular-file entries carry
/// `modifier`/`size`; directory entries leave them `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEnt {
    pub mode: u32,
    pub id: ObjectId,
    pub name: String,
    pub mtime: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl DirEnt {
    pub fn new_dir(name: impl Into<String>, id: ObjectId, mtime: i64) -> Self {
        DirEnt {
            mode: MODE_DIR,
            id,
            name: name.into(),
            mtime,
            modifier: None,
            size: None,
        }
    }

    pub fn new_file(
        name: impl Into<String>,
        id: ObjectId,
        mtime: i64,
        modifier: impl Into<String>,
        size: u64,
    ) -> Self {
        DirEnt {
            mode: MODE_FILE,
            id,
            name: name.into(),
            mtime,
            modifier: Some(modifier.into()),
            size: Some(size),
        }
    }

    pub fn is_dir(&self) -> bool {
        is_dir_mode(self.mode)
    }
}

/// A directory manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncwDir {
    pub version: i32,
    pub dirents: Vec<DirEnt>,
}

impl SyncwDir {
    pub fn empty(version: i32) -> Self {
        SyncwDir {
            version,
            dirents: Vec::new(),
        }
    }

    pub fn find(&self, name: &str) -> Option<&DirEnt> {
        self.dirents.iter().find(|d| d.name == name)
    }

    /// v0 directories are displayed/iterated sorted descending by name;
    /// v1 preserves stored order (spec.md §3).
    pub fn sorted_descending(&self) -> Vec<DirEnt> {
        let mut v = self.dirents.clone();
        v.sort_by(|a, b| b.name.cmp(&a.name));
        v
    }
}
