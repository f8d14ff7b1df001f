//! C2 — block manager. A block is accessed through a handle opened in
//! READ or WRITE mode (spec.md §4.2).

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::error::SyncError;
use crate::model::StoreId;

use super::backend::{fanout_path, ObjectStoreBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Read,
    Write,
}

/// An open handle to a block. Write handles stage their content under a
/// temp name; `commit_block` promotes it atomically. Dropping a write
/// handle without committing discards the staged content.
pub struct BlockHandle {
    mode: BlockMode,
    store_id: StoreId,
    version: i32,
    block_id: String,
    final_path: PathBuf,
    tmp_path: PathBuf,
    file: File,
    committed: bool,
}

impl BlockHandle {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, SyncError> {
        if self.mode != BlockMode::Read {
            return Err(SyncError::bad_input("handle not open for read"));
        }
        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..])? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<(), SyncError> {
        if self.mode != BlockMode::Write {
            return Err(SyncError::bad_input("handle not open for write"));
        }
        self.file.write_all(buf)?;
        Ok(())
    }
}

impl Drop for BlockHandle {
    fn drop(&mut self) {
        if self.mode == BlockMode::Write && !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn validate_ids(store_id: &str, block_id: &str) -> Result<(), SyncError> {
    Uuid::parse_str(store_id).map_err(|_| SyncError::bad_input("BAD_ARGS: invalid store id"))?;
    if block_id.len() != 40 || !block_id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
        return Err(SyncError::bad_input("BAD_ARGS: invalid block id"));
    }
    Ok(())
}

pub struct BlockManager {
    backend: Arc<dyn ObjectStoreBackend>,
    root: PathBuf,
    tmp_dir: PathBuf,
}

impl BlockManager {
    pub fn new(backend: Arc<dyn ObjectStoreBackend>, root: PathBuf, tmp_dir: PathBuf) -> Self {
        BlockManager { backend, root, tmp_dir }
    }

    pub fn open_block(
        &self,
        store_id: &StoreId,
        version: i32,
        block_id: &str,
        mode: BlockMode,
    ) -> Result<BlockHandle, SyncError> {
        validate_ids(&store_id.to_string(), block_id)?;

        let final_path = fanout_path(&self.root, store_id, version, block_id);
        match mode {
            BlockMode::Read => {
                let file = File::open(&final_path).map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        SyncError::not_found(format!("block {block_id} not found"))
                    } else {
                        err.into()
                    }
                })?;
                Ok(BlockHandle {
                    mode,
                    store_id: store_id.clone(),
                    version,
                    block_id: block_id.to_string(),
                    final_path,
                    tmp_path: PathBuf::new(),
                    file,
                    committed: true,
                })
            }
            BlockMode::Write => {
                fs::create_dir_all(&self.tmp_dir)?;
                let tmp_path = self.tmp_dir.join(format!("{block_id}-{}", Uuid::new_v4()));
                let file = File::create(&tmp_path)?;
                Ok(BlockHandle {
                    mode,
                    store_id: store_id.clone(),
                    version,
                    block_id: block_id.to_string(),
                    final_path,
                    tmp_path,
                    file,
                    committed: false,
                })
            }
        }
    }

    /// Promote a staged write handle to a permanent block. Idempotent: two
    /// concurrent commits of the same id/content both succeed (spec.md §8
    /// property 7).
    pub fn commit_block(&self, mut handle: BlockHandle) -> Result<(), SyncError> {
        if handle.mode != BlockMode::Write {
            return Err(SyncError::bad_input("only write handles can be committed"));
        }
        handle.file.sync_all()?;
        if let Some(parent) = handle.final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&handle.tmp_path, &handle.final_path)?;
        handle.committed = true;
        Ok(())
    }

    pub fn block_exists(&self, store_id: &StoreId, version: i32, block_id: &str) -> bool {
        if validate_ids(&store_id.to_string(), block_id).is_err() {
            return false;
        }
        self.backend.exists(store_id, version, block_id).unwrap_or(false)
    }

    pub fn remove_block(&self, store_id: &StoreId, version: i32, block_id: &str) -> Result<(), SyncError> {
        validate_ids(&store_id.to_string(), block_id)?;
        self.backend.delete(store_id, version, block_id)
    }

    pub fn stat_block(&self, store_id: &StoreId, version: i32, block_id: &str) -> Result<u64, SyncError> {
        validate_ids(&store_id.to_string(), block_id)?;
        Ok(self.backend.stat(store_id, version, block_id)?.size)
    }

    /// Re-read a block and check that `SHA1(content) == id`.
    pub fn verify_block(&self, store_id: &StoreId, version: i32, block_id: &str) -> Result<bool, SyncError> {
        validate_ids(&store_id.to_string(), block_id)?;
        let data = self.backend.get(store_id, version, block_id)?;
        let mut hasher = Sha1::new();
        hasher.update(&data);
        let digest = hex::encode(hasher.finalize());
        Ok(digest == block_id)
    }
}

/// Minimal hex encoding helper so we don't need a whole extra dependency
/// beyond what `sha1` already pulls in transitively.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
