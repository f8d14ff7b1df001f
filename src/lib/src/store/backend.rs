//! C1 — object store backend.
//!
//! Put/get/stat/delete/exists/iterate of opaque `(store_id, version, id)`
//! to bytes. The backend only ever sees an integer `version`; it never
//! interprets the bytes it stores (spec.md §4.1).

use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::model::StoreId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
}

/// A store backend for one object "kind" (blocks, fs, commits). Safe to
/// call from many threads concurrently (spec.md §4.1 concurrency).
pub trait ObjectStoreBackend: Send + Sync {
    /// Write `data` under `(store_id, version, id)`. When `sync` is true the
    /// write must be durable (fsynced) before returning.
    fn put(&self, store_id: &StoreId, version: i32, id: &str, data: &[u8], sync: bool) -> Result<(), SyncError>;

    /// Read the full contents of an object. Returns `NotFound` if absent;
    /// never returns a short read.
    fn get(&self, store_id: &StoreId, version: i32, id: &str) -> Result<Vec<u8>, SyncError>;

    fn exists(&self, store_id: &StoreId, version: i32, id: &str) -> Result<bool, SyncError>;

    fn stat(&self, store_id: &StoreId, version: i32, id: &str) -> Result<ObjectStat, SyncError>;

    fn delete(&self, store_id: &StoreId, version: i32, id: &str) -> Result<(), SyncError>;

    /// Invoke `cb` for every object id present for `store_id`. Stops early
    /// if `cb` returns `Ok(false)`.
    fn iterate(
        &self,
        store_id: &StoreId,
        version: i32,
        cb: &mut dyn FnMut(&str) -> Result<bool, SyncError>,
    ) -> Result<(), SyncError>;

    /// Remove every object belonging to `store_id` (repo deletion).
    fn remove_store(&self, store_id: &StoreId, version: i32) -> Result<(), SyncError>;

    /// Copy one object into another store's namespace (used to materialize
    /// a virtual repo's objects into its own namespace, or during GC).
    fn copy(
        &self,
        src_store: &StoreId,
        src_version: i32,
        dst_store: &StoreId,
        dst_version: i32,
        id: &str,
    ) -> Result<(), SyncError> {
        if self.exists(dst_store, dst_version, id)? {
            return Ok(());
        }
        let data = self.get(src_store, src_version, id)?;
        self.put(dst_store, dst_version, id, &data, true)
    }
}

/// Fan-out an id into a `xx/yyyy...` two-level directory, matching the
/// teacher's nested object layout, to keep any one directory from growing
/// unbounded.
pub fn fanout_path(root: &Path, store_id: &StoreId, version: i32, id: &str) -> PathBuf {
    let (head, tail) = if id.len() >= 2 {
        id.split_at(2)
    } else {
        ("00", id)
    };
    root.join(store_id.to_string())
        .join(version.to_string())
        .join(head)
        .join(tail)
}
