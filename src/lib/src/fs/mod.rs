//! C3 — FS manager: encode/decode of `Syncwerk`/`SyncwDir`, tree walks,
//! path resolution, and file chunking (spec.md §4.3).

pub mod chunk;
pub mod codec;

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use sha1::{Digest, Sha1};

use crate::constants::{FORMAT_VERSION_CURRENT, FORMAT_VERSION_LEGACY};
use crate::error::SyncError;
use crate::model::{DirEnt, ObjectId, StoreId, SyncwDir, Syncwerk};
use crate::store::ObjectStoreBackend;

/// What to do with a directory during `traverse_tree`: keep descending, or
/// stop at this subtree without aborting the whole walk.
pub enum Descend {
    Continue,
    Stop,
}

pub struct FileCountInfo {
    pub num_dirs: u64,
    pub num_files: u64,
    pub total_size: u64,
}

pub struct FsManager {
    backend: Arc<dyn ObjectStoreBackend>,
}

impl FsManager {
    pub fn new(backend: Arc<dyn ObjectStoreBackend>) -> Self {
        FsManager { backend }
    }

    fn read_raw(&self, store_id: &StoreId, version: i32, id: &ObjectId) -> Result<Vec<u8>, SyncError> {
        self.backend.get(store_id, version, id.as_str())
    }

    /// Whether an fs object is present, without decoding it.
    pub fn exists(&self, store_id: &StoreId, version: i32, id: &ObjectId) -> bool {
        if id.is_empty() {
            return true;
        }
        self.backend.exists(store_id, version, id.as_str()).unwrap_or(false)
    }

    /// The raw stored bytes of an fs object (still compressed for v1),
    /// for bulk transfer endpoints that don't need to interpret content.
    pub fn get_raw(&self, store_id: &StoreId, version: i32, id: &ObjectId) -> Result<Vec<u8>, SyncError> {
        self.read_raw(store_id, version, id)
    }

    /// Write already-encoded fs object bytes directly, trusting `id` as
    /// given by the client but verifying structure and hash before the
    /// write is considered durable (spec.md §8 property 1).
    pub fn put_raw_verified(&self, store_id: &StoreId, version: i32, id: &ObjectId, raw: &[u8]) -> Result<(), SyncError> {
        self.backend.put(store_id, version, id.as_str(), raw, true)?;
        if let Err(err) = self.verify_object(store_id, version, id, true) {
            let _ = self.backend.delete(store_id, version, id.as_str());
            return Err(err);
        }
        Ok(())
    }

    pub fn put_syncwerk(&self, store_id: &StoreId, file: &Syncwerk) -> Result<ObjectId, SyncError> {
        if file.version >= FORMAT_VERSION_CURRENT {
            let encoded = codec::encode_syncwerk_v1(file)?;
            self.backend
                .put(store_id, file.version, encoded.id.as_str(), &encoded.stored_bytes, true)?;
            Ok(encoded.id)
        } else {
            let encoded = codec::encode_syncwerk_v0(file)?;
            self.backend
                .put(store_id, FORMAT_VERSION_LEGACY, encoded.id.as_str(), &encoded.stored_bytes, true)?;
            Ok(encoded.id)
        }
    }

    pub fn put_syncwdir(&self, store_id: &StoreId, dir: &SyncwDir) -> Result<ObjectId, SyncError> {
        if dir.version >= FORMAT_VERSION_CURRENT {
            let encoded = codec::encode_syncwdir_v1(dir)?;
            self.backend
                .put(store_id, dir.version, encoded.id.as_str(), &encoded.stored_bytes, true)?;
            Ok(encoded.id)
        } else {
            let encoded = codec::encode_syncwdir_v0(dir)?;
            self.backend
                .put(store_id, FORMAT_VERSION_LEGACY, encoded.id.as_str(), &encoded.stored_bytes, true)?;
            Ok(encoded.id)
        }
    }

    /// The empty id synthesizes a zero-block manifest in memory; it is
    /// never actually persisted or read from the store.
    pub fn get_syncwerk(&self, store_id: &StoreId, version: i32, id: &ObjectId) -> Result<Syncwerk, SyncError> {
        if id.is_empty() {
            return Ok(Syncwerk::empty(version));
        }
        let raw = self.read_raw(store_id, version, id)?;
        if version >= FORMAT_VERSION_CURRENT {
            codec::decode_syncwerk_v1(&raw, Some(id))
        } else {
            codec::decode_syncwerk_v0(&raw, Some(id))
        }
    }

    pub fn get_syncwdir(&self, store_id: &StoreId, version: i32, id: &ObjectId) -> Result<SyncwDir, SyncError> {
        if id.is_empty() {
            return Ok(SyncwDir::empty(version));
        }
        let raw = self.read_raw(store_id, version, id)?;
        if version >= FORMAT_VERSION_CURRENT {
            codec::decode_syncwdir_v1(&raw, Some(id))
        } else {
            codec::decode_syncwdir_v0(&raw, Some(id))
        }
    }

    /// Like `get_syncwdir`, but v0 output is re-sorted descending by name
    /// (the legacy display quirk); v1 is left as stored (spec.md §4.3).
    pub fn get_syncwdir_sorted(&self, store_id: &StoreId, version: i32, id: &ObjectId) -> Result<SyncwDir, SyncError> {
        let dir = self.get_syncwdir(store_id, version, id)?;
        if version >= FORMAT_VERSION_CURRENT {
            Ok(dir)
        } else {
            Ok(SyncwDir {
                version: dir.version,
                dirents: dir.sorted_descending(),
            })
        }
    }

    /// Resolve `path` under `root_id`, descending dir-by-dir. Returns the
    /// terminal dirent's id and mode. An empty path (or `"/"`) resolves to
    /// the root itself.
    pub fn path_to_obj_id(
        &self,
        store_id: &StoreId,
        version: i32,
        root_id: &ObjectId,
        path: &str,
    ) -> Result<(ObjectId, u32), SyncError> {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Ok((root_id.clone(), crate::model::MODE_DIR));
        }

        let mut current_id = root_id.clone();
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

        for (i, component) in components.iter().enumerate() {
            let dir = self.get_syncwdir(store_id, version, &current_id).map_err(|err| match err {
                SyncError::NotFound(_) => SyncError::corrupted(format!("DIR_MISSING: {current_id}")),
                other => other,
            })?;
            let entry = dir
                .find(component)
                .ok_or_else(|| SyncError::not_found(format!("PATH_NO_EXIST: {path}")))?;
            current_id = entry.id.clone();
            if i + 1 < components.len() && !entry.is_dir() {
                return Err(SyncError::not_found(format!("PATH_NO_EXIST: {path}")));
            }
            if i + 1 == components.len() {
                return Ok((entry.id.clone(), entry.mode));
            }
        }
        Ok((current_id, crate::model::MODE_DIR))
    }

    /// Pre-order traversal of the tree rooted at `root_id`. `cb` receives
    /// the path-so-far and the dirent; returning `Descend::Stop` prunes
    /// that subtree without aborting the rest of the walk.
    pub fn traverse_tree(
        &self,
        store_id: &StoreId,
        version: i32,
        root_id: &ObjectId,
        mut cb: impl FnMut(&str, &DirEnt) -> Result<Descend, SyncError>,
        skip_errors: bool,
    ) -> Result<(), SyncError> {
        self.traverse_inner(store_id, version, root_id, "", &mut cb, skip_errors)
    }

    fn traverse_inner(
        &self,
        store_id: &StoreId,
        version: i32,
        dir_id: &ObjectId,
        prefix: &str,
        cb: &mut dyn FnMut(&str, &DirEnt) -> Result<Descend, SyncError>,
        skip_errors: bool,
    ) -> Result<(), SyncError> {
        let dir = match self.get_syncwdir(store_id, version, dir_id) {
            Ok(dir) => dir,
            Err(err) if skip_errors => {
                log::warn!("traverse_tree: skipping unreadable dir {dir_id}: {err}");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        for entry in &dir.dirents {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            let decision = match cb(&path, entry) {
                Ok(d) => d,
                Err(err) if skip_errors => {
                    log::warn!("traverse_tree: callback failed for {path}: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if entry.is_dir() {
                if let Descend::Continue = decision {
                    self.traverse_inner(store_id, version, &entry.id, &path, cb, skip_errors)?;
                }
            }
        }
        Ok(())
    }

    /// All dir/file object ids reachable from `root_id`, including the
    /// root itself. Used by `fs-id-list` to diff a client's and server's
    /// object sets (spec.md §6.2). `dir_only` skips file ids.
    pub fn reachable_ids(
        &self,
        store_id: &StoreId,
        version: i32,
        root_id: &ObjectId,
        dir_only: bool,
    ) -> Result<HashSet<ObjectId>, SyncError> {
        let mut ids = HashSet::new();
        if !root_id.is_empty() {
            ids.insert(root_id.clone());
        }
        self.traverse_tree(
            store_id,
            version,
            root_id,
            |_path, entry| {
                if dir_only && !entry.is_dir() {
                    return Ok(Descend::Continue);
                }
                ids.insert(entry.id.clone());
                Ok(Descend::Continue)
            },
            false,
        )?;
        Ok(ids)
    }

    /// All distinct block ids reachable from `root_id`. Dirents alone don't
    /// carry block lists, so files are read directly rather than driven
    /// through `traverse_tree`.
    pub fn populate_blocklist(&self, store_id: &StoreId, version: i32, root_id: &ObjectId) -> Result<HashSet<ObjectId>, SyncError> {
        let mut blocks = HashSet::new();
        self.collect_blocklist(store_id, version, root_id, &mut blocks)?;
        Ok(blocks)
    }

    fn collect_blocklist(
        &self,
        store_id: &StoreId,
        version: i32,
        dir_id: &ObjectId,
        out: &mut HashSet<ObjectId>,
    ) -> Result<(), SyncError> {
        let dir = self.get_syncwdir(store_id, version, dir_id)?;
        for entry in &dir.dirents {
            if entry.is_dir() {
                self.collect_blocklist(store_id, version, &entry.id, out)?;
            } else {
                let file = self.get_syncwerk(store_id, version, &entry.id)?;
                out.extend(file.block_ids.into_iter());
            }
        }
        Ok(())
    }

    /// Validate structure (and, if `also_check_id`, recompute the hash) of
    /// a stored fs object without caring whether it's a file or dir.
    pub fn verify_object(&self, store_id: &StoreId, version: i32, id: &ObjectId, also_check_id: bool) -> Result<(), SyncError> {
        let raw = self.read_raw(store_id, version, id)?;
        let check = if also_check_id { Some(id) } else { None };
        // Try file first, then dir; a malformed object fails both.
        if version >= FORMAT_VERSION_CURRENT {
            if codec::decode_syncwerk_v1(&raw, check).is_ok() {
                return Ok(());
            }
            codec::decode_syncwdir_v1(&raw, check).map(|_| ())
        } else {
            if codec::decode_syncwerk_v0(&raw, check).is_ok() {
                return Ok(());
            }
            codec::decode_syncwdir_v0(&raw, check).map(|_| ())
        }
    }

    pub fn get_file_count_info(&self, store_id: &StoreId, version: i32, root_id: &ObjectId) -> Result<FileCountInfo, SyncError> {
        let mut info = FileCountInfo {
            num_dirs: 0,
            num_files: 0,
            total_size: 0,
        };
        self.count_inner(store_id, version, root_id, &mut info)?;
        Ok(info)
    }

    fn count_inner(&self, store_id: &StoreId, version: i32, dir_id: &ObjectId, info: &mut FileCountInfo) -> Result<(), SyncError> {
        let dir = self.get_syncwdir(store_id, version, dir_id)?;
        for entry in &dir.dirents {
            if entry.is_dir() {
                info.num_dirs += 1;
                self.count_inner(store_id, version, &entry.id, info)?;
            } else {
                info.num_files += 1;
                info.total_size += entry.size.unwrap_or(0);
            }
        }
        Ok(())
    }

    /// Chunk a local file into blocks and return `(file_id, size)`. Empty
    /// files short-circuit to the reserved empty id without touching disk
    /// beyond a metadata stat.
    ///
    /// `encrypt` is applied to each chunk before hashing when the repo is
    /// encrypted, so block ids are ids of ciphertext (spec.md §4.3).
    pub fn index_blocks(
        &self,
        path: &Path,
        fixed_block_size: u64,
        use_cdc: bool,
        mut write_block: impl FnMut(&[u8]) -> Result<ObjectId, SyncError> + Send,
        encrypt: Option<&(dyn Fn(&[u8]) -> Vec<u8> + Sync)>,
    ) -> Result<(ObjectId, u64), SyncError> {
        let meta = std::fs::metadata(path)?;
        let size = meta.len();
        if size == 0 {
            return Ok((ObjectId::empty(), 0));
        }

        let mut file = File::open(path)?;
        let mut data = Vec::with_capacity(size as usize);
        file.read_to_end(&mut data)?;

        let spans = if use_cdc {
            chunk::content_defined_chunks(&data)
        } else {
            chunk::fixed_size_chunks(size, fixed_block_size)
        };

        let block_ids: Vec<ObjectId> = if use_cdc {
            // CDC cut points depend on prior bytes, so blocks are hashed
            // sequentially by the caller-provided sink.
            spans
                .iter()
                .map(|span| {
                    let raw = &data[span.offset as usize..(span.offset + span.len) as usize];
                    let ciphertext;
                    let bytes = if let Some(enc) = encrypt {
                        ciphertext = enc(raw);
                        ciphertext.as_slice()
                    } else {
                        raw
                    };
                    write_block(bytes)
                })
                .collect::<Result<_, _>>()?
        } else {
            // Fixed-size spans are independent, so hashing runs in parallel
            // over a rayon worker pool.
            let hashed: Vec<(usize, ObjectId, Vec<u8>)> = spans
                .par_iter()
                .enumerate()
                .map(|(i, span)| {
                    let raw = &data[span.offset as usize..(span.offset + span.len) as usize];
                    let bytes = if let Some(enc) = encrypt { enc(raw) } else { raw.to_vec() };
                    let mut hasher = Sha1::new();
                    hasher.update(&bytes);
                    let id = ObjectId::parse(
                        hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>(),
                    )
                    .expect("sha1 digest is always 40 hex chars");
                    (i, id, bytes)
                })
                .collect();
            let mut ordered = hashed;
            ordered.sort_by_key(|(i, _, _)| *i);
            ordered
                .into_iter()
                .map(|(_, id, bytes)| {
                    write_block(&bytes)?;
                    Ok(id)
                })
                .collect::<Result<_, SyncError>>()?
        };

        let file_manifest = Syncwerk {
            version: if use_cdc { 0 } else { FORMAT_VERSION_CURRENT },
            file_size: size,
            block_ids,
        };
        let encoded = if use_cdc {
            codec::encode_syncwerk_v0(&file_manifest)?
        } else {
            codec::encode_syncwerk_v1(&file_manifest)?
        };
        Ok((encoded.id, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepoId;
    use crate::store::FsObjectStoreBackend;
    use std::sync::Arc;

    fn manager() -> (FsManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FsObjectStoreBackend::new(dir.path().join("fs"), dir.path().join("tmp")).unwrap());
        (FsManager::new(backend), dir)
    }

    fn store() -> StoreId {
        StoreId::from_repo(&RepoId::new_v4())
    }

    #[test]
    fn empty_id_synthesizes_zero_block_manifest() {
        let (mgr, _g) = manager();
        let store = store();
        let file = mgr.get_syncwerk(&store, 1, &ObjectId::empty()).unwrap();
        assert_eq!(file.file_size, 0);
        assert!(file.block_ids.is_empty());
    }

    #[test]
    fn path_to_obj_id_resolves_nested_file() {
        let (mgr, _g) = manager();
        let store = store();

        let file = Syncwerk {
            version: 1,
            file_size: 5,
            block_ids: vec![],
        };
        let file_id = mgr.put_syncwerk(&store, &file).unwrap();

        let sub_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", file_id.clone(), 0, "me", 5)],
        };
        let sub_id = mgr.put_syncwdir(&store, &sub_dir).unwrap();

        let root_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_dir("sub", sub_id, 0)],
        };
        let root_id = mgr.put_syncwdir(&store, &root_dir).unwrap();

        let (resolved_id, mode) = mgr.path_to_obj_id(&store, 1, &root_id, "sub/a.txt").unwrap();
        assert_eq!(resolved_id, file_id);
        assert_eq!(mode, crate::model::MODE_FILE);
    }

    #[test]
    fn path_to_obj_id_missing_path_is_distinct_from_corruption() {
        let (mgr, _g) = manager();
        let store = store();
        let root = mgr.put_syncwdir(&store, &SyncwDir::empty(1)).unwrap();
        let err = mgr.path_to_obj_id(&store, 1, &root, "nope.txt").unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn fixed_size_indexing_round_trips_on_disk_file() {
        let (mgr, g) = manager();
        let path = g.path().join("payload.bin");
        std::fs::write(&path, vec![7u8; 2 * 1024 * 1024]).unwrap();

        let store = store();
        let written = std::sync::Mutex::new(Vec::new());
        let (file_id, size) = mgr
            .index_blocks(
                &path,
                1024 * 1024,
                false,
                |bytes| {
                    let mut hasher = Sha1::new();
                    hasher.update(bytes);
                    let id = ObjectId::parse(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>()).unwrap();
                    written.lock().unwrap().push((id.clone(), bytes.to_vec()));
                    Ok(id)
                },
                None,
            )
            .unwrap();

        assert_eq!(size, 2 * 1024 * 1024);
        assert_eq!(written.lock().unwrap().len(), 2);
        assert!(!file_id.is_empty());
    }

    #[test]
    fn empty_file_short_circuits_to_empty_id() {
        let (mgr, g) = manager();
        let path = g.path().join("empty.bin");
        std::fs::write(&path, []).unwrap();
        let (id, size) = mgr.index_blocks(&path, 1024, false, |_| unreachable!(), None).unwrap();
        assert!(id.is_empty());
        assert_eq!(size, 0);
    }
}
