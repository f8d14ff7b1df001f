//! Filesystem implementation of the object store backend (spec.md §4.1,
//! §6.1). One `FsObjectStoreBackend` is created per object kind (blocks,
//! fs, commits) rooted at `<data_dir>/storage/<kind>`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::model::StoreId;

use super::backend::{fanout_path, ObjectStat, ObjectStoreBackend};

pub struct FsObjectStoreBackend {
    root: PathBuf,
    tmp_dir: PathBuf,
}

impl FsObjectStoreBackend {
    pub fn new(root: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let root = root.into();
        let tmp_dir = tmp_dir.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(&tmp_dir)?;
        Ok(FsObjectStoreBackend { root, tmp_dir })
    }

    fn path_for(&self, store_id: &StoreId, version: i32, id: &str) -> PathBuf {
        fanout_path(&self.root, store_id, version, id)
    }
}

impl ObjectStoreBackend for FsObjectStoreBackend {
    fn put(&self, store_id: &StoreId, version: i32, id: &str, data: &[u8], sync: bool) -> Result<(), SyncError> {
        let dest = self.path_for(store_id, version, id);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to a temp file first and rename into place so a reader never
        // observes a partially-written object.
        let tmp_path = self.tmp_dir.join(format!("{}-{}", id, uuid::Uuid::new_v4()));
        {
            let mut f = File::create(&tmp_path)?;
            f.write_all(data)?;
            if sync {
                f.sync_all()?;
            }
        }
        fs::rename(&tmp_path, &dest)?;
        if sync {
            if let Some(parent) = dest.parent() {
                if let Ok(dir) = File::open(parent) {
                    let _ = dir.sync_all();
                }
            }
        }
        Ok(())
    }

    fn get(&self, store_id: &StoreId, version: i32, id: &str) -> Result<Vec<u8>, SyncError> {
        let path = self.path_for(store_id, version, id);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::not_found(format!("object {id} not found")))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, store_id: &StoreId, version: i32, id: &str) -> Result<bool, SyncError> {
        Ok(self.path_for(store_id, version, id).exists())
    }

    fn stat(&self, store_id: &StoreId, version: i32, id: &str) -> Result<ObjectStat, SyncError> {
        let path = self.path_for(store_id, version, id);
        let meta = fs::metadata(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                SyncError::not_found(format!("object {id} not found"))
            } else {
                err.into()
            }
        })?;
        Ok(ObjectStat { size: meta.len() })
    }

    fn delete(&self, store_id: &StoreId, version: i32, id: &str) -> Result<(), SyncError> {
        let path = self.path_for(store_id, version, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn iterate(
        &self,
        store_id: &StoreId,
        version: i32,
        cb: &mut dyn FnMut(&str) -> Result<bool, SyncError>,
    ) -> Result<(), SyncError> {
        let store_dir = self.root.join(store_id.to_string()).join(version.to_string());
        if !store_dir.exists() {
            return Ok(());
        }
        for fanout in read_dir_sorted(&store_dir)? {
            if !fanout.is_dir() {
                continue;
            }
            for entry in read_dir_sorted(&fanout)? {
                if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                    let head = fanout.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    let id = format!("{head}{name}");
                    if !cb(&id)? {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn remove_store(&self, store_id: &StoreId, version: i32) -> Result<(), SyncError> {
        let dir = self.root.join(store_id.to_string()).join(version.to_string());
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepoId;

    fn backend() -> (FsObjectStoreBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsObjectStoreBackend::new(dir.path().join("blocks"), dir.path().join("tmp")).unwrap();
        (backend, dir)
    }

    #[test]
    fn put_get_round_trips() {
        let (backend, _guard) = backend();
        let store = StoreId::from_repo(&RepoId::new_v4());
        let id = "a".repeat(40);
        backend.put(&store, 1, &id, b"hello world", true).unwrap();
        assert!(backend.exists(&store, 1, &id).unwrap());
        assert_eq!(backend.get(&store, 1, &id).unwrap(), b"hello world");
        assert_eq!(backend.stat(&store, 1, &id).unwrap().size, 11);
    }

    #[test]
    fn missing_object_is_not_found() {
        let (backend, _guard) = backend();
        let store = StoreId::from_repo(&RepoId::new_v4());
        let err = backend.get(&store, 1, &"b".repeat(40)).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn iterate_visits_every_written_object() {
        let (backend, _guard) = backend();
        let store = StoreId::from_repo(&RepoId::new_v4());
        let ids: Vec<String> = (0..5).map(|i| format!("{:040x}", i)).collect();
        for id in &ids {
            backend.put(&store, 1, id, b"x", false).unwrap();
        }
        let mut seen = Vec::new();
        backend
            .iterate(&store, 1, &mut |id| {
                seen.push(id.to_string());
                Ok(true)
            })
            .unwrap();
        seen.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn delete_is_idempotent() {
        let (backend, _guard) = backend();
        let store = StoreId::from_repo(&RepoId::new_v4());
        let id = "c".repeat(40);
        backend.delete(&store, 1, &id).unwrap();
        backend.put(&store, 1, &id, b"x", false).unwrap();
        backend.delete(&store, 1, &id).unwrap();
        assert!(!backend.exists(&store, 1, &id).unwrap());
    }
}
