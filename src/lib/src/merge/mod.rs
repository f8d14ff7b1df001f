//! C6 — merge engine: three-way tree merge over immutable trees, producing
//! a new root id without mutating any input (spec.md §4.6).

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;

use crate::error::SyncError;
use crate::fs::FsManager;
use crate::model::{DirEnt, ObjectId, StoreId, SyncwDir};

pub struct MergeOutcome {
    pub merged_root_id: ObjectId,
    pub conflict: bool,
}

pub struct MergeEngine {
    fs: Arc<FsManager>,
}

impl MergeEngine {
    pub fn new(fs: Arc<FsManager>) -> Self {
        MergeEngine { fs }
    }

    /// Three-way merge of `base`/`ours`/`theirs` directory trees.
    /// `committer_email` names the user whose changes end up in the
    /// conflict-file suffix; a conflict with no committer email fails
    /// outright rather than silently using a placeholder (spec.md §9).
    pub fn merge_trees(
        &self,
        store_id: &StoreId,
        version: i32,
        base: &ObjectId,
        ours: &ObjectId,
        theirs: &ObjectId,
        committer_email: Option<&str>,
    ) -> Result<MergeOutcome, SyncError> {
        let mut any_conflict = false;
        let merged_root = self.merge_dir(store_id, version, base, ours, theirs, committer_email, &mut any_conflict)?;
        Ok(MergeOutcome {
            merged_root_id: merged_root,
            conflict: any_conflict,
        })
    }

    fn merge_dir(
        &self,
        store_id: &StoreId,
        version: i32,
        base: &ObjectId,
        ours: &ObjectId,
        theirs: &ObjectId,
        committer_email: Option<&str>,
        any_conflict: &mut bool,
    ) -> Result<ObjectId, SyncError> {
        if ours == theirs {
            return Ok(ours.clone());
        }
        if ours == base {
            return Ok(theirs.clone());
        }
        if theirs == base {
            return Ok(ours.clone());
        }

        let base_dir = self.fs.get_syncwdir(store_id, version, base)?;
        let ours_dir = self.fs.get_syncwdir(store_id, version, ours)?;
        let theirs_dir = self.fs.get_syncwdir(store_id, version, theirs)?;

        let mut names: BTreeSet<&str> = BTreeSet::new();
        names.extend(base_dir.dirents.iter().map(|d| d.name.as_str()));
        names.extend(ours_dir.dirents.iter().map(|d| d.name.as_str()));
        names.extend(theirs_dir.dirents.iter().map(|d| d.name.as_str()));

        let mut merged_entries: Vec<DirEnt> = Vec::new();
        let mut taken_names: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();

        for name in names {
            let b = base_dir.find(name);
            let o = ours_dir.find(name);
            let t = theirs_dir.find(name);

            match (b, o, t) {
                (_, Some(o), Some(t)) if o == t => merged_entries.push(o.clone()),
                (b, Some(o), Some(t)) if b == Some(o) => merged_entries.push(t.clone()),
                (b, Some(o), Some(t)) if b == Some(t) => merged_entries.push(o.clone()),
                (_, Some(o), Some(t)) if o.is_dir() && t.is_dir() => {
                    let base_sub = b.map(|e| e.id.clone()).unwrap_or_else(ObjectId::empty);
                    let merged_id = self.merge_dir(store_id, version, &base_sub, &o.id, &t.id, committer_email, any_conflict)?;
                    merged_entries.push(DirEnt {
                        mode: o.mode,
                        id: merged_id,
                        name: o.name.clone(),
                        mtime: o.mtime.max(t.mtime),
                        modifier: o.modifier.clone(),
                        size: None,
                    });
                }
                (_, Some(o), Some(t)) => {
                    // Real conflict: both sides changed the same path
                    // differently and it isn't a dir/dir merge.
                    *any_conflict = true;
                    merged_entries.push(o.clone());
                    let email = committer_email.ok_or_else(|| {
                        SyncError::bad_input("BAD_ARGS: conflict rename requires a committer email")
                    })?;
                    let conflict_name = gen_conflict_path(&t.name, email, &taken_names);
                    taken_names.insert(conflict_name.clone());
                    let mut renamed = t.clone();
                    renamed.name = conflict_name;
                    merged_entries.push(renamed);
                }
                (Some(b), None, Some(t)) if t != b => {
                    // Ours deleted it, theirs modified it: modification
                    // wins, no data loss (spec.md §4.6 edge case).
                    merged_entries.push(t.clone());
                }
                (Some(b), Some(o), None) if o != b => {
                    merged_entries.push(o.clone());
                }
                (Some(b), None, Some(t)) if t == b => {
                    // Ours deleted it, theirs left it untouched: honor
                    // the deletion, don't resurrect the file.
                }
                (Some(b), Some(o), None) if o == b => {
                    // Theirs deleted it, ours left it untouched.
                }
                (_, None, Some(t)) => merged_entries.push(t.clone()),
                (_, Some(o), None) => merged_entries.push(o.clone()),
                (_, None, None) => {}
            }
        }

        let merged_dir = SyncwDir {
            version,
            dirents: merged_entries,
        };
        self.fs.put_syncwdir(store_id, &merged_dir)
    }
}

/// Build a deterministic conflict filename: `<stem> (SFConflict <suffix>
/// <timestamp>)<ext>`, disambiguated with a numeric tail if that name is
/// already taken in the directory.
pub fn gen_conflict_path(name: &str, suffix: &str, taken: &BTreeSet<String>) -> String {
    let now = Utc::now().format("%Y-%m-%d-%H%M%S").to_string();
    let (stem, ext) = split_ext(name);
    let mut candidate = if ext.is_empty() {
        format!("{stem} (SFConflict {suffix} {now})")
    } else {
        format!("{stem} (SFConflict {suffix} {now}).{ext}")
    };
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = if ext.is_empty() {
            format!("{stem} (SFConflict {suffix} {now} {n})")
        } else {
            format!("{stem} (SFConflict {suffix} {now} {n}).{ext}")
        };
        n += 1;
    }
    candidate
}

fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepoId;
    use crate::store::FsObjectStoreBackend;

    fn engine() -> (MergeEngine, Arc<FsManager>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FsObjectStoreBackend::new(dir.path().join("fs"), dir.path().join("tmp")).unwrap());
        let fs = Arc::new(FsManager::new(backend));
        (MergeEngine::new(fs.clone()), fs, dir)
    }

    fn store() -> StoreId {
        StoreId::from_repo(&RepoId::new_v4())
    }

    #[test]
    fn fast_forward_when_ours_equals_base() {
        let (engine, fs, _g) = engine();
        let store = store();
        let base = fs.put_syncwdir(&store, &SyncwDir::empty(1)).unwrap();
        let theirs_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("a".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let theirs = fs.put_syncwdir(&store, &theirs_dir).unwrap();

        let outcome = engine.merge_trees(&store, 1, &base, &base, &theirs, Some("a@example.com")).unwrap();
        assert_eq!(outcome.merged_root_id, theirs);
        assert!(!outcome.conflict);
    }

    #[test]
    fn non_conflicting_edits_on_different_files_both_survive() {
        let (engine, fs, _g) = engine();
        let store = store();
        let base = fs.put_syncwdir(&store, &SyncwDir::empty(1)).unwrap();

        let ours_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("a".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let ours = fs.put_syncwdir(&store, &ours_dir).unwrap();

        let theirs_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("b.txt", ObjectId::parse("b".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let theirs = fs.put_syncwdir(&store, &theirs_dir).unwrap();

        let outcome = engine.merge_trees(&store, 1, &base, &ours, &theirs, Some("a@example.com")).unwrap();
        assert!(!outcome.conflict);
        let merged = fs.get_syncwdir(&store, 1, &outcome.merged_root_id).unwrap();
        assert_eq!(merged.dirents.len(), 2);
    }

    #[test]
    fn conflicting_edits_rename_theirs_and_flag_conflict() {
        let (engine, fs, _g) = engine();
        let store = store();

        let base_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("1".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let base = fs.put_syncwdir(&store, &base_dir).unwrap();

        let ours_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("2".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let ours = fs.put_syncwdir(&store, &ours_dir).unwrap();

        let theirs_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("3".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let theirs = fs.put_syncwdir(&store, &theirs_dir).unwrap();

        let outcome = engine.merge_trees(&store, 1, &base, &ours, &theirs, Some("bob@example.com")).unwrap();
        assert!(outcome.conflict);
        let merged = fs.get_syncwdir(&store, 1, &outcome.merged_root_id).unwrap();
        assert_eq!(merged.dirents.len(), 2);
        assert!(merged.dirents.iter().any(|d| d.name == "a.txt"));
        assert!(merged.dirents.iter().any(|d| d.name.contains("SFConflict bob@example.com")));
    }

    #[test]
    fn conflict_without_committer_email_is_bad_input() {
        let (engine, fs, _g) = engine();
        let store = store();

        let base_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("1".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let base = fs.put_syncwdir(&store, &base_dir).unwrap();
        let ours_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("2".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let ours = fs.put_syncwdir(&store, &ours_dir).unwrap();
        let theirs_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("3".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let theirs = fs.put_syncwdir(&store, &theirs_dir).unwrap();

        let err = engine.merge_trees(&store, 1, &base, &ours, &theirs, None).unwrap_err();
        assert!(matches!(err, SyncError::BadInput(_)));
    }

    #[test]
    fn modification_beats_deletion() {
        let (engine, fs, _g) = engine();
        let store = store();

        let base_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("1".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let base = fs.put_syncwdir(&store, &base_dir).unwrap();

        let ours = fs.put_syncwdir(&store, &SyncwDir::empty(1)).unwrap(); // ours deleted a.txt

        let theirs_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("a.txt", ObjectId::parse("2".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let theirs = fs.put_syncwdir(&store, &theirs_dir).unwrap();

        let outcome = engine.merge_trees(&store, 1, &base, &ours, &theirs, Some("a@example.com")).unwrap();
        assert!(!outcome.conflict);
        let merged = fs.get_syncwdir(&store, 1, &outcome.merged_root_id).unwrap();
        assert_eq!(merged.dirents.len(), 1);
        assert_eq!(merged.dirents[0].id.as_str(), "2".repeat(40));
    }

    #[test]
    fn ours_deletes_an_untouched_file_stays_deleted() {
        // Both base and theirs also contain an unrelated file that theirs
        // modifies, so the whole-tree ids all differ and the per-entry
        // classification in `merge_dir` actually runs for `a.txt` instead
        // of being short-circuited by a whole-tree fast path.
        let (engine, fs, _g) = engine();
        let store = store();

        let base_dir = SyncwDir {
            version: 1,
            dirents: vec![
                DirEnt::new_file("a.txt", ObjectId::parse("1".repeat(40)).unwrap(), 0, "u", 1),
                DirEnt::new_file("b.txt", ObjectId::parse("b".repeat(40)).unwrap(), 0, "u", 1),
            ],
        };
        let base = fs.put_syncwdir(&store, &base_dir).unwrap();

        let ours_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("b.txt", ObjectId::parse("b".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let ours = fs.put_syncwdir(&store, &ours_dir).unwrap(); // ours deleted a.txt, left b.txt alone

        let theirs_dir = SyncwDir {
            version: 1,
            dirents: vec![
                DirEnt::new_file("a.txt", ObjectId::parse("1".repeat(40)).unwrap(), 0, "u", 1),
                DirEnt::new_file("b.txt", ObjectId::parse("c".repeat(40)).unwrap(), 0, "u", 1),
            ],
        };
        let theirs = fs.put_syncwdir(&store, &theirs_dir).unwrap(); // theirs left a.txt alone, modified b.txt

        let outcome = engine.merge_trees(&store, 1, &base, &ours, &theirs, Some("a@example.com")).unwrap();
        assert!(!outcome.conflict);
        let merged = fs.get_syncwdir(&store, 1, &outcome.merged_root_id).unwrap();
        assert!(merged.find("a.txt").is_none(), "deleted file must not be resurrected");
        assert_eq!(merged.find("b.txt").unwrap().id.as_str(), "c".repeat(40));
    }

    #[test]
    fn theirs_deletes_an_untouched_file_stays_deleted() {
        let (engine, fs, _g) = engine();
        let store = store();

        let base_dir = SyncwDir {
            version: 1,
            dirents: vec![
                DirEnt::new_file("a.txt", ObjectId::parse("1".repeat(40)).unwrap(), 0, "u", 1),
                DirEnt::new_file("b.txt", ObjectId::parse("b".repeat(40)).unwrap(), 0, "u", 1),
            ],
        };
        let base = fs.put_syncwdir(&store, &base_dir).unwrap();

        let ours_dir = SyncwDir {
            version: 1,
            dirents: vec![
                DirEnt::new_file("a.txt", ObjectId::parse("1".repeat(40)).unwrap(), 0, "u", 1),
                DirEnt::new_file("b.txt", ObjectId::parse("c".repeat(40)).unwrap(), 0, "u", 1),
            ],
        };
        let ours = fs.put_syncwdir(&store, &ours_dir).unwrap(); // ours left a.txt alone, modified b.txt

        let theirs_dir = SyncwDir {
            version: 1,
            dirents: vec![DirEnt::new_file("b.txt", ObjectId::parse("b".repeat(40)).unwrap(), 0, "u", 1)],
        };
        let theirs = fs.put_syncwdir(&store, &theirs_dir).unwrap(); // theirs deleted a.txt, left b.txt alone

        let outcome = engine.merge_trees(&store, 1, &base, &ours, &theirs, Some("a@example.com")).unwrap();
        assert!(!outcome.conflict);
        let merged = fs.get_syncwdir(&store, 1, &outcome.merged_root_id).unwrap();
        assert!(merged.find("a.txt").is_none(), "deleted file must not be resurrected");
        assert_eq!(merged.find("b.txt").unwrap().id.as_str(), "c".repeat(40));
    }
}
