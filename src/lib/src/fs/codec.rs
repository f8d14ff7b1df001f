//! Encode/decode for `Syncwerk` and `SyncwDir` in both on-disk layouts
//! (spec.md §4.3, §6.1).
//!
//! v1: canonical JSON (ascending keys, no whitespace) then deflated; id is
//! the SHA-1 of the *uncompressed* JSON. v0: packed big-endian binary,
//! except the per-dirent `mode` field which is always hashed/encoded
//! little-endian regardless of host (spec.md §9 open question).

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use crate::constants::{
    SYNCW_METADATA_TYPE_DIR, SYNCW_METADATA_TYPE_FILE,
};
use crate::error::SyncError;
use crate::model::{DirEnt, ObjectId, SyncwDir, Syncwerk};

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Canonical JSON bytes for any serializable object: serialize through
/// `serde_json::Value`, whose map type iterates keys in ascending order by
/// default, giving us the sorted-keys contract for free.
fn canonical_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, SyncError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&v)?)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, SyncError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, SyncError> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| SyncError::corrupted("failed to inflate object"))?;
    Ok(out)
}

/// The bytes actually written to the object store for a v1 object, plus
/// the id those bytes hash to.
pub struct EncodedV1 {
    pub id: ObjectId,
    pub stored_bytes: Vec<u8>,
}

pub fn encode_syncwerk_v1(file: &Syncwerk) -> Result<EncodedV1, SyncError> {
    let json = canonical_json(file)?;
    let id = ObjectId::parse(sha1_hex(&json))?;
    Ok(EncodedV1 {
        id,
        stored_bytes: deflate(&json)?,
    })
}

pub fn decode_syncwerk_v1(stored_bytes: &[u8], also_check_id: Option<&ObjectId>) -> Result<Syncwerk, SyncError> {
    let json = inflate(stored_bytes)?;
    if let Some(expected) = also_check_id {
        let actual = sha1_hex(&json);
        if actual != expected.as_str() {
            return Err(SyncError::corrupted(format!(
                "syncwerk id mismatch: expected {expected} got {actual}"
            )));
        }
    }
    Ok(serde_json::from_slice(&json)?)
}

pub fn encode_syncwdir_v1(dir: &SyncwDir) -> Result<EncodedV1, SyncError> {
    let json = canonical_json(dir)?;
    let id = ObjectId::parse(sha1_hex(&json))?;
    Ok(EncodedV1 {
        id,
        stored_bytes: deflate(&json)?,
    })
}

pub fn decode_syncwdir_v1(stored_bytes: &[u8], also_check_id: Option<&ObjectId>) -> Result<SyncwDir, SyncError> {
    let json = inflate(stored_bytes)?;
    if let Some(expected) = also_check_id {
        let actual = sha1_hex(&json);
        if actual != expected.as_str() {
            return Err(SyncError::corrupted(format!(
                "syncwdir id mismatch: expected {expected} got {actual}"
            )));
        }
    }
    Ok(serde_json::from_slice(&json)?)
}

// --- v0 legacy packed binary ---------------------------------------------

pub fn encode_syncwerk_v0(file: &Syncwerk) -> Result<EncodedV1, SyncError> {
    let mut buf = Vec::with_capacity(12 + file.block_ids.len() * 20);
    buf.extend_from_slice(&SYNCW_METADATA_TYPE_FILE.to_be_bytes());
    buf.extend_from_slice(&file.file_size.to_be_bytes());
    for id in &file.block_ids {
        buf.extend_from_slice(&hex_to_raw20(id.as_str())?);
    }
    let id = ObjectId::parse(sha1_hex(&buf))?;
    Ok(EncodedV1 { id, stored_bytes: buf })
}

pub fn decode_syncwerk_v0(bytes: &[u8], also_check_id: Option<&ObjectId>) -> Result<Syncwerk, SyncError> {
    if bytes.len() < 12 {
        return Err(SyncError::corrupted("truncated v0 syncwerk"));
    }
    let ty = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    if ty != SYNCW_METADATA_TYPE_FILE {
        return Err(SyncError::corrupted("not a v0 file manifest"));
    }
    let file_size = u64::from_be_bytes(bytes[4..12].try_into().unwrap());
    let rest = &bytes[12..];
    if rest.len() % 20 != 0 {
        return Err(SyncError::corrupted("malformed v0 block id list"));
    }
    let mut block_ids = Vec::with_capacity(rest.len() / 20);
    for chunk in rest.chunks(20) {
        block_ids.push(ObjectId::parse(raw20_to_hex(chunk))?);
    }

    if let Some(expected) = also_check_id {
        let actual = sha1_hex(bytes);
        if actual != expected.as_str() {
            return Err(SyncError::corrupted(format!(
                "syncwerk id mismatch: expected {expected} got {actual}"
            )));
        }
    }

    Ok(Syncwerk {
        version: 0,
        file_size,
        block_ids,
    })
}

pub fn encode_syncwdir_v0(dir: &SyncwDir) -> Result<EncodedV1, SyncError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&SYNCW_METADATA_TYPE_DIR.to_be_bytes());
    for dirent in &dir.dirents {
        // Quirk preserved from the original implementation: mode is always
        // hashed/stored little-endian, unlike every other integer field.
        buf.extend_from_slice(&dirent.mode.to_le_bytes());
        buf.extend_from_slice(dirent.id.as_str().as_bytes());
        let name_bytes = dirent.name.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(name_bytes);
    }
    let id = ObjectId::parse(sha1_hex(&buf))?;
    Ok(EncodedV1 { id, stored_bytes: buf })
}

pub fn decode_syncwdir_v0(bytes: &[u8], also_check_id: Option<&ObjectId>) -> Result<SyncwDir, SyncError> {
    if bytes.len() < 4 {
        return Err(SyncError::corrupted("truncated v0 syncwdir"));
    }
    let ty = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    if ty != SYNCW_METADATA_TYPE_DIR {
        return Err(SyncError::corrupted("not a v0 dir manifest"));
    }

    let mut dirents = Vec::new();
    let mut cursor = &bytes[4..];
    while !cursor.is_empty() {
        if cursor.len() < 4 + 40 + 4 {
            return Err(SyncError::corrupted("truncated v0 dirent"));
        }
        let mode = u32::from_le_bytes(cursor[0..4].try_into().unwrap());
        let id_bytes = &cursor[4..44];
        let id = ObjectId::parse(String::from_utf8_lossy(id_bytes).to_string())?;
        let name_len = u32::from_be_bytes(cursor[44..48].try_into().unwrap()) as usize;
        if cursor.len() < 48 + name_len {
            return Err(SyncError::corrupted("truncated v0 dirent name"));
        }
        let name = String::from_utf8_lossy(&cursor[48..48 + name_len]).to_string();
        dirents.push(DirEnt {
            mode,
            id,
            name,
            mtime: 0,
            modifier: None,
            size: None,
        });
        cursor = &cursor[48 + name_len..];
    }

    if let Some(expected) = also_check_id {
        let actual = sha1_hex(bytes);
        if actual != expected.as_str() {
            return Err(SyncError::corrupted(format!(
                "syncwdir id mismatch: expected {expected} got {actual}"
            )));
        }
    }

    Ok(SyncwDir { version: 0, dirents })
}

fn hex_to_raw20(hex: &str) -> Result<[u8; 20], SyncError> {
    if hex.len() != 40 {
        return Err(SyncError::bad_input("block id must be 40 hex chars"));
    }
    let mut out = [0u8; 20];
    for i in 0..20 {
        out[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| SyncError::bad_input("invalid hex in block id"))?;
    }
    Ok(out)
}

fn raw20_to_hex(raw: &[u8]) -> String {
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_syncwerk_round_trips_and_hashes() {
        let file = Syncwerk {
            version: 1,
            file_size: 42,
            block_ids: vec![ObjectId::parse("a".repeat(40)).unwrap()],
        };
        let encoded = encode_syncwerk_v1(&file).unwrap();
        let decoded = decode_syncwerk_v1(&encoded.stored_bytes, Some(&encoded.id)).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn v1_tampered_bytes_fail_id_check() {
        let file = Syncwerk {
            version: 1,
            file_size: 1,
            block_ids: vec![],
        };
        let mut encoded = encode_syncwerk_v1(&file).unwrap();
        encoded.id = ObjectId::parse("f".repeat(40)).unwrap();
        let err = decode_syncwerk_v1(&encoded.stored_bytes, Some(&encoded.id)).unwrap_err();
        assert!(matches!(err, SyncError::Corrupted(_)));
    }

    #[test]
    fn v0_syncwdir_round_trips() {
        let dir = SyncwDir {
            version: 0,
            dirents: vec![
                DirEnt {
                    mode: crate::model::MODE_FILE,
                    id: ObjectId::parse("b".repeat(40)).unwrap(),
                    name: "a.txt".to_string(),
                    mtime: 0,
                    modifier: None,
                    size: None,
                },
                DirEnt {
                    mode: crate::model::MODE_DIR,
                    id: ObjectId::parse("c".repeat(40)).unwrap(),
                    name: "sub".to_string(),
                    mtime: 0,
                    modifier: None,
                    size: None,
                },
            ],
        };
        let encoded = encode_syncwdir_v0(&dir).unwrap();
        let decoded = decode_syncwdir_v0(&encoded.stored_bytes, Some(&encoded.id)).unwrap();
        assert_eq!(decoded.dirents.len(), 2);
        assert_eq!(decoded.dirents[0].name, "a.txt");
        assert_eq!(decoded.dirents[1].name, "sub");
    }

    #[test]
    fn v0_dirents_sort_descending_on_access() {
        let dir = SyncwDir {
            version: 0,
            dirents: vec![
                DirEnt::new_file("a.txt", ObjectId::empty(), 0, "u", 0),
                DirEnt::new_file("z.txt", ObjectId::empty(), 0, "u", 0),
                DirEnt::new_file("m.txt", ObjectId::empty(), 0, "u", 0),
            ],
        };
        let sorted = dir.sorted_descending();
        let names: Vec<&str> = sorted.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["z.txt", "m.txt", "a.txt"]);
    }
}
