//! Constants used throughout the sync engine.

/// The reserved "empty" object id: forty `0` characters. Denotes the empty
/// file and the empty directory. Never persisted to any store.
pub const EMPTY_SHA1: &str = "0000000000000000000000000000000000000000";

/// Length in hex characters of a SHA-1 based object id.
pub const OBJECT_ID_LEN: usize = 40;

/// On-disk layout version for the legacy packed-binary encoding.
pub const FORMAT_VERSION_LEGACY: i32 = 0;
/// On-disk layout version for the JSON+deflate encoding. New writes always
/// use this version; v0 is read-only.
pub const FORMAT_VERSION_CURRENT: i32 = 1;

/// `type` tag written at the head of a v0 file manifest.
pub const SYNCW_METADATA_TYPE_INVALID: u32 = 0;
pub const SYNCW_METADATA_TYPE_FILE: u32 = 1;
pub const SYNCW_METADATA_TYPE_LINK: u32 = 2;
pub const SYNCW_METADATA_TYPE_DIR: u32 = 3;

/// Content-defined chunking target/min/max, in bytes (legacy default).
pub const CDC_AVERAGE_BLOCK_SIZE: u64 = 8 * 1024 * 1024;
pub const CDC_MIN_BLOCK_SIZE: u64 = 6 * 1024 * 1024;
pub const CDC_MAX_BLOCK_SIZE: u64 = 10 * 1024 * 1024;

/// Default fixed-size chunk size for v1 repos, in bytes (8 MiB, overridden
/// by `[fileserver].fixed_block_size`).
pub const DEFAULT_FIXED_BLOCK_SIZE: u64 = 8 * 1024 * 1024;

/// Branch used by the sync protocol.
pub const MASTER_BRANCH: &str = "master";

/// Max retries for the push CAS loop before giving up with `SERVERR`.
pub const MAX_CAS_RETRIES: u32 = 10;
/// Backoff bounds between CAS retries, in milliseconds.
pub const CAS_RETRY_BACKOFF_MIN_MS: u64 = 100;
pub const CAS_RETRY_BACKOFF_MAX_MS: u64 = 1000;

/// Cache TTLs (seconds).
pub const TOKEN_CACHE_TTL_SECS: u64 = 2 * 60 * 60;
pub const PERM_CACHE_TTL_SECS: u64 = 2 * 60 * 60;
pub const VIRTUAL_REPO_CACHE_TTL_SECS: u64 = 2 * 60 * 60;
/// How often the cache sweeper wakes up to evict expired entries.
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Default web access token TTL (one-shot download URLs).
pub const DEFAULT_WEB_TOKEN_EXPIRE_SECS: u64 = 60 * 60;

/// Default bound on in-flight async object operations (C10).
pub const DEFAULT_IO_SCHED_WORKERS: usize = 3;

/// `pack-fs` stops coalescing once this many bytes are queued.
pub const PACK_FS_SIZE_LIMIT: usize = 1024 * 1024;

/// Domain-specific HTTP status codes (spec.md §4.9 / §6.2).
pub const HTTP_REPO_DELETED: u16 = 441;
pub const HTTP_NOQUOTA: u16 = 443;
pub const HTTP_REPO_CORRUPTED: u16 = 445;

/// Storage sub-directory names under the data directory.
pub const STORAGE_DIR: &str = "storage";
pub const BLOCKS_DIR: &str = "blocks";
pub const FS_DIR: &str = "fs";
pub const COMMITS_DIR: &str = "commits";
pub const TMP_DIR: &str = "tmp";

/// Encryption field length constraints (hex chars), spec.md §4.4.
pub const ENC_MAGIC_LEN_V1: usize = 32;
pub const ENC_MAGIC_LEN_V2: usize = 64;
pub const ENC_RANDOM_KEY_LEN_V2: usize = 96;
