//! C1 (object store backend) and C2 (block manager).

pub mod backend;
pub mod block;
pub mod fs_backend;

pub use backend::{ObjectStat, ObjectStoreBackend};
pub use block::{BlockHandle, BlockManager, BlockMode};
pub use fs_backend::FsObjectStoreBackend;
