pub mod codec;
pub mod fjall;
pub mod keys;
pub mod mem;
pub mod repo;
pub mod traits;
pub mod types;

pub use self::fjall::{FjallReadView, FjallStore};
pub use keys::Namespace;
pub use mem::{MemReadView, MemStore};
pub use traits::{MeshRead, MeshStore};
pub use types::{
    Checkpoint, LogEntry, LogPayload, Snapshot, SnapshotContents, SnapshotMeta, WriteBatch,
    WriteOp,
};
