use skein_types::{LogIndex, Term};

use crate::keys::Namespace;

/// A single entry delivered by the consensus log.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub index: LogIndex,
    pub term: Term,
    pub payload: LogPayload,
}

/// The payload carried by a `LogEntry`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum LogPayload {
    /// No-op / heartbeat entry.
    Blank,
    /// An encoded command envelope.
    Command(Vec<u8>),
    /// Membership changes and other consensus internals; never decoded here.
    Membership(Vec<u8>),
}

/// Last successfully applied log position.
///
/// Ordered by `(term, index)`, which is the ordering the stale-entry guard
/// relies on.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Checkpoint {
    pub term: Term,
    pub index: LogIndex,
}

impl Checkpoint {
    pub fn new(term: Term, index: LogIndex) -> Self {
        Checkpoint { term, index }
    }

    /// Whether an entry at `(term, index)` has already been applied.
    pub fn covers(&self, term: Term, index: LogIndex) -> bool {
        term < self.term || index <= self.index
    }
}

/// One store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { ns: Namespace, key: String, value: Vec<u8> },
    Delete { ns: Namespace, key: String },
}

impl WriteOp {
    pub fn target(&self) -> (Namespace, &str) {
        match self {
            WriteOp::Put { ns, key, .. } | WriteOp::Delete { ns, key } => (*ns, key.as_str()),
        }
    }
}

/// Operations committed atomically across namespaces.
///
/// At most one operation is kept per key: a later put or delete of the same
/// key replaces the earlier one, so a batch never depends on how a backend
/// orders same-key writes within one commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, ns: Namespace, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        self.supersede(ns, &key);
        self.ops.push(WriteOp::Put { ns, key, value });
    }

    pub fn delete(&mut self, ns: Namespace, key: impl Into<String>) {
        let key = key.into();
        self.supersede(ns, &key);
        self.ops.push(WriteOp::Delete { ns, key });
    }

    fn supersede(&mut self, ns: Namespace, key: &str) {
        self.ops.retain(|op| op.target() != (ns, key));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Metadata identifying a snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SnapshotMeta {
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
    /// UUID v4 string identifying this snapshot.
    pub snapshot_id: String,
}

/// Serialized format stored in [`Snapshot::data`]: every key of every data
/// namespace at the time of the snapshot.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SnapshotContents {
    pub entries: Vec<(Namespace, String, Vec<u8>)>,
}

/// A full state-machine snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    /// bincode(SnapshotContents)
    pub data: Vec<u8>,
}
